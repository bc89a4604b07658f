use crate::ecs::SystemHandle;
use thiserror::Error;

/// Errors that can occur while registering a system.
#[derive(Debug, Error)]
pub enum SystemRegistrationError {
    #[error("system '{name}' is already registered")]
    DuplicateName { name: String },

    #[error("system '{name}' cannot be placed before unknown {anchor}")]
    UnknownAnchor { name: String, anchor: SystemHandle },
}
