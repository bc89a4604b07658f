//! Entity Component System core types.
//!
//! Entities live in archetypes: one table per distinct component set, with
//! one chunked column per component type. Component types are described at
//! run time by [`TypeDescriptor`]s held in a [`TypeRegistry`], so Rust types
//! and plain-bytes types known only at run time share the same storage.

mod archetype;
mod archetype_manager;
mod builder;
mod bundle;
mod component;
mod descriptor;
mod entity;
mod registry;
mod system;
mod system_handle;
mod system_registration_error;
mod system_registry;
mod world;

pub use archetype::Archetype;
pub use archetype_manager::ArchetypeManager;
pub use builder::{EntityBuilder, EntityBuilderError};
pub use bundle::ComponentBundle;
pub use component::{Component, ComponentId, ENTITY_COMPONENT_ID};
pub use descriptor::{TypeDescriptor, TypeDescriptorId};
pub use entity::{
    ArchetypeId, EntityId, StableEntity, ARCHETYPE_BITS, INDEX_BITS, INDEX_MASK, MAX_ARCHETYPE_ID,
};
pub use registry::TypeRegistry;
pub use system::System;
pub use system_handle::SystemHandle;
pub use system_registration_error::SystemRegistrationError;
pub use system_registry::SystemRegistry;
pub use world::World;

/// Spawn an entity into the world from a list of component values.
#[macro_export]
macro_rules! spawn {
    ($world:expr $(, $component:expr)+ $(,)?) => {
        $world.spawn(($($component,)+))
    };
}
