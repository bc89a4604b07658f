use std::fmt;

/// Identifies a registered system for its whole registration.
///
/// Handles are drawn from a per-registry counter that only moves forward, so
/// they say nothing about update order and a handle is never reissued after
/// its system is unregistered.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SystemHandle(u32);

impl SystemHandle {
    #[cfg(test)]
    pub(crate) fn new(serial: u32) -> Self {
        Self(serial)
    }

    pub(crate) fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Registration serial number.
    #[inline]
    pub fn serial(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SystemHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "system#{}", self.0)
    }
}
