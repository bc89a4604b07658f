use crate::ecs::{System, SystemHandle, SystemRegistrationError, World};
use crate::task::TaskError;
use crate::work::WorkManager;
use std::collections::HashMap;
use weft_metrics::SystemProfiler;

/// Ordered list of systems. Systems run in list order; a system may be
/// inserted before an already registered one.
#[derive(Default)]
pub struct SystemRegistry {
    systems: Vec<RegisteredSystem>,
    name_lookup: HashMap<String, SystemHandle>,
    next_handle: SystemHandle,
    profiler: SystemProfiler,
}

struct RegisteredSystem {
    handle: SystemHandle,
    system: Box<dyn System>,
}

impl SystemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a system at the end of the list, or directly before `before`.
    pub fn register<S: System + 'static>(
        &mut self,
        system: S,
        before: Option<SystemHandle>,
    ) -> Result<SystemHandle, SystemRegistrationError> {
        let name = system.name().to_string();
        if self.name_lookup.contains_key(&name) {
            return Err(SystemRegistrationError::DuplicateName { name });
        }
        let position = match before {
            None => self.systems.len(),
            Some(anchor) => self
                .position_of(anchor)
                .ok_or(SystemRegistrationError::UnknownAnchor {
                    name: name.clone(),
                    anchor,
                })?,
        };

        let handle = self.next_handle;
        self.next_handle = handle.next();

        let mut system: Box<dyn System> = Box::new(system);
        system.on_register();
        tracing::debug!(system = %name, %handle, position, "registered system");

        self.name_lookup.insert(name, handle);
        self.systems.insert(position, RegisteredSystem { handle, system });
        Ok(handle)
    }

    /// Remove a system, returning it after its deregistration hook ran.
    pub fn unregister(&mut self, handle: SystemHandle) -> Option<Box<dyn System>> {
        let position = self.position_of(handle)?;
        let RegisteredSystem { mut system, .. } = self.systems.remove(position);
        self.name_lookup.remove(system.name());
        system.on_deregister();
        Some(system)
    }

    fn position_of(&self, handle: SystemHandle) -> Option<usize> {
        self.systems.iter().position(|s| s.handle == handle)
    }

    /// Run every system's update once, in order. Stops at the first error.
    pub fn update(&mut self, world: &mut World, work: &WorkManager) -> Result<(), TaskError> {
        for registered in &mut self.systems {
            let system = &mut registered.system;
            let name = system.name().to_string();
            self.profiler
                .time_system(&name, || system.on_update(world, work))?;
            weft_metrics::metrics! {
                let elapsed = self.profiler.timing(&name).last;
                tracing::trace!(system = %name, elapsed_us = elapsed.as_micros() as u64, "system updated");
            }
        }
        Ok(())
    }

    /// Per-system update timings. Empty unless built with `metrics`.
    pub fn profiler(&self) -> &SystemProfiler {
        &self.profiler
    }

    pub fn profiler_mut(&mut self) -> &mut SystemProfiler {
        &mut self.profiler
    }

    pub fn handle_of(&self, name: &str) -> Option<SystemHandle> {
        self.name_lookup.get(name).copied()
    }

    /// System names in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.systems.iter().map(|s| s.system.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }
}
