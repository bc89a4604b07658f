use crate::ecs::World;
use crate::task::TaskError;
use crate::work::WorkManager;

/// A unit of per-tick game logic, run in registration order by
/// [`SystemRegistry`](crate::ecs::SystemRegistry).
pub trait System: Send {
    fn name(&self) -> &str;

    /// Called once when the system is added to a registry.
    fn on_register(&mut self) {}

    /// Called once when the system is removed from its registry.
    fn on_deregister(&mut self) {}

    fn on_update(&mut self, world: &mut World, work: &WorkManager) -> Result<(), TaskError>;
}
