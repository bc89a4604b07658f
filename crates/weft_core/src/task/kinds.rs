// kinds.rs - The four task flavours user code implements
//
// Parallel tasks name the components they touch through a ComponentSet and
// receive one row at a time. Write the lifetime out in implementations:
//
//     impl ParallelTask for Integrate {
//         type Components = (Position, Velocity);
//         fn execute<'a>(&'a self, (p, v): (&'a mut Position, &'a mut Velocity)) { .. }
//     }

use crate::task::ComponentSet;
use std::sync::Arc;

/// Runs once per submission.
pub trait SingleTask: Send + Sync + 'static {
    fn execute(&self);
}

/// Runs once per entity of every archetype holding all of `Components`.
pub trait ParallelTask: Send + Sync + 'static {
    type Components: ComponentSet;

    fn execute<'a>(&'a self, components: <Self::Components as ComponentSet>::Refs<'a>);
}

/// Like [`ParallelTask`], also given the entity's row within its chunk.
pub trait ParallelTaskWithIndex: Send + Sync + 'static {
    type Components: ComponentSet;

    fn execute<'a>(&'a self, index: usize, components: <Self::Components as ComponentSet>::Refs<'a>);
}

/// Runs `execute(i)` for every `i` in `0..iterations()`, independent of any
/// archetype.
pub trait CustomParallelTask: Send + Sync + 'static {
    fn iterations(&self) -> usize;

    fn execute(&self, index: usize);
}

impl<T: SingleTask> SingleTask for Arc<T> {
    fn execute(&self) {
        T::execute(self)
    }
}

impl<T: CustomParallelTask> CustomParallelTask for Arc<T> {
    fn iterations(&self) -> usize {
        T::iterations(self)
    }

    fn execute(&self, index: usize) {
        T::execute(self, index)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TaskKind {
    Single,
    Parallel,
    ParallelWithIndex,
    CustomParallel,
}
