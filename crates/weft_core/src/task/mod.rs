//! Tasks: work decomposed into queue-sized slices.
//!
//! A [`Task`] wraps one of four bodies. Single tasks become one job; parallel
//! tasks become one job per stride of rows in every matching archetype
//! chunk; custom tasks split a plain index range. Dependencies declared with
//! [`Task::depends_on`] finish before the dependent task's slices are queued.

mod handle;
mod kinds;
mod query;
mod stride;

pub use handle::{Task, TaskError};
pub use kinds::{CustomParallelTask, ParallelTask, ParallelTaskWithIndex, SingleTask, TaskKind};
pub use query::{ColumnPtr, ComponentSet};
pub use stride::{custom_ranges, stride_ranges, StrideRange};
