//! Shared work queue and the threads that drain it.

mod latch;
mod manager;
mod queue;

pub use latch::{CompletionLatch, JobGuard};
pub use manager::WorkManager;
pub use queue::{Job, WorkError, WorkQueue};
