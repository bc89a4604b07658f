// manager.rs - Worker threads draining the shared work queue
//
// Each worker loops: wait for a job, run it. A panicking job is caught and
// logged so the worker survives. The submitting thread can lend a hand with
// `help_until`, which also makes a pool of zero workers usable.

use crate::config::WorkConfig;
use crate::work::{CompletionLatch, Job, WorkError, WorkQueue};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const HELP_POLL: Duration = Duration::from_millis(1);

pub struct WorkManager {
    queue: Arc<WorkQueue>,
    workers: Vec<JoinHandle<()>>,
    executed: Arc<AtomicU64>,
    worker_count: usize,
}

impl WorkManager {
    pub fn new(config: &WorkConfig) -> Result<Self, WorkError> {
        let queue = Arc::new(WorkQueue::with_capacity(config.queue_capacity));
        let executed = Arc::new(AtomicU64::new(0));
        let mut manager = Self {
            queue,
            workers: Vec::with_capacity(config.worker_count),
            executed,
            worker_count: config.worker_count,
        };

        for index in 0..config.worker_count {
            let queue = manager.queue.clone();
            let executed = manager.executed.clone();
            // On failure, Drop shuts down and joins the workers already started.
            let handle = thread::Builder::new()
                .name(format!("weft-worker-{index}"))
                .spawn(move || {
                    while let Some(job) = queue.dequeue_blocking() {
                        run_job(job, &executed);
                    }
                })?;
            manager.workers.push(handle);
        }

        tracing::info!(
            workers = config.worker_count,
            capacity = config.queue_capacity,
            "work manager started"
        );
        Ok(manager)
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    /// Jobs run to completion or caught panic so far, on any thread.
    pub fn executed_jobs(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }

    /// Run queued jobs on the calling thread until `latch` opens.
    pub fn help_until(&self, latch: &CompletionLatch) {
        while !latch.is_open() {
            match self.queue.try_dequeue() {
                Some(job) => run_job(job, &self.executed),
                None => {
                    latch.wait_timeout(HELP_POLL);
                }
            }
        }
    }

    /// Stop accepting jobs, let workers drain the queue and join them.
    pub fn shutdown(&mut self) {
        self.queue.shutdown();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::error!("worker thread terminated abnormally");
            }
        }
    }
}

impl Drop for WorkManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_job(job: Job, executed: &AtomicU64) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "<non-string panic>".to_string());
        tracing::error!(%message, "job panicked");
    }
    executed.fetch_add(1, Ordering::Relaxed);
}
