// latch.rs - Counts outstanding jobs of one submission

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Default)]
struct LatchState {
    pending: usize,
    panicked: usize,
}

/// Opens once every job registered with [`add`](Self::add) has completed.
#[derive(Clone, Default)]
pub struct CompletionLatch {
    inner: Arc<(Mutex<LatchState>, Condvar)>,
}

impl CompletionLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, jobs: usize) {
        self.inner.0.lock().pending += jobs;
    }

    /// Mark one job finished. `panicked` records a job that unwound.
    pub fn complete(&self, panicked: bool) {
        let (state, opened) = &*self.inner;
        let mut state = state.lock();
        debug_assert!(state.pending > 0, "latch completed more often than added");
        state.pending = state.pending.saturating_sub(1);
        if panicked {
            state.panicked += 1;
        }
        if state.pending == 0 {
            opened.notify_all();
        }
    }

    pub fn is_open(&self) -> bool {
        self.inner.0.lock().pending == 0
    }

    /// Jobs that unwound instead of finishing.
    pub fn panicked(&self) -> usize {
        self.inner.0.lock().panicked
    }

    /// Block until the latch opens or `timeout` passes. Returns whether it is open.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (state, opened) = &*self.inner;
        let mut state = state.lock();
        if state.pending > 0 {
            opened.wait_for(&mut state, timeout);
        }
        state.pending == 0
    }

    /// A guard that completes one job of this latch when dropped.
    pub fn guard(&self) -> JobGuard {
        JobGuard {
            latch: self.clone(),
        }
    }
}

/// Completes its job on drop, including while unwinding.
pub struct JobGuard {
    latch: CompletionLatch,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.latch.complete(thread::panicking());
    }
}
