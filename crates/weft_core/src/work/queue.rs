// queue.rs - Bounded FIFO of deferred jobs
//
// A fixed ring of slots behind one mutex. Workers block on the condvar until
// a job arrives or the queue is shut down.

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

/// A deferred unit of work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Error)]
pub enum WorkError {
    #[error("work queue is full ({capacity} jobs)")]
    QueueFull { capacity: usize },

    #[error("work queue has been shut down")]
    Closed,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

struct Ring {
    slots: Vec<Option<Job>>,
    head: usize,
    len: usize,
    closed: bool,
}

impl Ring {
    fn pop_front(&mut self) -> Option<Job> {
        if self.len == 0 {
            return None;
        }
        let job = self.slots[self.head].take();
        self.head = (self.head + 1) % self.slots.len();
        self.len -= 1;
        job
    }
}

pub struct WorkQueue {
    ring: Mutex<Ring>,
    available: Condvar,
    capacity: usize,
}

impl WorkQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "work queue capacity must be at least 1");
        Self {
            ring: Mutex::new(Ring {
                slots: (0..capacity).map(|_| None).collect(),
                head: 0,
                len: 0,
                closed: false,
            }),
            available: Condvar::new(),
            capacity,
        }
    }

    /// Append a job. Fails without blocking when the queue is full or closed.
    pub fn enqueue(&self, job: Job) -> Result<(), WorkError> {
        {
            let mut ring = self.ring.lock();
            if ring.closed {
                return Err(WorkError::Closed);
            }
            if ring.len == self.capacity {
                return Err(WorkError::QueueFull {
                    capacity: self.capacity,
                });
            }
            let tail = (ring.head + ring.len) % self.capacity;
            ring.slots[tail] = Some(job);
            ring.len += 1;
        }
        self.available.notify_one();
        Ok(())
    }

    /// Take the oldest job if there is one.
    pub fn try_dequeue(&self) -> Option<Job> {
        self.ring.lock().pop_front()
    }

    /// Wait for a job. Returns `None` once the queue is shut down and empty.
    pub fn dequeue_blocking(&self) -> Option<Job> {
        let mut ring = self.ring.lock();
        loop {
            if let Some(job) = ring.pop_front() {
                return Some(job);
            }
            if ring.closed {
                return None;
            }
            self.available.wait(&mut ring);
        }
    }

    /// Reject further jobs and wake every blocked consumer. Jobs already
    /// queued can still be dequeued.
    pub fn shutdown(&self) {
        self.ring.lock().closed = true;
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.ring.lock().closed
    }

    pub fn len(&self) -> usize {
        self.ring.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
