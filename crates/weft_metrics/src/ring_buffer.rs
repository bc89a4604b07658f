//! Fixed-size window of the most recent samples

use std::time::Duration;

pub struct RingBuffer<T> {
    samples: Vec<T>,
    capacity: usize,
    next: usize,
}

impl<T: Copy> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer needs room for at least one sample");
        Self {
            samples: Vec::with_capacity(capacity),
            capacity,
            next: 0,
        }
    }

    /// Record a sample, evicting the oldest once the window is full.
    pub fn push(&mut self, sample: T) {
        if self.samples.len() < self.capacity {
            self.samples.push(sample);
        } else {
            self.samples[self.next] = sample;
        }
        self.next = (self.next + 1) % self.capacity;
    }

    /// Most recently pushed sample.
    pub fn latest(&self) -> Option<T> {
        if self.samples.is_empty() {
            return None;
        }
        let index = (self.next + self.capacity - 1) % self.capacity;
        self.samples.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.samples.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl RingBuffer<Duration> {
    pub fn average(&self) -> Duration {
        match self.samples.len() {
            0 => Duration::ZERO,
            n => self.samples.iter().sum::<Duration>() / n as u32,
        }
    }

    pub fn min_max(&self) -> (Duration, Duration) {
        let min = self.iter().min().unwrap_or_default();
        let max = self.iter().max().unwrap_or_default();
        (min, max)
    }
}

impl RingBuffer<f64> {
    pub fn average(&self) -> f64 {
        match self.samples.len() {
            0 => 0.0,
            n => self.samples.iter().sum::<f64>() / n as f64,
        }
    }
}
