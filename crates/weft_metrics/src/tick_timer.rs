//! Simulation tick timing

use crate::RingBuffer;
use std::time::{Duration, Instant};

pub struct TickTimer {
    tick_start: Instant,
    tick_times: RingBuffer<Duration>,
    ticks: u64,
}

impl TickTimer {
    /// Average over the last `window` ticks.
    pub fn new(window: usize) -> Self {
        Self {
            tick_start: Instant::now(),
            tick_times: RingBuffer::new(window),
            ticks: 0,
        }
    }

    pub fn begin(&mut self) {
        self.tick_start = Instant::now();
    }

    pub fn end(&mut self) {
        self.tick_times.push(self.tick_start.elapsed());
        self.ticks += 1;
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn ticks_per_second(&self) -> f64 {
        let average = self.tick_times.average().as_secs_f64();
        if average > 0.0 {
            1.0 / average
        } else {
            0.0
        }
    }

    pub fn tick_time_ms(&self) -> f64 {
        self.tick_times.average().as_secs_f64() * 1000.0
    }

    pub fn tick_time_range_ms(&self) -> (f64, f64) {
        let (min, max) = self.tick_times.min_max();
        (min.as_secs_f64() * 1000.0, max.as_secs_f64() * 1000.0)
    }
}
