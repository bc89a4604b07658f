//! Accumulated timings of named systems

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SystemTiming {
    pub total: Duration,
    pub last: Duration,
    pub calls: u64,
}

impl SystemTiming {
    pub fn average(&self) -> Duration {
        match self.calls {
            0 => Duration::ZERO,
            n => self.total / n as u32,
        }
    }
}

#[derive(Default)]
pub struct SystemProfiler {
    timings: BTreeMap<String, SystemTiming>,
}

impl SystemProfiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f`, charging its wall time to `name`.
    pub fn time_system<F, R>(&mut self, name: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = Instant::now();
        let result = f();
        self.record(name, start.elapsed());
        result
    }

    pub fn record(&mut self, name: &str, elapsed: Duration) {
        let timing = self.timings.entry(name.to_string()).or_default();
        timing.total += elapsed;
        timing.last = elapsed;
        timing.calls += 1;
    }

    pub fn timing(&self, name: &str) -> SystemTiming {
        self.timings.get(name).copied().unwrap_or_default()
    }

    pub fn reset(&mut self) {
        self.timings.clear();
    }

    /// Timings by system name, in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, SystemTiming)> {
        self.timings.iter().map(|(name, timing)| (name.as_str(), *timing))
    }
}
