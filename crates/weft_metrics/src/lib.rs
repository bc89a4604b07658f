//! Weft Metrics - Tick and system timing
//!
//! Everything here compiles down to no-op stubs unless the `metrics` feature
//! is enabled, so instrumented code pays nothing in production builds.
//!
//! # Usage
//!
//! ```ignore
//! use weft_metrics::TickTimer;
//!
//! let mut timer = TickTimer::new(120);
//! timer.begin();
//! // ... run one simulation tick ...
//! timer.end();
//! println!("{:.1} ticks/s", timer.ticks_per_second());
//! ```

#[cfg(feature = "metrics")]
mod ring_buffer;
#[cfg(feature = "metrics")]
mod system_profiler;
#[cfg(feature = "metrics")]
mod tick_timer;

#[cfg(feature = "metrics")]
pub use ring_buffer::RingBuffer;
#[cfg(feature = "metrics")]
pub use system_profiler::{SystemProfiler, SystemTiming};
#[cfg(feature = "metrics")]
pub use tick_timer::TickTimer;

/// Execute code only when metrics are enabled
#[macro_export]
macro_rules! metrics {
    ($($tt:tt)*) => {
        #[cfg(feature = "metrics")]
        {
            $($tt)*
        }
    };
}

// ============================================================================
// No-op stubs when metrics disabled
// ============================================================================

#[cfg(not(feature = "metrics"))]
pub struct TickTimer;

#[cfg(not(feature = "metrics"))]
impl TickTimer {
    pub fn new(_window: usize) -> Self { Self }
    pub fn begin(&mut self) {}
    pub fn end(&mut self) {}
    pub fn ticks(&self) -> u64 { 0 }
    pub fn ticks_per_second(&self) -> f64 { 0.0 }
    pub fn tick_time_ms(&self) -> f64 { 0.0 }
    pub fn tick_time_range_ms(&self) -> (f64, f64) { (0.0, 0.0) }
}

#[cfg(not(feature = "metrics"))]
pub struct RingBuffer<T>(std::marker::PhantomData<T>);

#[cfg(not(feature = "metrics"))]
impl<T> RingBuffer<T> {
    pub fn new(_capacity: usize) -> Self { Self(std::marker::PhantomData) }
    pub fn push(&mut self, _sample: T) {}
    pub fn len(&self) -> usize { 0 }
    pub fn is_empty(&self) -> bool { true }
}

#[cfg(not(feature = "metrics"))]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SystemTiming {
    pub total: std::time::Duration,
    pub last: std::time::Duration,
    pub calls: u64,
}

#[cfg(not(feature = "metrics"))]
impl SystemTiming {
    pub fn average(&self) -> std::time::Duration { std::time::Duration::ZERO }
}

#[cfg(not(feature = "metrics"))]
#[derive(Default)]
pub struct SystemProfiler;

#[cfg(not(feature = "metrics"))]
impl SystemProfiler {
    pub fn new() -> Self { Self }
    pub fn time_system<F, R>(&mut self, _name: &str, f: F) -> R where F: FnOnce() -> R { f() }
    pub fn record(&mut self, _name: &str, _elapsed: std::time::Duration) {}
    pub fn timing(&self, _name: &str) -> SystemTiming { SystemTiming::default() }
    pub fn reset(&mut self) {}
    pub fn iter(&self) -> impl Iterator<Item = (&str, SystemTiming)> { std::iter::empty() }
}

#[cfg(test)]
mod tests {
    #[test]
    fn metrics_macro_follows_feature() {
        let mut recorded = 0;
        crate::metrics! {
            recorded += 1;
        }
        assert_eq!(recorded, if cfg!(feature = "metrics") { 1 } else { 0 });
    }

    #[test]
    fn api_compiles_with_or_without_metrics() {
        let mut timer = super::TickTimer::new(60);
        timer.begin();
        timer.end();
        let mut profiler = super::SystemProfiler::new();
        assert_eq!(profiler.time_system("noop", || 7), 7);
        let _window = super::RingBuffer::<f64>::new(10);
    }
}
