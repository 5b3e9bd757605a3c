//! Keel Metrics - instrumentation for the scene update loop
//!
//! Everything in this crate compiles down to zero-sized no-ops unless the
//! `metrics` feature is enabled, so the scene can call into it
//! unconditionally.
//!
//! # Feature Flags
//!
//! - `metrics` - Enable metrics collection (default: disabled)
//!
//! # Usage
//!
//! ```ignore
//! use keel_metrics::{FrameStats, SystemProfiler};
//!
//! let mut frames = FrameStats::new(120);
//! let mut profiler = SystemProfiler::new();
//! frames.begin();
//! profiler.time_system("movement", || run_movement());
//! frames.end();
//! println!("avg frame: {:.3} ms", frames.average_ms());
//! ```

use std::time::Duration;

#[cfg(feature = "metrics")]
mod event_counter;
#[cfg(feature = "metrics")]
mod frame_stats;
#[cfg(feature = "metrics")]
mod rolling_window;
#[cfg(feature = "metrics")]
mod system_profiler;

#[cfg(feature = "metrics")]
pub use event_counter::EventCounter;
#[cfg(feature = "metrics")]
pub use frame_stats::FrameStats;
#[cfg(feature = "metrics")]
pub use rolling_window::RollingWindow;
#[cfg(feature = "metrics")]
pub use system_profiler::SystemProfiler;

/// Accumulated timing for one named system.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemTiming {
    pub calls: u64,
    pub last: Duration,
    pub total: Duration,
}

impl SystemTiming {
    /// Mean duration per call, zero when the system never ran.
    pub fn average(&self) -> Duration {
        if self.calls == 0 {
            return Duration::ZERO;
        }
        let calls = u32::try_from(self.calls).unwrap_or(u32::MAX);
        self.total / calls
    }
}

/// Whether this build collects anything at all.
pub const fn enabled() -> bool {
    cfg!(feature = "metrics")
}

// ============================================================================
// No-op stubs when metrics disabled
// ============================================================================

#[cfg(not(feature = "metrics"))]
#[derive(Debug, Default)]
pub struct SystemProfiler;

#[cfg(not(feature = "metrics"))]
impl SystemProfiler {
    pub fn new() -> Self { Self }
    pub fn time_system<F, R>(&mut self, _name: &str, f: F) -> R where F: FnOnce() -> R { f() }
    pub fn timing(&self, _name: &str) -> Option<SystemTiming> { None }
    pub fn reset(&mut self) {}
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SystemTiming)> { std::iter::empty() }
}

#[cfg(not(feature = "metrics"))]
#[derive(Debug, Default)]
pub struct FrameStats;

#[cfg(not(feature = "metrics"))]
impl FrameStats {
    pub fn new(_window: usize) -> Self { Self }
    pub fn begin(&mut self) {}
    pub fn end(&mut self) {}
    pub fn frames_recorded(&self) -> u64 { 0 }
    pub fn average_ms(&self) -> f64 { 0.0 }
    pub fn min_max_ms(&self) -> (f64, f64) { (0.0, 0.0) }
}

#[cfg(not(feature = "metrics"))]
#[derive(Debug, Default)]
pub struct EventCounter;

#[cfg(not(feature = "metrics"))]
impl EventCounter {
    pub fn new() -> Self { Self }
    pub fn add(&mut self, _name: &'static str, _value: u64) {}
    pub fn get(&self, _name: &str) -> u64 { 0 }
    pub fn reset_all(&mut self) {}
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, u64)> + '_ { std::iter::empty() }
}
