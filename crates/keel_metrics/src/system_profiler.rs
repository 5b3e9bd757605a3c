//! Per-system timing for the scene update loop

use crate::SystemTiming;
use std::collections::HashMap;
use std::time::Instant;

#[derive(Debug, Default)]
pub struct SystemProfiler {
    timings: HashMap<String, SystemTiming>,
}

impl SystemProfiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn time_system<F, R>(&mut self, name: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = Instant::now();
        let result = f();
        let elapsed = start.elapsed();

        let timing = match self.timings.get_mut(name) {
            Some(timing) => timing,
            None => self.timings.entry(name.to_string()).or_default(),
        };
        timing.calls += 1;
        timing.last = elapsed;
        timing.total += elapsed;
        result
    }

    pub fn timing(&self, name: &str) -> Option<SystemTiming> {
        self.timings.get(name).copied()
    }

    pub fn reset(&mut self) {
        self.timings.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SystemTiming)> {
        self.timings.iter().map(|(name, timing)| (name.as_str(), timing))
    }
}
