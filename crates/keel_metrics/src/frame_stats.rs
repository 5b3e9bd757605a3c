//! Update-loop timing

use super::rolling_window::RollingWindow;
use std::time::{Duration, Instant};

/// Measures how long each scene update takes.
#[derive(Debug)]
pub struct FrameStats {
    started: Option<Instant>,
    window: RollingWindow<Duration>,
    frames: u64,
}

impl FrameStats {
    pub fn new(window: usize) -> Self {
        Self {
            started: None,
            window: RollingWindow::new(window),
            frames: 0,
        }
    }

    pub fn begin(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Closes the frame opened by `begin`; an unmatched call is ignored.
    pub fn end(&mut self) {
        if let Some(started) = self.started.take() {
            self.window.push(started.elapsed());
            self.frames += 1;
        }
    }

    pub fn frames_recorded(&self) -> u64 {
        self.frames
    }

    pub fn average_ms(&self) -> f64 {
        self.window.average().as_secs_f64() * 1000.0
    }

    pub fn min_max_ms(&self) -> (f64, f64) {
        let (min, max) = self.window.min_max();
        (min.as_secs_f64() * 1000.0, max.as_secs_f64() * 1000.0)
    }
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new(120)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_without_begin_is_ignored() {
        let mut stats = FrameStats::new(4);
        stats.end();
        assert_eq!(stats.frames_recorded(), 0);

        stats.begin();
        stats.end();
        assert_eq!(stats.frames_recorded(), 1);
        let (min, max) = stats.min_max_ms();
        assert!(min <= max);
    }
}
