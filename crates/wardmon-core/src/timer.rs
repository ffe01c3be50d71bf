//! Monotonic elapsed-time source with start/pause/stop semantics
//!
//! Round-trip measurements hang off this timer: it starts when the first
//! byte of a request is offered to the kernel and stops when the full reply
//! has been received. Backed by [`Instant`], so wall-clock adjustments
//! cannot skew a measurement.

use std::time::{Duration, Instant};

/// Stopwatch over a monotonic clock
///
/// `time` is live while running and frozen at the last interval boundary
/// while paused or stopped. `start` after `stop` resets the interval;
/// `start` after `pause` resumes it. `stop` after `pause` preserves the
/// paused interval as final.
#[derive(Debug, Clone)]
pub struct Timer {
    started_at: Option<Instant>,
    frozen: Duration,
    stopped: bool,
    paused: bool,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            started_at: None,
            frozen: Duration::ZERO,
            stopped: true,
            paused: false,
        }
    }

    /// Begin (or resume) measuring
    pub fn start(&mut self) {
        if self.stopped {
            self.started_at = Some(Instant::now());
            self.frozen = Duration::ZERO;
            self.stopped = false;
        } else if self.paused {
            // Shift the origin so the frozen interval carries over.
            self.started_at = Some(Instant::now() - self.frozen);
            self.paused = false;
        }
    }

    /// Freeze the interval without ending the measurement
    pub fn pause(&mut self) {
        if !self.paused && !self.stopped {
            if let Some(origin) = self.started_at {
                self.frozen = origin.elapsed();
            }
            self.paused = true;
        }
    }

    /// End the measurement, freezing the interval as final
    pub fn stop(&mut self) {
        if !self.paused {
            if let Some(origin) = self.started_at {
                self.frozen = origin.elapsed();
            }
        }
        self.stopped = true;
        self.paused = false;
    }

    /// Accumulated elapsed interval in seconds
    pub fn time(&self) -> f64 {
        if self.stopped || self.paused {
            self.frozen.as_secs_f64()
        } else if let Some(origin) = self.started_at {
            origin.elapsed().as_secs_f64()
        } else {
            0.0
        }
    }

    pub fn is_running(&self) -> bool {
        !(self.paused || self.stopped)
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
