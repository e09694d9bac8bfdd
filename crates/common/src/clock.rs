//! Clock and timing utilities for render supervision.
//!
//! A render job is anchored to a monotonic clock epoch recorded when the
//! first subprocess starts. This module provides utilities for:
//! - Capturing the epoch together with its wall-clock time
//! - Estimating throughput and remaining time from frame counters
//! - Throttling periodic updates

use std::time::{Duration, Instant};

/// A render clock that provides monotonic timings relative to a fixed
/// epoch (the moment rendering started).
#[derive(Debug, Clone)]
pub struct RenderClock {
    /// The instant rendering started.
    epoch: Instant,

    /// Wall-clock time at epoch (RFC 3339 string).
    epoch_wall: String,
}

impl RenderClock {
    /// Create a new render clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Time elapsed since rendering started.
    pub fn elapsed(&self) -> Duration {
        self.epoch.elapsed()
    }

    /// Seconds elapsed since rendering started.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Wall-clock time at render start.
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }

    /// The underlying epoch instant.
    pub fn epoch(&self) -> Instant {
        self.epoch
    }
}

/// Throughput snapshot derived from frames done over elapsed time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Throughput {
    /// Frames rendered so far.
    pub frames_done: u64,
    /// Seconds spent rendering.
    pub elapsed_secs: f64,
}

impl Throughput {
    /// Frames per second, zero before any time has passed.
    pub fn fps(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            0.0
        } else {
            self.frames_done as f64 / self.elapsed_secs
        }
    }

    /// Estimated seconds left for `total_frames`, if it can be estimated.
    pub fn eta_secs(&self, total_frames: u64) -> Option<f64> {
        let fps = self.fps();
        if fps <= 0.0 || total_frames == 0 {
            return None;
        }
        let remaining = total_frames.saturating_sub(self.frames_done);
        Some(remaining as f64 / fps)
    }
}

/// Format a duration in seconds as `1h 02m 03s`, `2m 03s` or `3s`.
pub fn format_eta(secs: f64) -> String {
    let total = secs.max(0.0).round() as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{hours}h {minutes:02}m {seconds:02}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}

/// Rate controller for periodic updates.
#[derive(Debug)]
pub struct RateController {
    interval: Duration,
    last_tick: Option<Instant>,
}

impl RateController {
    /// Create a controller that fires at most once per `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_tick: None,
        }
    }

    /// Check if enough time has passed for the next tick.
    /// Returns true and updates internal state if ready.
    /// The first call always returns true.
    pub fn should_tick(&mut self, now: Instant) -> bool {
        match self.last_tick {
            None => {
                self.last_tick = Some(now);
                true
            }
            Some(last) if now.duration_since(last) >= self.interval => {
                self.last_tick = Some(now);
                true
            }
            _ => false,
        }
    }

    /// Minimum interval between ticks.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}
