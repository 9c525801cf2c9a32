//! Notification period estimate.
//!
//! Monitors sometimes deliver notifications in small bursts, so the raw
//! spacing between two notifications is noisy. The estimate is an
//! exponential moving average of that spacing and is only used for
//! diagnostics.

use std::time::{Duration, Instant};

/// Smoothed estimate of the time between notifications.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodEstimate {
    /// Current estimate in seconds.
    period: f64,
    /// Time of the previous sample.
    last_sample: Instant,
}

impl PeriodEstimate {
    /// Weight of each new sample.
    pub const SMOOTHING: f64 = 1.0 / 16.0;

    /// Starting estimate before any notification arrived.
    pub const INITIAL_PERIOD: Duration = Duration::from_secs(1);

    /// Start an estimate as if a sample arrived one initial period before `now`.
    pub fn new(now: Instant) -> Self {
        Self::with_initial(Self::INITIAL_PERIOD, now)
    }

    /// Start an estimate with a custom initial period.
    pub fn with_initial(initial: Duration, now: Instant) -> Self {
        Self {
            period: initial.as_secs_f64(),
            last_sample: now.checked_sub(initial).unwrap_or(now),
        }
    }

    /// Record a sample at `now` and return the updated estimate.
    pub fn update(&mut self, now: Instant) -> Duration {
        let elapsed = now.saturating_duration_since(self.last_sample).as_secs_f64();
        self.period += Self::SMOOTHING * (elapsed - self.period);
        self.last_sample = now;
        self.period()
    }

    /// Current estimate.
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(self.period.max(0.0))
    }

    /// Current estimate in seconds.
    pub fn period_secs(&self) -> f64 {
        self.period
    }

    /// Notification rate implied by the estimate, in Hz.
    pub fn rate_hz(&self) -> f64 {
        if self.period <= 0.0 {
            0.0
        } else {
            1.0 / self.period
        }
    }
}
