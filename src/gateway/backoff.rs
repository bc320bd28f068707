//! Reconnect delay schedule.
//!
//! Reconnection never gives up. Each consecutive failed session doubles the
//! wait from `base` up to `cap`, and up to 25% random jitter is added so a
//! fleet of archivers does not reconnect in lockstep after an outage. The
//! schedule is reset once a session reaches `READY`.

use std::time::Duration;

use rand::Rng;

/// Default delay before the first reconnect (5 seconds).
pub const DEFAULT_RECONNECT_BASE: Duration = Duration::from_secs(5);

/// Default upper bound on the reconnect delay (2 minutes).
pub const DEFAULT_RECONNECT_CAP: Duration = Duration::from_secs(120);

/// Growth factor between consecutive attempts.
const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Jitter as a fraction of the capped delay.
const JITTER_FRACTION: f64 = 0.25;

/// Exponential backoff with a cap and additive jitter.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    attempt: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_RECONNECT_BASE, DEFAULT_RECONNECT_CAP)
    }
}

impl Backoff {
    /// Creates a schedule. A `cap` below `base` is raised to `base`.
    #[must_use]
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap: cap.max(base),
            attempt: 0,
        }
    }

    /// Number of delays handed out since the last reset.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns the delay before the next attempt and advances the schedule.
    ///
    /// Formula: `min(base * 2^attempt, cap) + jitter`, jitter in
    /// `[0, 25%]` of the capped value.
    pub fn next_delay(&mut self) -> Duration {
        let capped = self.capped_delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);

        let jitter_ms = (capped.as_millis() as f64 * JITTER_FRACTION) as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        capped + Duration::from_millis(jitter)
    }

    /// Starts the schedule over from `base`.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    fn capped_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(63) as i32;
        let delay_ms = self.base.as_millis() as f64 * BACKOFF_MULTIPLIER.powi(exponent);
        let capped_ms = delay_ms.min(self.cap.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }
}
