//! Backoff policy: decides retry delays.

use std::time::Duration;

use rand::Rng;

/// Shortest delay ever returned, so a retry is never immediate.
const MIN_DELAY: Duration = Duration::from_millis(1);

/// Exponential backoff with a cap and symmetric jitter.
///
/// `nominal_delay(n) = min(base * 2^(n-1), max)`, and `delay(n)` scales that by
/// a random factor in `[1 - jitter, 1 + jitter]`, clamped to `[1ms, max]`.
///
/// Example with base=1s, max=60s:
/// - attempt 1: 1s
/// - attempt 2: 2s
/// - attempt 3: 4s
/// - attempt 7 and later: 60s
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
    jitter_fraction: f64,
}

impl BackoffPolicy {
    /// `jitter_fraction` is clamped into `[0, 1)`; `max` is raised to `base` if lower.
    pub fn new(base: Duration, max: Duration, jitter_fraction: f64) -> Self {
        let jitter_fraction = if jitter_fraction.is_finite() {
            jitter_fraction.clamp(0.0, 0.999)
        } else {
            0.0
        };
        let base = base.max(MIN_DELAY);
        Self {
            base,
            max: max.max(base),
            jitter_fraction,
        }
    }

    pub fn without_jitter(base: Duration, max: Duration) -> Self {
        Self::new(base, max, 0.0)
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// The delay before the next attempt, after `attempts` attempts so far.
    pub fn delay(&self, attempts: u32) -> Duration {
        let nominal = self.nominal_secs(attempts);
        if self.jitter_fraction == 0.0 {
            return clamp_secs(nominal, self.max);
        }

        let spread = rand::thread_rng().gen_range(-self.jitter_fraction..=self.jitter_fraction);
        clamp_secs(nominal * (1.0 + spread), self.max)
    }

    /// The delay without jitter. Used when rebuilding schedules after a restart.
    pub fn nominal_delay(&self, attempts: u32) -> Duration {
        clamp_secs(self.nominal_secs(attempts), self.max)
    }

    fn nominal_secs(&self, attempts: u32) -> f64 {
        // 2^62 seconds is far past any sane cap; keeps powi finite.
        let exponent = attempts.saturating_sub(1).min(62) as i32;
        let secs = self.base.as_secs_f64() * 2f64.powi(exponent);
        secs.min(self.max.as_secs_f64())
    }
}

fn clamp_secs(secs: f64, max: Duration) -> Duration {
    let secs = secs.clamp(MIN_DELAY.as_secs_f64(), max.as_secs_f64());
    Duration::from_secs_f64(secs)
}
