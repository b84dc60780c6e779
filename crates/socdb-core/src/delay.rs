//! Randomised pauses between jobs and batches.
//!
//! Each caller samples independently, so concurrent waiters are not
//! serialised; the goal is to smear request bursts, not to enforce a rate.

use std::time::Duration;

use rand::Rng;

/// Inclusive `[min, max]` bound for a uniformly sampled pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    min: Duration,
    max: Duration,
}

impl DelayRange {
    /// A range that never sleeps.
    pub const NONE: DelayRange = DelayRange {
        min: Duration::ZERO,
        max: Duration::ZERO,
    };

    /// Builds a range from whole seconds. Bounds given in the wrong order are swapped.
    #[must_use]
    pub fn from_secs(min_secs: u64, max_secs: u64) -> Self {
        Self::new(Duration::from_secs(min_secs), Duration::from_secs(max_secs))
    }

    #[must_use]
    pub fn new(a: Duration, b: Duration) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    #[must_use]
    pub fn min(&self) -> Duration {
        self.min
    }

    #[must_use]
    pub fn max(&self) -> Duration {
        self.max
    }

    /// Draws a duration uniformly from `[min, max]` at millisecond resolution.
    #[must_use]
    pub fn sample(&self) -> Duration {
        #[allow(clippy::cast_possible_truncation)]
        let (lo, hi) = (self.min.as_millis() as u64, self.max.as_millis() as u64);
        if lo == hi {
            return self.min;
        }
        Duration::from_millis(rand::rng().random_range(lo..=hi))
    }

    /// Sleeps for a freshly sampled duration and returns it.
    pub async fn wait(&self) -> Duration {
        let pause = self.sample();
        if !pause.is_zero() {
            tracing::debug!(pause_ms = pause.as_millis(), "rate-limit pause");
            tokio::time::sleep(pause).await;
        }
        pause
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_stay_within_bounds() {
        let range = DelayRange::new(Duration::from_millis(100), Duration::from_millis(250));
        for _ in 0..500 {
            let d = range.sample();
            assert!(d >= Duration::from_millis(100) && d <= Duration::from_millis(250));
        }
    }

    #[test]
    fn reversed_bounds_are_swapped() {
        let range = DelayRange::from_secs(10, 5);
        assert_eq!(range.min(), Duration::from_secs(5));
        assert_eq!(range.max(), Duration::from_secs(10));
    }

    #[test]
    fn degenerate_range_is_constant() {
        let range = DelayRange::from_secs(3, 3);
        assert_eq!(range.sample(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn wait_sleeps_for_the_sampled_duration() {
        let range = DelayRange::new(Duration::from_millis(10), Duration::from_millis(30));
        let before = std::time::Instant::now();
        let slept = range.wait().await;
        assert!(slept >= Duration::from_millis(10) && slept <= Duration::from_millis(30));
        assert!(before.elapsed() >= slept);
    }

    #[tokio::test]
    async fn none_returns_immediately() {
        assert_eq!(DelayRange::NONE.wait().await, Duration::ZERO);
    }
}
