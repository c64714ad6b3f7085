//! Full-jitter retry backoff with a growing ceiling.

use rand::Rng;
use std::time::Duration;

/// Generates retry waits between a minimum and a maximum bound.
///
/// Each wait is sampled uniformly from `[min, 3 × previous]` and capped at
/// `max`, spreading concurrent failing batches apart while keeping the
/// worst-case wait bounded. The first call passes `min()` as `last`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    min: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    /// Lower bound; also the seed value for the first `next` call.
    pub fn min(&self) -> Duration {
        self.min
    }

    /// Upper bound for any generated wait.
    pub fn max(&self) -> Duration {
        self.max
    }

    /// Sample the wait that follows a wait of `last`.
    pub fn next(&self, last: Duration) -> Duration {
        self.next_with_rng(last, &mut rand::rng())
    }

    /// Sample with a caller-supplied RNG (for deterministic tests).
    pub fn next_with_rng<R: Rng>(&self, last: Duration, rng: &mut R) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        let ceiling = (last.as_millis() as u64).saturating_mul(3);

        let raw = if ceiling <= min { min } else { rng.random_range(min..=ceiling) };
        Duration::from_millis(raw.min(max))
    }
}
