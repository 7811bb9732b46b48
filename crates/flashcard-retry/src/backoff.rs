//! Delay computation for [`crate::retry`].

use std::time::Duration;

/// `d = min(max_delay, initial_delay * base^attempt)`; when `jitter` is set,
/// sample uniformly from `[d/2, d]`.
#[derive(Debug, Clone)]
pub struct BackoffSchedule {
    initial_delay: Duration,
    max_delay: Duration,
    base: f64,
    jitter: bool,
}

impl BackoffSchedule {
    pub fn new(initial_delay: Duration, max_delay: Duration, base: f64, jitter: bool) -> Self {
        Self {
            initial_delay,
            max_delay,
            base,
            jitter,
        }
    }

    /// Delay before the attempt after `attempt` (zero-indexed).
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let raw = self.initial_delay.as_secs_f64() * self.base.powi(attempt as i32);
        let capped = raw.min(self.max_delay.as_secs_f64());
        let capped = Duration::from_secs_f64(capped.max(0.0));

        if self.jitter {
            use rand::Rng;
            let half = capped.as_secs_f64() / 2.0;
            let sampled = rand::rng().random_range(half..=capped.as_secs_f64());
            Duration::from_secs_f64(sampled)
        } else {
            capped
        }
    }
}
