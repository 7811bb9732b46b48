//! Informative (non-safety-critical) classification of failure patterns.
//!
//! Looks only at inter-arrival times between failures in the current
//! window; never influences the state machine, only the observability
//! surface and [`crate::store::BreakerStore`] pattern records.

use std::time::{Duration, Instant};

/// A label for the shape of failures observed in a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePattern {
    /// Most failures landed in a short span relative to the window.
    Burst,
    /// Failures are spread roughly evenly across the whole window.
    Sustained,
    /// Inter-arrival times are close to constant (low variance).
    Periodic,
    /// No discernible pattern; few failures or high variance.
    Sporadic,
}

/// Classifies a set of failure timestamps (oldest first) within `window`.
pub fn classify(failures: &[Instant], window: Duration) -> FailurePattern {
    if failures.len() < 3 {
        return FailurePattern::Sporadic;
    }

    let gaps: Vec<Duration> = failures
        .windows(2)
        .map(|pair| pair[1].saturating_duration_since(pair[0]))
        .collect();

    let total_span = failures
        .last()
        .unwrap()
        .saturating_duration_since(*failures.first().unwrap());

    if total_span < window / 4 {
        return FailurePattern::Burst;
    }

    let mean = gaps.iter().sum::<Duration>().as_secs_f64() / gaps.len() as f64;
    if mean <= 0.0 {
        return FailurePattern::Burst;
    }

    let variance = gaps
        .iter()
        .map(|g| {
            let diff = g.as_secs_f64() - mean;
            diff * diff
        })
        .sum::<f64>()
        / gaps.len() as f64;
    let coefficient_of_variation = variance.sqrt() / mean;

    if coefficient_of_variation < 0.3 {
        FailurePattern::Periodic
    } else if total_span >= window.mul_f64(0.75) {
        FailurePattern::Sustained
    } else {
        FailurePattern::Sporadic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: &[u64]) -> Vec<Instant> {
        let base = Instant::now();
        ms.iter().map(|&m| base + Duration::from_millis(m)).collect()
    }

    #[test]
    fn too_few_samples_is_sporadic() {
        let failures = at(&[0, 10]);
        assert_eq!(classify(&failures, Duration::from_secs(30)), FailurePattern::Sporadic);
    }

    #[test]
    fn tightly_clustered_failures_are_a_burst() {
        let failures = at(&[0, 50, 100, 150]);
        assert_eq!(classify(&failures, Duration::from_secs(30)), FailurePattern::Burst);
    }

    #[test]
    fn evenly_spaced_failures_are_periodic() {
        let failures = at(&[0, 10_000, 20_000, 30_000]);
        assert_eq!(classify(&failures, Duration::from_secs(30)), FailurePattern::Periodic);
    }
}
