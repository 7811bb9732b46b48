//! The pipeline-wide error taxonomy, threaded through every component.
//!
//! [`flashcard_core::ErrorKind`] already implements the full §7 taxonomy, so
//! `PipelineError` is that type rather than a reimplementation of it; this
//! module's job is converting each component's own error type down into it.

use flashcard_cache::CacheError;
use flashcard_circuitbreaker::CircuitBreakerError;
use flashcard_ratelimiter::RateLimiterError;
use flashcard_retry::RetryExhausted;

pub use flashcard_core::ErrorKind as PipelineError;

pub(crate) fn from_rate_limiter(err: RateLimiterError) -> PipelineError {
    err.into()
}

pub(crate) fn from_retry_exhausted(err: RetryExhausted<PipelineError>) -> PipelineError {
    err.last_error
}

/// `CircuitBreakerError::Inner` carries whatever the wrapped operation
/// returns, which here is always a `PipelineError` already — unlike the
/// blanket `From<CircuitBreakerError<E>>` impl in `flashcard-circuitbreaker`
/// (which can't see through a generic `E`), this unwraps it directly instead
/// of collapsing it to `Invariant`.
pub(crate) fn from_circuit_breaker(err: CircuitBreakerError<PipelineError>) -> PipelineError {
    match err {
        CircuitBreakerError::Open { retry_after } => PipelineError::CircuitOpen { retry_after },
        CircuitBreakerError::Inner(inner) => inner,
    }
}

pub(crate) fn from_cache(err: CacheError<PipelineError>) -> PipelineError {
    match err {
        CacheError::Compute(inner) => inner,
        CacheError::Io(io_err) => PipelineError::Invariant(format!("cache storage error: {io_err}")),
        CacheError::Lost => PipelineError::Invariant(
            "cache: leading caller was dropped before completing the computation".to_string(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn circuit_breaker_inner_unwraps_directly() {
        let err = from_circuit_breaker(CircuitBreakerError::Inner(PipelineError::Timeout));
        assert_eq!(err, PipelineError::Timeout);
    }

    #[test]
    fn circuit_breaker_open_maps_to_circuit_open() {
        let err = from_circuit_breaker(CircuitBreakerError::Open {
            retry_after: Duration::from_secs(1),
        });
        assert!(err.is_safety());
    }

    #[test]
    fn cache_io_and_lost_map_to_invariant() {
        assert!(from_cache(CacheError::Io(std::io::Error::other("disk full"))).is_internal());
        assert!(from_cache(CacheError::<PipelineError>::Lost).is_internal());
    }
}
