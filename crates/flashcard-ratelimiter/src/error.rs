use flashcard_core::ErrorKind;
use std::fmt;

/// Errors returned by the rate limiter.
#[derive(Debug, Clone, PartialEq)]
pub enum RateLimiterError {
    /// The deadline elapsed before `count` tokens became available.
    Timeout,
    /// `count` exceeds the shard's burst capacity; it can never be admitted.
    Infeasible { requested: u64, max_burst: u64 },
    /// No reservation exists for the given id, or it already expired/was redeemed.
    UnknownReservation,
}

impl fmt::Display for RateLimiterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimiterError::Timeout => write!(f, "rate limit acquire timed out"),
            RateLimiterError::Infeasible {
                requested,
                max_burst,
            } => write!(
                f,
                "requested {requested} tokens exceeds shard burst capacity {max_burst}"
            ),
            RateLimiterError::UnknownReservation => {
                write!(f, "reservation not found, already redeemed, or expired")
            }
        }
    }
}

impl std::error::Error for RateLimiterError {}

impl From<RateLimiterError> for ErrorKind {
    fn from(err: RateLimiterError) -> Self {
        match err {
            RateLimiterError::Timeout => ErrorKind::Timeout,
            RateLimiterError::Infeasible { requested, max_burst } => ErrorKind::Invariant(
                format!("rate limiter: requested {requested} exceeds max burst {max_burst}"),
            ),
            RateLimiterError::UnknownReservation => {
                ErrorKind::Invariant("rate limiter: unknown reservation".to_string())
            }
        }
    }
}
