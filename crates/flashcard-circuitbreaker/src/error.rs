use flashcard_core::ErrorKind;
use std::fmt;
use std::time::Duration;

/// Errors returned by the circuit breaker.
#[derive(Debug, Clone, PartialEq)]
pub enum CircuitBreakerError<E> {
    /// The circuit is open (or a `HalfOpen` probe slot wasn't available);
    /// the call was rejected without invoking `op`.
    Open { retry_after: Duration },
    /// `op` ran and returned an application error.
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for CircuitBreakerError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitBreakerError::Open { retry_after } => {
                write!(f, "circuit open, retry after {retry_after:?}")
            }
            CircuitBreakerError::Inner(e) => write!(f, "{e}"),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for CircuitBreakerError<E> {}

impl<E> CircuitBreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitBreakerError::Open { .. })
    }
}

impl<E> From<CircuitBreakerError<E>> for ErrorKind {
    fn from(err: CircuitBreakerError<E>) -> Self {
        match err {
            CircuitBreakerError::Open { retry_after } => ErrorKind::CircuitOpen { retry_after },
            CircuitBreakerError::Inner(_) => {
                ErrorKind::Invariant("circuit breaker: inner error not converted by caller".into())
            }
        }
    }
}
