//! The pipeline-wide error taxonomy.
//!
//! Every component (rate limiter, circuit breaker, retry executor, cache,
//! two-stage executor, orchestrator) reports failures through [`ErrorKind`]
//! so that the propagation policy — transient errors retried then recorded,
//! terminal-remote errors recorded as a per-entry failure, safety errors
//! bypassing retry, lifecycle errors terminal for the attempt, internal
//! errors aborting the batch — is implemented once, at the orchestrator,
//! instead of once per component.

use std::fmt;
use std::time::Duration;

/// A single non-overlapping error kind in the pipeline's taxonomy.
///
/// # Examples
///
/// ```
/// use flashcard_core::ErrorKind;
/// use std::time::Duration;
///
/// let err = ErrorKind::RateLimited { retry_after: Some(Duration::from_millis(500)) };
/// assert!(err.is_transient());
/// assert!(!err.is_terminal_remote());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    /// Transient: the remote network call failed in a way that may succeed
    /// on retry (connection reset, DNS failure, etc).
    Network(String),
    /// Transient: the remote call did not complete within its deadline.
    Timeout,
    /// Transient: the remote returned a 5xx-equivalent server error.
    Server5xx(u16),
    /// Transient: the remote rejected the call as rate-limited, optionally
    /// telling us how long to wait before trying again.
    RateLimited {
        /// Hint from the remote about how long to wait before retrying.
        retry_after: Option<Duration>,
    },

    /// Terminal-remote: the remote rejected the call as a client error
    /// (bad request, auth failure, not found). Not retryable.
    Client4xx(u16),
    /// Terminal-remote: the remote's response could not be parsed into the
    /// expected shape.
    Parse(String),
    /// Terminal-remote: the request is fundamentally unanswerable by the
    /// remote (e.g. a term the model refuses to process).
    Infeasible(String),

    /// Safety: the circuit breaker rejected the call without invoking the
    /// remote. Not retryable by the retry executor; the orchestrator may
    /// mark the entry failed or re-enqueue after `retry_after`.
    CircuitOpen {
        /// How long until the breaker's open period ends.
        retry_after: Duration,
    },

    /// Lifecycle: the operation was cancelled before completing.
    Cancelled,
    /// Lifecycle: the operation exceeded its per-entry deadline.
    EntryTimeout(Duration),

    /// Internal: an invariant the pipeline relies on was violated. Never
    /// suppressed; always surfaced and aborts the batch.
    Invariant(String),
}

impl ErrorKind {
    /// `true` for the Transient category: retryable by the retry executor.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::Network(_)
                | ErrorKind::Timeout
                | ErrorKind::Server5xx(_)
                | ErrorKind::RateLimited { .. }
        )
    }

    /// `true` for the Terminal-remote category: bypasses retry, recorded as
    /// a per-entry failure.
    pub fn is_terminal_remote(&self) -> bool {
        matches!(
            self,
            ErrorKind::Client4xx(_) | ErrorKind::Parse(_) | ErrorKind::Infeasible(_)
        )
    }

    /// `true` for the Safety category: the circuit breaker rejected the call.
    pub fn is_safety(&self) -> bool {
        matches!(self, ErrorKind::CircuitOpen { .. })
    }

    /// `true` for the Lifecycle category: terminal for this attempt only.
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, ErrorKind::Cancelled | ErrorKind::EntryTimeout(_))
    }

    /// `true` for the Internal category: indicates a bug, aborts the batch.
    pub fn is_internal(&self) -> bool {
        matches!(self, ErrorKind::Invariant(_))
    }

    /// The remote-supplied or breaker-supplied retry hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ErrorKind::RateLimited { retry_after } => *retry_after,
            ErrorKind::CircuitOpen { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Network(msg) => write!(f, "network error: {msg}"),
            ErrorKind::Timeout => write!(f, "call timed out"),
            ErrorKind::Server5xx(code) => write!(f, "server error ({code})"),
            ErrorKind::RateLimited { retry_after } => match retry_after {
                Some(d) => write!(f, "rate limited, retry after {d:?}"),
                None => write!(f, "rate limited"),
            },
            ErrorKind::Client4xx(code) => write!(f, "client error ({code})"),
            ErrorKind::Parse(msg) => write!(f, "parse error: {msg}"),
            ErrorKind::Infeasible(msg) => write!(f, "infeasible request: {msg}"),
            ErrorKind::CircuitOpen { retry_after } => {
                write!(f, "circuit open, retry after {retry_after:?}")
            }
            ErrorKind::Cancelled => write!(f, "operation cancelled"),
            ErrorKind::EntryTimeout(d) => write!(f, "entry exceeded deadline of {d:?}"),
            ErrorKind::Invariant(msg) => write!(f, "internal invariant violated: {msg}"),
        }
    }
}

impl std::error::Error for ErrorKind {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categorizes_transient() {
        let err = ErrorKind::Server5xx(503);
        assert!(err.is_transient());
        assert!(!err.is_terminal_remote());
        assert!(!err.is_safety());
    }

    #[test]
    fn categorizes_terminal_remote() {
        let err = ErrorKind::Client4xx(404);
        assert!(err.is_terminal_remote());
        assert!(!err.is_transient());
    }

    #[test]
    fn circuit_open_carries_retry_after() {
        let err = ErrorKind::CircuitOpen {
            retry_after: Duration::from_secs(1),
        };
        assert!(err.is_safety());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn categories_are_mutually_exclusive() {
        let all = [
            ErrorKind::Network("x".into()),
            ErrorKind::Timeout,
            ErrorKind::Server5xx(500),
            ErrorKind::RateLimited { retry_after: None },
            ErrorKind::Client4xx(400),
            ErrorKind::Parse("x".into()),
            ErrorKind::Infeasible("x".into()),
            ErrorKind::CircuitOpen {
                retry_after: Duration::ZERO,
            },
            ErrorKind::Cancelled,
            ErrorKind::EntryTimeout(Duration::ZERO),
            ErrorKind::Invariant("x".into()),
        ];
        for e in &all {
            let flags = [
                e.is_transient(),
                e.is_terminal_remote(),
                e.is_safety(),
                e.is_lifecycle(),
                e.is_internal(),
            ];
            assert_eq!(flags.iter().filter(|b| **b).count(), 1, "{e:?}");
        }
    }
}
