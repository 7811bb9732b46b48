//! Error classification hooks for [`crate::retry`].

use std::time::Duration;

/// Types an error can carry a server-provided retry hint on. Rate-limited
/// and circuit-open errors override the computed backoff delay with the
/// larger of the two.
pub trait RetryAfterHint {
    fn retry_after_hint(&self) -> Option<Duration> {
        None
    }
}

impl RetryAfterHint for flashcard_core::ErrorKind {
    fn retry_after_hint(&self) -> Option<Duration> {
        self.retry_after()
    }
}

impl RetryAfterHint for String {}

pub type RetryPredicate<E> = Box<dyn Fn(&E) -> bool + Send + Sync>;
