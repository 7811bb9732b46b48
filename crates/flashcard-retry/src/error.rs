use std::fmt;

/// Returned by [`crate::retry`] when every attempt failed or `retry_on`
/// short-circuited.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryExhausted<E> {
    pub last_error: E,
    pub attempts: usize,
}

impl<E: fmt::Display> fmt::Display for RetryExhausted<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "retry exhausted after {} attempt(s): {}",
            self.attempts, self.last_error
        )
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RetryExhausted<E> {}
