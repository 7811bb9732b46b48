use crate::backoff::BackoffSchedule;
use crate::events::RetryEvent;
use crate::policy::RetryPredicate;
use flashcard_core::events::{EventListeners, FnListener};
use std::time::Duration;

/// Configuration for [`crate::retry`].
pub struct RetryConfig<E> {
    pub(crate) max_attempts: usize,
    pub(crate) schedule: BackoffSchedule,
    pub(crate) retry_on: Option<RetryPredicate<E>>,
    pub(crate) event_listeners: EventListeners<RetryEvent>,
    pub(crate) name: String,
}

/// Builder for [`RetryConfig`].
pub struct RetryConfigBuilder<E> {
    max_attempts: usize,
    initial_delay: Duration,
    max_delay: Duration,
    base: f64,
    jitter: bool,
    retry_on: Option<RetryPredicate<E>>,
    event_listeners: EventListeners<RetryEvent>,
    name: String,
}

impl<E> Default for RetryConfigBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> RetryConfigBuilder<E> {
    /// Defaults: 3 attempts, 100ms initial delay doubling up to 10s, no jitter,
    /// `retry_on` unset (every error is retried until attempts are exhausted).
    pub fn new() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            base: 2.0,
            jitter: false,
            retry_on: None,
            event_listeners: EventListeners::new(),
            name: "<unnamed>".to_string(),
        }
    }

    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Growth factor applied per attempt. `1.0` gives a fixed interval.
    pub fn base(mut self, base: f64) -> Self {
        self.base = base;
        self
    }

    pub fn jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Predicate consulted on every failure; returning `false` short-circuits
    /// the retry loop and surfaces the error unwrapped.
    pub fn retry_on<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.retry_on = Some(Box::new(predicate));
        self
    }

    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Retry { attempt, delay, .. } = event {
                f(*attempt, *delay);
            }
        }));
        self
    }

    pub fn build(self) -> RetryConfig<E> {
        RetryConfig {
            max_attempts: self.max_attempts.max(1),
            schedule: BackoffSchedule::new(self.initial_delay, self.max_delay, self.base, self.jitter),
            retry_on: self.retry_on,
            event_listeners: self.event_listeners,
            name: self.name,
        }
    }
}

impl<E> RetryConfig<E> {
    pub fn builder() -> RetryConfigBuilder<E> {
        RetryConfigBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let config = RetryConfig::<String>::builder().build();
        assert_eq!(config.max_attempts, 3);
    }

    #[test]
    fn retry_on_predicate_is_stored() {
        let config = RetryConfig::<String>::builder()
            .retry_on(|e: &String| e == "retryable")
            .build();
        assert!((config.retry_on.as_ref().unwrap())(&"retryable".to_string()));
        assert!(!(config.retry_on.as_ref().unwrap())(&"fatal".to_string()));
    }
}
