//! Retry executor with exponential backoff and jitter.
//!
//! ```
//! use flashcard_retry::{retry, RetryConfig};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let attempts = Arc::new(AtomicUsize::new(0));
//! let config = RetryConfig::<String>::builder()
//!     .max_attempts(3)
//!     .initial_delay(Duration::from_millis(1))
//!     .build();
//!
//! let a = Arc::clone(&attempts);
//! let result = retry(&config, move || {
//!     let a = Arc::clone(&a);
//!     async move {
//!         if a.fetch_add(1, Ordering::SeqCst) < 2 {
//!             Err("not yet".to_string())
//!         } else {
//!             Ok::<_, String>("done")
//!         }
//!     }
//! })
//! .await;
//! assert_eq!(result, Ok("done"));
//! # }
//! ```

mod backoff;
mod config;
mod error;
mod events;
mod policy;

pub use backoff::BackoffSchedule;
pub use config::{RetryConfig, RetryConfigBuilder};
pub use error::RetryExhausted;
pub use events::RetryEvent;
pub use policy::{RetryAfterHint, RetryPredicate};

use std::future::Future;
use std::time::Instant;

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter};

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

/// Runs `op` until it succeeds, `retry_on` rejects the error, or
/// `config.max_attempts` is exhausted.
pub async fn retry<F, Fut, T, E>(config: &RetryConfig<E>, mut op: F) -> Result<T, RetryExhausted<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryAfterHint,
{
    #[cfg(feature = "metrics")]
    {
        describe_counter!("retry_attempts_total", "Total number of retry attempts across all calls");
        describe_counter!("retry_exhausted_total", "Total number of calls that exhausted all retry attempts");
    }

    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => {
                #[cfg(feature = "tracing")]
                if attempt > 0 {
                    debug!(retry = %config.name, attempts = attempt + 1, "succeeded after retries");
                }
                config.event_listeners.emit(&RetryEvent::Success {
                    pattern_name: config.name.clone(),
                    timestamp: Instant::now(),
                    attempts: attempt + 1,
                });
                return Ok(value);
            }
            Err(error) => {
                if let Some(predicate) = &config.retry_on {
                    if !predicate(&error) {
                        config.event_listeners.emit(&RetryEvent::IgnoredError {
                            pattern_name: config.name.clone(),
                            timestamp: Instant::now(),
                        });
                        return Err(RetryExhausted {
                            last_error: error,
                            attempts: attempt + 1,
                        });
                    }
                }

                if attempt + 1 >= config.max_attempts {
                    #[cfg(feature = "metrics")]
                    counter!("retry_exhausted_total", "retry" => config.name.clone()).increment(1);

                    #[cfg(feature = "tracing")]
                    warn!(retry = %config.name, attempts = attempt + 1, "retry attempts exhausted");

                    config.event_listeners.emit(&RetryEvent::Exhausted {
                        pattern_name: config.name.clone(),
                        timestamp: Instant::now(),
                        attempts: attempt + 1,
                    });
                    return Err(RetryExhausted {
                        last_error: error,
                        attempts: attempt + 1,
                    });
                }

                let computed = config.schedule.delay_for(attempt);
                let delay = match error.retry_after_hint() {
                    Some(hint) if hint > computed => hint,
                    _ => computed,
                };

                #[cfg(feature = "metrics")]
                counter!("retry_attempts_total", "retry" => config.name.clone()).increment(1);

                #[cfg(feature = "tracing")]
                debug!(retry = %config.name, attempt = attempt + 1, delay_ms = delay.as_millis(), "retrying after delay");

                config.event_listeners.emit(&RetryEvent::Retry {
                    pattern_name: config.name.clone(),
                    timestamp: Instant::now(),
                    attempt,
                    delay,
                });

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn succeeds_without_retry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let config = RetryConfig::<String>::builder().build();

        let result = retry(&config, move || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(42)
            }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let config = RetryConfig::<String>::builder()
            .max_attempts(5)
            .initial_delay(Duration::from_millis(1))
            .build();

        let result = retry(&config, move || {
            let c = Arc::clone(&c);
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("not yet".to_string())
                } else {
                    Ok::<_, String>("done")
                }
            }
        })
        .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let config = RetryConfig::<String>::builder()
            .max_attempts(3)
            .initial_delay(Duration::from_millis(1))
            .build();

        let result = retry(&config, move || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>("always fails".to_string())
            }
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_on_false_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let config = RetryConfig::<String>::builder()
            .max_attempts(5)
            .retry_on(|e: &String| e != "fatal")
            .build();

        let result = retry(&config, move || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>("fatal".to_string())
            }
        })
        .await;

        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[derive(Debug, PartialEq)]
    struct RateLimited {
        retry_after: Duration,
    }

    impl RetryAfterHint for RateLimited {
        fn retry_after_hint(&self) -> Option<Duration> {
            Some(self.retry_after)
        }
    }

    #[tokio::test]
    async fn retry_after_hint_overrides_smaller_computed_delay() {
        let config = RetryConfig::<RateLimited>::builder()
            .max_attempts(2)
            .initial_delay(Duration::from_millis(1))
            .on_retry(|_, delay| {
                assert!(delay >= Duration::from_millis(50));
            })
            .build();

        let _ = retry(&config, || async {
            Err::<i32, _>(RateLimited {
                retry_after: Duration::from_millis(50),
            })
        })
        .await;
    }
}
