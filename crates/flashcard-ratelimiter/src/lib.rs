//! Sharded token-bucket rate limiter with reservations.
//!
//! Admits operations at a configured average rate with burst capacity,
//! distributing work across shards hashed by caller-supplied key to reduce
//! contention. See [`RateLimiter`] for the non-blocking, blocking, and
//! reservation-based acquisition contracts.
//!
//! ```
//! use flashcard_ratelimiter::{RateLimiter, RateLimiterConfig};
//! use std::time::Duration;
//!
//! let config = RateLimiterConfig::builder()
//!     .rate(60, Duration::from_secs(1))
//!     .burst(10)
//!     .shards(4)
//!     .build();
//! let limiter = RateLimiter::new(config);
//! let outcome = limiter.try_acquire(Some("term-key"), 1).unwrap();
//! assert!(outcome.allowed);
//! ```

mod config;
mod error;
mod events;
mod limiter;

pub use config::{RateLimiterConfig, RateLimiterConfigBuilder};
pub use error::RateLimiterError;
pub use events::RateLimiterEvent;
pub use limiter::{RateLimiter, Reservation, TryAcquireOutcome};
