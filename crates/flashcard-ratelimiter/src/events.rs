//! Observability events for the rate limiter.

use flashcard_core::ResilienceEvent;
use std::time::{Duration, Instant};

/// Events emitted by [`crate::RateLimiter`].
#[derive(Debug, Clone)]
pub enum RateLimiterEvent {
    /// A call was admitted, possibly after waiting.
    Admitted {
        name: String,
        timestamp: Instant,
        shard: usize,
        waited: Duration,
    },
    /// A call was rejected (timeout elapsed, or `count > burst`).
    Rejected {
        name: String,
        timestamp: Instant,
        shard: usize,
    },
    /// A reservation was created.
    Reserved {
        name: String,
        timestamp: Instant,
        shard: usize,
        execute_at: Instant,
    },
    /// A reservation expired unredeemed and its tokens were returned.
    ReservationExpired {
        name: String,
        timestamp: Instant,
        shard: usize,
    },
    /// The shard count changed as a result of adaptive resharding.
    Resharded {
        name: String,
        timestamp: Instant,
        old_shards: usize,
        new_shards: usize,
    },
}

impl ResilienceEvent for RateLimiterEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RateLimiterEvent::Admitted { .. } => "admitted",
            RateLimiterEvent::Rejected { .. } => "rejected",
            RateLimiterEvent::Reserved { .. } => "reserved",
            RateLimiterEvent::ReservationExpired { .. } => "reservation_expired",
            RateLimiterEvent::Resharded { .. } => "resharded",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RateLimiterEvent::Admitted { timestamp, .. }
            | RateLimiterEvent::Rejected { timestamp, .. }
            | RateLimiterEvent::Reserved { timestamp, .. }
            | RateLimiterEvent::ReservationExpired { timestamp, .. }
            | RateLimiterEvent::Resharded { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            RateLimiterEvent::Admitted { name, .. }
            | RateLimiterEvent::Rejected { name, .. }
            | RateLimiterEvent::Reserved { name, .. }
            | RateLimiterEvent::ReservationExpired { name, .. }
            | RateLimiterEvent::Resharded { name, .. } => name,
        }
    }
}
