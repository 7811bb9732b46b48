//! Observability events for the cache.

use flashcard_core::ResilienceEvent;
use std::time::Instant;

/// Events emitted by [`crate::Cache`].
#[derive(Debug, Clone)]
pub enum CacheEvent {
    /// The fingerprint was found in L1 or L2.
    Hit { pattern_name: String, timestamp: Instant, tier: &'static str },
    /// The fingerprint was absent from both tiers and `compute` ran.
    Miss { pattern_name: String, timestamp: Instant },
    /// A concurrent caller joined an in-flight computation instead of
    /// starting its own.
    Coalesced { pattern_name: String, timestamp: Instant },
    /// An L1 entry was evicted to make room.
    Eviction { pattern_name: String, timestamp: Instant },
}

impl ResilienceEvent for CacheEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CacheEvent::Hit { .. } => "hit",
            CacheEvent::Miss { .. } => "miss",
            CacheEvent::Coalesced { .. } => "coalesced",
            CacheEvent::Eviction { .. } => "eviction",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            CacheEvent::Hit { timestamp, .. }
            | CacheEvent::Miss { timestamp, .. }
            | CacheEvent::Coalesced { timestamp, .. }
            | CacheEvent::Eviction { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            CacheEvent::Hit { pattern_name, .. }
            | CacheEvent::Miss { pattern_name, .. }
            | CacheEvent::Coalesced { pattern_name, .. }
            | CacheEvent::Eviction { pattern_name, .. } => pattern_name,
        }
    }
}
