use crate::events::RateLimiterEvent;
use flashcard_core::events::{EventListeners, FnListener};
use std::time::Duration;

/// Configuration for a [`crate::RateLimiter`].
pub struct RateLimiterConfig {
    pub(crate) rate: u64,
    pub(crate) period: Duration,
    pub(crate) burst: u64,
    pub(crate) shards: usize,
    pub(crate) adaptive: bool,
    pub(crate) reservation_grace: Duration,
    pub(crate) event_listeners: EventListeners<RateLimiterEvent>,
    pub(crate) name: String,
}

/// Builder for [`RateLimiterConfig`].
pub struct RateLimiterConfigBuilder {
    rate: u64,
    period: Duration,
    burst: u64,
    shards: usize,
    adaptive: bool,
    reservation_grace: Duration,
    event_listeners: EventListeners<RateLimiterEvent>,
    name: String,
}

impl Default for RateLimiterConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiterConfigBuilder {
    /// Defaults: 60 ops / 1s, burst 10, 4 shards, adaptive off, 200ms reservation grace.
    pub fn new() -> Self {
        Self {
            rate: 60,
            period: Duration::from_secs(1),
            burst: 10,
            shards: 4,
            adaptive: false,
            reservation_grace: Duration::from_millis(200),
            event_listeners: EventListeners::new(),
            name: "<unnamed>".to_string(),
        }
    }

    /// Average admitted rate: `rate` operations per `period`.
    pub fn rate(mut self, rate: u64, period: Duration) -> Self {
        self.rate = rate;
        self.period = period;
        self
    }

    /// Total burst capacity shared across all shards (`B` in the design).
    pub fn burst(mut self, burst: u64) -> Self {
        self.burst = burst;
        self
    }

    /// Number of shards (`N`) work is hash-partitioned across.
    pub fn shards(mut self, shards: usize) -> Self {
        self.shards = shards.max(1);
        self
    }

    /// Enables adaptive resharding: shard imbalance above a threshold grows
    /// the shard count, migrating outstanding reservations by execute-time order.
    pub fn adaptive(mut self, adaptive: bool) -> Self {
        self.adaptive = adaptive;
        self
    }

    /// Grace period after `execute_at` during which an unredeemed reservation
    /// still holds its tokens before they are returned to the shard.
    pub fn reservation_grace(mut self, grace: Duration) -> Self {
        self.reservation_grace = grace;
        self
    }

    /// Sets the name for this rate limiter instance (used in events).
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback invoked when a call is admitted.
    pub fn on_admitted<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RateLimiterEvent::Admitted { shard, waited, .. } = event {
                f(*shard, *waited);
            }
        }));
        self
    }

    /// Registers a callback invoked when a call is rejected.
    pub fn on_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RateLimiterEvent::Rejected { shard, .. } = event {
                f(*shard);
            }
        }));
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> RateLimiterConfig {
        RateLimiterConfig {
            rate: self.rate,
            period: self.period,
            burst: self.burst,
            shards: self.shards,
            adaptive: self.adaptive,
            reservation_grace: self.reservation_grace,
            event_listeners: self.event_listeners,
            name: self.name,
        }
    }
}

impl RateLimiterConfig {
    /// Starts a new builder with defaults.
    pub fn builder() -> RateLimiterConfigBuilder {
        RateLimiterConfigBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let config = RateLimiterConfig::builder().build();
        assert_eq!(config.rate, 60);
        assert_eq!(config.shards, 4);
        assert!(!config.adaptive);
    }

    #[test]
    fn builder_custom_values() {
        let config = RateLimiterConfig::builder()
            .rate(100, Duration::from_secs(2))
            .burst(20)
            .shards(8)
            .adaptive(true)
            .name("stage1")
            .build();
        assert_eq!(config.rate, 100);
        assert_eq!(config.burst, 20);
        assert_eq!(config.shards, 8);
        assert!(config.adaptive);
        assert_eq!(config.name, "stage1");
    }
}
