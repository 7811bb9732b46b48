use crate::events::CircuitBreakerEvent;
use flashcard_core::events::{EventListeners, FnListener};
use std::time::Duration;

/// Configuration for a [`crate::CircuitBreaker`], shared across every
/// service it tracks.
pub struct CircuitBreakerConfig {
    pub(crate) window: Duration,
    pub(crate) min_throughput: usize,
    pub(crate) failure_threshold: f64,
    pub(crate) break_duration: Duration,
    pub(crate) break_duration_multiplier: f64,
    pub(crate) max_break_duration: Duration,
    pub(crate) max_probes: u32,
    pub(crate) event_listeners: EventListeners<CircuitBreakerEvent>,
    #[cfg_attr(not(any(feature = "metrics", feature = "tracing")), allow(dead_code))]
    pub(crate) name: String,
}

/// Builder for [`CircuitBreakerConfig`].
pub struct CircuitBreakerConfigBuilder {
    window: Duration,
    min_throughput: usize,
    failure_threshold: f64,
    break_duration: Duration,
    break_duration_multiplier: f64,
    max_break_duration: Duration,
    max_probes: u32,
    event_listeners: EventListeners<CircuitBreakerEvent>,
    name: String,
}

impl Default for CircuitBreakerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreakerConfigBuilder {
    /// Defaults: 30s sliding window, `min_throughput=5`,
    /// `failure_threshold=0.5`, `break_duration=1s` escalating
    /// exponentially (multiplier 2.0) up to a 60s cap, 1 half-open probe.
    pub fn new() -> Self {
        Self {
            window: Duration::from_secs(30),
            min_throughput: 5,
            failure_threshold: 0.5,
            break_duration: Duration::from_secs(1),
            break_duration_multiplier: 2.0,
            max_break_duration: Duration::from_secs(60),
            max_probes: 1,
            event_listeners: EventListeners::new(),
            name: "<unnamed>".to_string(),
        }
    }

    /// Length of the sliding time window `W` used to evaluate failure rate.
    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Minimum number of samples in the window before failure rate is evaluated.
    pub fn min_throughput(mut self, min_throughput: usize) -> Self {
        self.min_throughput = min_throughput;
        self
    }

    /// Fraction of failures in the window that opens the circuit.
    pub fn failure_threshold(mut self, threshold: f64) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Initial `Open` duration.
    pub fn break_duration(mut self, duration: Duration) -> Self {
        self.break_duration = duration;
        self
    }

    /// Multiplier applied to `break_duration` each time a half-open probe
    /// fails. `1.0` gives a fixed break-duration sequence instead of
    /// exponential backoff.
    pub fn break_duration_multiplier(mut self, multiplier: f64) -> Self {
        self.break_duration_multiplier = multiplier;
        self
    }

    /// Upper bound the escalating break duration is capped at.
    pub fn max_break_duration(mut self, max: Duration) -> Self {
        self.max_break_duration = max;
        self
    }

    /// Concurrent probe slots admitted while `HalfOpen`.
    pub fn max_probes(mut self, max_probes: u32) -> Self {
        self.max_probes = max_probes;
        self
    }

    /// Sets the name for this breaker instance (used in events).
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback invoked on every state transition.
    pub fn on_state_transition<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let CircuitBreakerEvent::StateTransition { service, from, to, .. } = event {
                f(service, to);
                let _ = from;
            }
        }));
        self
    }

    pub fn build(self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            window: self.window,
            min_throughput: self.min_throughput,
            failure_threshold: self.failure_threshold,
            break_duration: self.break_duration,
            break_duration_multiplier: self.break_duration_multiplier,
            max_break_duration: self.max_break_duration,
            max_probes: self.max_probes,
            event_listeners: self.event_listeners,
            name: self.name,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let config = CircuitBreakerConfig::builder().build();
        assert_eq!(config.min_throughput, 5);
        assert_eq!(config.failure_threshold, 0.5);
        assert_eq!(config.max_probes, 1);
    }
}
