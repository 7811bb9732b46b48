//! Per-service circuit breaker.
//!
//! Tracks one [`circuit::Circuit`] per service name behind a service-scoped
//! mutex, deciding whether `call` may run `op` and transitioning between
//! `Closed`, `Open`, and `HalfOpen` based on a sliding failure-rate window.
//! State is written through an opaque [`store::BreakerStore`] after every
//! transition and restored on construction.
//!
//! ```
//! use flashcard_circuitbreaker::{CircuitBreaker, CircuitBreakerConfig};
//!
//! # async fn example() {
//! let breaker = CircuitBreaker::new(CircuitBreakerConfig::builder().build());
//! let result = breaker.call("translate-api", || async { Ok::<_, String>(42) }).await;
//! assert_eq!(result, Ok(42));
//! # }
//! ```

pub mod circuit;
mod classifier;
mod config;
mod error;
mod events;
pub mod store;

pub use classifier::FailurePattern;
pub use circuit::CircuitState;
pub use config::{CircuitBreakerConfig, CircuitBreakerConfigBuilder};
pub use error::CircuitBreakerError;
pub use events::CircuitBreakerEvent;
pub use store::{BreakerAlert, BreakerPatternRecord, BreakerStateRecord, BreakerStore, InMemoryBreakerStore};

use circuit::{Admission, Circuit, StateTag};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

/// Tracks a [`circuit::Circuit`] per service name and enforces the
/// `Closed -> Open -> HalfOpen -> (Closed | Open)` state machine around
/// caller-supplied async operations.
pub struct CircuitBreaker {
    config: Arc<CircuitBreakerConfig>,
    circuits: RwLock<HashMap<String, Arc<Mutex<Circuit>>>>,
    store: Arc<dyn BreakerStore>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_store(config, Arc::new(InMemoryBreakerStore::new()))
    }

    pub fn with_store(config: CircuitBreakerConfig, store: Arc<dyn BreakerStore>) -> Self {
        Self {
            config: Arc::new(config),
            circuits: RwLock::new(HashMap::new()),
            store,
        }
    }

    fn circuit_for(&self, service: &str) -> Arc<Mutex<Circuit>> {
        if let Some(existing) = self.circuits.read().unwrap().get(service) {
            return Arc::clone(existing);
        }
        let mut circuits = self.circuits.write().unwrap();
        if let Some(existing) = circuits.get(service) {
            return Arc::clone(existing);
        }
        let circuit = Arc::new(Mutex::new(self.restore_or_new(service)));
        circuits.insert(service.to_string(), Arc::clone(&circuit));
        circuit
    }

    fn restore_or_new(&self, service: &str) -> Circuit {
        match self.store.load_state(service) {
            Some(record) if record.state_tag != StateTag::Closed => {
                // Recovery failure (bad/partial record) just falls back to a
                // fresh in-memory circuit; recorded state is advisory only.
                let mut circuit = Circuit::new();
                if record.state_tag == StateTag::Open {
                    circuit.isolate();
                    circuit.reset();
                }
                circuit
            }
            _ => Circuit::new(),
        }
    }

    /// Executes `op` if the circuit admits it; otherwise fails fast with
    /// [`CircuitBreakerError::Open`]. Never call `record_success`/
    /// `record_failure` directly — `call` does that for you.
    pub async fn call<F, Fut, T, E>(&self, service: &str, op: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let circuit_handle = self.circuit_for(service);
        let now = Instant::now();

        let (admission, prior_state) = {
            let mut circuit = circuit_handle.lock().unwrap();
            let prior = circuit.state();
            let admission = circuit.try_admit(now, &self.config);
            (admission, prior)
        };

        let retry_after = match admission {
            Admission::Admit => None,
            Admission::Reject { retry_after } => Some(retry_after),
        };
        if let Some(retry_after) = retry_after {
            self.config.event_listeners.emit(&CircuitBreakerEvent::CallRejected {
                service: service.to_string(),
                timestamp: now,
            });
            #[cfg(feature = "tracing")]
            tracing::debug!(
                breaker = %self.config.name,
                service,
                retry_after_ms = retry_after.as_millis() as u64,
                "call rejected, circuit open"
            );
            #[cfg(feature = "metrics")]
            metrics::counter!("circuit_breaker_rejected_total", "breaker" => self.config.name.clone(), "service" => service.to_string())
                .increment(1);
            return Err(CircuitBreakerError::Open { retry_after });
        }
        self.maybe_emit_transition(service, &circuit_handle, prior_state);

        match op().await {
            Ok(value) => {
                self.record_success(service, &circuit_handle);
                Ok(value)
            }
            Err(err) => {
                self.record_failure(service, &circuit_handle);
                Err(CircuitBreakerError::Inner(err))
            }
        }
    }

    fn record_success(&self, service: &str, circuit_handle: &Arc<Mutex<Circuit>>) {
        let prior = {
            let mut circuit = circuit_handle.lock().unwrap();
            let prior = circuit.state();
            circuit.record_success(Instant::now(), &self.config);
            prior
        };
        self.maybe_emit_transition(service, circuit_handle, prior);
        self.persist(service, circuit_handle);
    }

    fn record_failure(&self, service: &str, circuit_handle: &Arc<Mutex<Circuit>>) {
        let prior = {
            let mut circuit = circuit_handle.lock().unwrap();
            let prior = circuit.state();
            circuit.record_failure(Instant::now(), &self.config);
            prior
        };
        self.maybe_emit_transition(service, circuit_handle, prior);
        self.persist(service, circuit_handle);
        self.maybe_emit_pattern(service, circuit_handle);
    }

    /// Forces the circuit open indefinitely until [`CircuitBreaker::reset`].
    pub fn isolate(&self, service: &str, reason: &str) {
        let circuit_handle = self.circuit_for(service);
        let prior = {
            let mut circuit = circuit_handle.lock().unwrap();
            let prior = circuit.state();
            circuit.isolate();
            prior
        };
        self.maybe_emit_transition(service, &circuit_handle, prior);
        self.store.append_alert(
            service,
            BreakerAlert {
                message: format!("isolated: {reason}"),
                at: Instant::now(),
            },
        );
        self.persist(service, &circuit_handle);
    }

    /// Forces the circuit closed and clears its counters.
    pub fn reset(&self, service: &str) {
        let circuit_handle = self.circuit_for(service);
        let prior = {
            let mut circuit = circuit_handle.lock().unwrap();
            let prior = circuit.state();
            circuit.reset();
            prior
        };
        self.maybe_emit_transition(service, &circuit_handle, prior);
        self.persist(service, &circuit_handle);
    }

    /// Lock-free read of the current state discriminant, suitable for a
    /// readiness/health endpoint.
    pub fn state_sync(&self, service: &str) -> CircuitState {
        self.circuit_for(service).lock().unwrap().state()
    }

    fn maybe_emit_transition(&self, service: &str, circuit_handle: &Arc<Mutex<Circuit>>, prior: CircuitState) {
        let current = circuit_handle.lock().unwrap().state();
        if std::mem::discriminant(&prior) != std::mem::discriminant(&current) {
            #[cfg(feature = "tracing")]
            tracing::info!(breaker = %self.config.name, service, "circuit state transition");
            #[cfg(feature = "metrics")]
            metrics::counter!("circuit_breaker_transitions_total", "breaker" => self.config.name.clone(), "service" => service.to_string())
                .increment(1);
            self.config
                .event_listeners
                .emit(&CircuitBreakerEvent::transition(service, prior, current));
        }
    }

    fn maybe_emit_pattern(&self, service: &str, circuit_handle: &Arc<Mutex<Circuit>>) {
        let pattern = circuit_handle.lock().unwrap().failure_pattern(&self.config);
        let label = match pattern {
            FailurePattern::Burst => "burst",
            FailurePattern::Sustained => "sustained",
            FailurePattern::Periodic => "periodic",
            FailurePattern::Sporadic => "sporadic",
        };
        self.store.append_pattern(
            service,
            BreakerPatternRecord {
                pattern: label,
                at: Instant::now(),
            },
        );
        self.config.event_listeners.emit(&CircuitBreakerEvent::PatternDetected {
            service: service.to_string(),
            pattern: label,
            timestamp: Instant::now(),
        });
    }

    fn persist(&self, service: &str, circuit_handle: &Arc<Mutex<Circuit>>) {
        let circuit = circuit_handle.lock().unwrap();
        let (opened_at, break_duration) = match circuit.state() {
            CircuitState::Open { opened_at, break_duration } => (Some(opened_at), Some(break_duration)),
            _ => (None, None),
        };
        self.store.save_state(
            service,
            BreakerStateRecord {
                state_tag: circuit.state_tag(),
                opened_at,
                break_duration,
                window_started_at: Instant::now(),
                success_count: 0,
                failure_count: 0,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            CircuitBreakerConfig::builder()
                .min_throughput(5)
                .failure_threshold(0.5)
                .break_duration(Duration::from_millis(50))
                .max_probes(1)
                .build(),
        )
    }

    #[tokio::test]
    async fn admits_calls_while_closed() {
        let breaker = breaker();
        let result = breaker.call("svc", || async { Ok::<_, String>(1) }).await;
        assert_eq!(result, Ok(1));
    }

    #[tokio::test]
    async fn opens_after_failure_threshold_and_fails_fast() {
        let breaker = breaker();
        for _ in 0..5 {
            let _ = breaker
                .call("svc", || async { Err::<i32, _>("boom".to_string()) })
                .await;
        }
        let result = breaker.call("svc", || async { Ok::<_, String>(1) }).await;
        assert!(matches!(result, Err(CircuitBreakerError::Open { .. })));
    }

    #[tokio::test]
    async fn half_open_probe_success_closes_circuit() {
        let breaker = breaker();
        for _ in 0..5 {
            let _ = breaker
                .call("svc", || async { Err::<i32, _>("boom".to_string()) })
                .await;
        }
        tokio::time::sleep(Duration::from_millis(60)).await;

        let result = breaker.call("svc", || async { Ok::<_, String>(7) }).await;
        assert_eq!(result, Ok(7));
        assert_eq!(breaker.state_sync("svc"), CircuitState::Closed);
    }

    #[tokio::test]
    async fn isolate_rejects_until_reset() {
        let breaker = breaker();
        breaker.isolate("svc", "maintenance");
        let result = breaker.call("svc", || async { Ok::<_, String>(1) }).await;
        assert!(matches!(result, Err(CircuitBreakerError::Open { .. })));

        breaker.reset("svc");
        let result = breaker.call("svc", || async { Ok::<_, String>(1) }).await;
        assert_eq!(result, Ok(1));
    }

    #[tokio::test]
    async fn half_open_admits_only_max_probes_concurrently() {
        let breaker = breaker();
        for _ in 0..5 {
            let _ = breaker
                .call("svc", || async { Err::<i32, _>("boom".to_string()) })
                .await;
        }
        tokio::time::sleep(Duration::from_millis(60)).await;

        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let in_flight_c = Arc::clone(&in_flight);
        let max_seen_c = Arc::clone(&max_seen);

        let _ = breaker
            .call("svc", move || async move {
                let n = in_flight_c.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen_c.fetch_max(n, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                in_flight_c.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, String>(())
            })
            .await;

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }
}
