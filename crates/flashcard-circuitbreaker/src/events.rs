//! Observability events for the circuit breaker.

use crate::circuit::CircuitState;
use flashcard_core::ResilienceEvent;
use std::time::Instant;

fn state_label(state: &CircuitState) -> &'static str {
    match state {
        CircuitState::Closed => "closed",
        CircuitState::Open { .. } => "open",
        CircuitState::HalfOpen { .. } => "half_open",
    }
}

/// Events emitted by [`crate::CircuitBreaker`].
#[derive(Debug, Clone)]
pub enum CircuitBreakerEvent {
    /// A call was rejected because the circuit was open.
    CallRejected { service: String, timestamp: Instant },
    /// The circuit transitioned between states for a service.
    StateTransition {
        service: String,
        from: &'static str,
        to: &'static str,
        timestamp: Instant,
    },
    /// A failure pattern was classified for a service's current window.
    PatternDetected {
        service: String,
        pattern: &'static str,
        timestamp: Instant,
    },
}

impl CircuitBreakerEvent {
    pub(crate) fn transition(service: &str, from: CircuitState, to: CircuitState) -> Self {
        CircuitBreakerEvent::StateTransition {
            service: service.to_string(),
            from: state_label(&from),
            to: state_label(&to),
            timestamp: Instant::now(),
        }
    }
}

impl ResilienceEvent for CircuitBreakerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CircuitBreakerEvent::CallRejected { .. } => "call_rejected",
            CircuitBreakerEvent::StateTransition { .. } => "state_transition",
            CircuitBreakerEvent::PatternDetected { .. } => "pattern_detected",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            CircuitBreakerEvent::CallRejected { timestamp, .. }
            | CircuitBreakerEvent::StateTransition { timestamp, .. }
            | CircuitBreakerEvent::PatternDetected { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            CircuitBreakerEvent::CallRejected { service, .. }
            | CircuitBreakerEvent::StateTransition { service, .. }
            | CircuitBreakerEvent::PatternDetected { service, .. } => service,
        }
    }
}
