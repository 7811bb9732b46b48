//! Read-only observability surface (§4.H).
//!
//! Each component crate keeps its own internal state private; what it
//! exposes for introspection today is narrow (`CircuitBreaker::state_sync`),
//! so this snapshot is built from that plus the orchestrator's own
//! [`BatchProgress`] counters rather than a uniform stats API the component
//! crates don't have. Widening this means adding snapshot methods to the
//! component crates themselves, not working around their encapsulation here.

use crate::data::BatchProgress;
use flashcard_circuitbreaker::{CircuitBreaker, CircuitState};

/// A point-in-time read of one service's circuit breaker plus the owning
/// batch's progress counters. Not atomic across the two — each is read
/// independently, consistent with §4.H's "per component, not globally".
#[derive(Debug, Clone)]
pub struct ObservabilitySnapshot {
    pub service_name: String,
    pub breaker_state: BreakerStateSummary,
    pub batch_progress: Option<BatchProgress>,
}

/// A [`CircuitState`] flattened into a form that doesn't borrow from the
/// breaker and is cheap to log or serialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerStateSummary {
    Closed,
    Open,
    HalfOpen,
}

impl From<CircuitState> for BreakerStateSummary {
    fn from(state: CircuitState) -> Self {
        match state {
            CircuitState::Closed => BreakerStateSummary::Closed,
            CircuitState::Open { .. } => BreakerStateSummary::Open,
            CircuitState::HalfOpen { .. } => BreakerStateSummary::HalfOpen,
        }
    }
}

/// Reads the current breaker state for `service_name` and pairs it with
/// `progress`, if the caller has a running batch to report on.
pub fn snapshot(breaker: &CircuitBreaker, service_name: &str, progress: Option<BatchProgress>) -> ObservabilitySnapshot {
    ObservabilitySnapshot {
        service_name: service_name.to_string(),
        breaker_state: breaker.state_sync(service_name).into(),
        batch_progress: progress,
    }
}
