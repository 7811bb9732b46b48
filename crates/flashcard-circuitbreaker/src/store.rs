//! The breaker's persistence boundary.
//!
//! `BreakerStore` is deliberately opaque: the circuit breaker writes through
//! it after every state transition and reads from it on startup, but never
//! assumes anything about where the bytes live. A failure to load or save is
//! logged and the breaker falls back to in-memory semantics — persistence
//! is an optimization, never a safety requirement.

use crate::circuit::StateTag;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Durable snapshot of one service's circuit state, matching the persistent
/// format `{service, state_tag, opened_at?, break_duration_ms?,
/// window_started_at, success_count, failure_count}`.
#[derive(Debug, Clone)]
pub struct BreakerStateRecord {
    pub state_tag: StateTag,
    pub opened_at: Option<Instant>,
    pub break_duration: Option<Duration>,
    pub window_started_at: Instant,
    pub success_count: u64,
    pub failure_count: u64,
}

/// A human-readable note about a notable breaker event (e.g. an operator
/// isolate/reset, or a sustained-open alert).
#[derive(Debug, Clone)]
pub struct BreakerAlert {
    pub message: String,
    pub at: Instant,
}

/// A recorded [`crate::classifier::FailurePattern`] observation.
#[derive(Debug, Clone)]
pub struct BreakerPatternRecord {
    pub pattern: &'static str,
    pub at: Instant,
}

/// Opaque persistence boundary for circuit breaker state.
pub trait BreakerStore: Send + Sync {
    fn save_state(&self, service: &str, record: BreakerStateRecord);
    fn load_state(&self, service: &str) -> Option<BreakerStateRecord>;
    fn append_alert(&self, service: &str, alert: BreakerAlert);
    fn append_pattern(&self, service: &str, pattern: BreakerPatternRecord);
}

const MAX_RECENT: usize = 16;

/// An in-process `BreakerStore` used when no external store is configured.
/// State does not survive a process restart.
#[derive(Default)]
pub struct InMemoryBreakerStore {
    states: Mutex<HashMap<String, BreakerStateRecord>>,
    alerts: Mutex<HashMap<String, Vec<BreakerAlert>>>,
    patterns: Mutex<HashMap<String, Vec<BreakerPatternRecord>>>,
}

impl InMemoryBreakerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recent_alerts(&self, service: &str) -> Vec<BreakerAlert> {
        self.alerts
            .lock()
            .unwrap()
            .get(service)
            .cloned()
            .unwrap_or_default()
    }

    pub fn recent_patterns(&self, service: &str) -> Vec<BreakerPatternRecord> {
        self.patterns
            .lock()
            .unwrap()
            .get(service)
            .cloned()
            .unwrap_or_default()
    }
}

impl BreakerStore for InMemoryBreakerStore {
    fn save_state(&self, service: &str, record: BreakerStateRecord) {
        self.states
            .lock()
            .unwrap()
            .insert(service.to_string(), record);
    }

    fn load_state(&self, service: &str) -> Option<BreakerStateRecord> {
        self.states.lock().unwrap().get(service).cloned()
    }

    fn append_alert(&self, service: &str, alert: BreakerAlert) {
        let mut alerts = self.alerts.lock().unwrap();
        let entry = alerts.entry(service.to_string()).or_default();
        entry.push(alert);
        if entry.len() > MAX_RECENT {
            entry.remove(0);
        }
    }

    fn append_pattern(&self, service: &str, pattern: BreakerPatternRecord) {
        let mut patterns = self.patterns.lock().unwrap();
        let entry = patterns.entry(service.to_string()).or_default();
        entry.push(pattern);
        if entry.len() > MAX_RECENT {
            entry.remove(0);
        }
    }
}
