//! Per-service circuit state machine.

use crate::classifier::{self, FailurePattern};
use crate::config::CircuitBreakerConfig;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

/// Public snapshot of a circuit's state, matching the pipeline's data model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CircuitState {
    Closed,
    Open {
        opened_at: Instant,
        break_duration: Duration,
    },
    HalfOpen {
        probes_in_flight: u32,
    },
}

/// Compact discriminant for lock-free reads via [`Circuit::state_sync`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StateTag {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl StateTag {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => StateTag::Closed,
            1 => StateTag::Open,
            _ => StateTag::HalfOpen,
        }
    }
}

struct CallRecord {
    timestamp: Instant,
    success: bool,
}

/// Per-service circuit. All mutation goes through a single service-scoped
/// mutex (see [`crate::CircuitBreaker`]); this type itself does no locking.
pub struct Circuit {
    state: CircuitState,
    tag: AtomicU8,
    window: VecDeque<CallRecord>,
    probes_in_flight: u32,
    probe_succeeded: bool,
    isolated: bool,
}

/// Disposition returned by [`Circuit::try_admit`].
pub enum Admission {
    Admit,
    Reject { retry_after: Duration },
}

impl Circuit {
    pub fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            tag: AtomicU8::new(StateTag::Closed as u8),
            window: VecDeque::new(),
            probes_in_flight: 0,
            probe_succeeded: false,
            isolated: false,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn state_tag(&self) -> StateTag {
        StateTag::from_u8(self.tag.load(Ordering::Relaxed))
    }

    fn set_state(&mut self, state: CircuitState) {
        let tag = match state {
            CircuitState::Closed => StateTag::Closed,
            CircuitState::Open { .. } => StateTag::Open,
            CircuitState::HalfOpen { .. } => StateTag::HalfOpen,
        };
        self.state = state;
        self.tag.store(tag as u8, Ordering::Relaxed);
    }

    /// Discards window samples older than `config.window`.
    fn evict_stale(&mut self, now: Instant, config: &CircuitBreakerConfig) {
        while let Some(front) = self.window.front() {
            if now.saturating_duration_since(front.timestamp) > config.window {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }

    /// Decides whether a call may proceed, transitioning `Open -> HalfOpen`
    /// if `break_duration` has elapsed.
    pub fn try_admit(&mut self, now: Instant, config: &CircuitBreakerConfig) -> Admission {
        if self.isolated {
            return Admission::Reject {
                retry_after: config.break_duration,
            };
        }

        match self.state {
            CircuitState::Closed => Admission::Admit,
            CircuitState::Open {
                opened_at,
                break_duration,
            } => {
                let elapsed = now.saturating_duration_since(opened_at);
                if elapsed >= break_duration {
                    self.set_state(CircuitState::HalfOpen { probes_in_flight: 1 });
                    self.probes_in_flight = 1;
                    self.probe_succeeded = false;
                    Admission::Admit
                } else {
                    Admission::Reject {
                        retry_after: break_duration - elapsed,
                    }
                }
            }
            CircuitState::HalfOpen { .. } => {
                if self.probes_in_flight < config.max_probes {
                    self.probes_in_flight += 1;
                    self.set_state(CircuitState::HalfOpen {
                        probes_in_flight: self.probes_in_flight,
                    });
                    Admission::Admit
                } else {
                    Admission::Reject {
                        retry_after: Duration::from_millis(50),
                    }
                }
            }
        }
    }

    pub fn record_success(&mut self, now: Instant, config: &CircuitBreakerConfig) {
        self.window.push_back(CallRecord {
            timestamp: now,
            success: true,
        });
        self.evict_stale(now, config);

        if let CircuitState::HalfOpen { .. } = self.state {
            if !self.probe_succeeded {
                self.probe_succeeded = true;
                self.close();
            } else {
                self.probes_in_flight = self.probes_in_flight.saturating_sub(1);
            }
            return;
        }

        self.evaluate_window(now, config);
    }

    pub fn record_failure(&mut self, now: Instant, config: &CircuitBreakerConfig) {
        self.window.push_back(CallRecord {
            timestamp: now,
            success: false,
        });
        self.evict_stale(now, config);

        if let CircuitState::HalfOpen { .. } = self.state {
            let next_break = (config.break_duration_multiplier * current_break(&self.state, config))
                .min(config.max_break_duration.as_secs_f64());
            self.set_state(CircuitState::Open {
                opened_at: now,
                break_duration: Duration::from_secs_f64(next_break.max(0.001)),
            });
            self.probes_in_flight = 0;
            return;
        }

        self.evaluate_window(now, config);
    }

    fn evaluate_window(&mut self, now: Instant, config: &CircuitBreakerConfig) {
        if matches!(self.state, CircuitState::Open { .. }) {
            return;
        }
        let total = self.window.len();
        if total < config.min_throughput {
            return;
        }
        let failures = self.window.iter().filter(|r| !r.success).count();
        let failure_rate = failures as f64 / total as f64;
        if failure_rate >= config.failure_threshold {
            self.set_state(CircuitState::Open {
                opened_at: now,
                break_duration: config.break_duration,
            });
        }
    }

    fn close(&mut self) {
        self.set_state(CircuitState::Closed);
        self.window.clear();
        self.probes_in_flight = 0;
        self.probe_succeeded = false;
    }

    pub fn isolate(&mut self) {
        self.isolated = true;
        self.set_state(CircuitState::Open {
            opened_at: Instant::now(),
            break_duration: Duration::MAX,
        });
    }

    pub fn reset(&mut self) {
        self.isolated = false;
        self.close();
    }

    /// Labels the failure pattern of the current window. Informative only.
    pub fn failure_pattern(&self, config: &CircuitBreakerConfig) -> FailurePattern {
        let timestamps: Vec<Instant> = self
            .window
            .iter()
            .filter(|r| !r.success)
            .map(|r| r.timestamp)
            .collect();
        classifier::classify(&timestamps, config.window)
    }
}

impl Default for Circuit {
    fn default() -> Self {
        Self::new()
    }
}

fn current_break(state: &CircuitState, config: &CircuitBreakerConfig) -> f64 {
    match state {
        CircuitState::Open { break_duration, .. } => break_duration.as_secs_f64(),
        _ => config.break_duration.as_secs_f64(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CircuitBreakerConfig {
        CircuitBreakerConfig::builder()
            .window(Duration::from_secs(30))
            .min_throughput(5)
            .failure_threshold(0.5)
            .break_duration(Duration::from_millis(100))
            .max_probes(1)
            .build()
    }

    #[test]
    fn opens_after_threshold_breached() {
        let config = config();
        let mut circuit = Circuit::new();
        let now = Instant::now();
        for _ in 0..3 {
            circuit.record_success(now, &config);
        }
        for _ in 0..3 {
            circuit.record_failure(now, &config);
        }
        assert!(matches!(circuit.state(), CircuitState::Open { .. }));
    }

    #[test]
    fn stays_closed_below_min_throughput() {
        let config = config();
        let mut circuit = Circuit::new();
        let now = Instant::now();
        circuit.record_failure(now, &config);
        circuit.record_failure(now, &config);
        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[test]
    fn transitions_through_half_open_on_success() {
        let config = config();
        let mut circuit = Circuit::new();
        let now = Instant::now();
        for _ in 0..5 {
            circuit.record_failure(now, &config);
        }
        assert!(matches!(circuit.state(), CircuitState::Open { .. }));

        let later = now + Duration::from_millis(150);
        assert!(matches!(circuit.try_admit(later, &config), Admission::Admit));
        assert!(matches!(circuit.state(), CircuitState::HalfOpen { .. }));

        circuit.record_success(later, &config);
        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_escalates_break_duration() {
        let config = config();
        let mut circuit = Circuit::new();
        let now = Instant::now();
        for _ in 0..5 {
            circuit.record_failure(now, &config);
        }
        let later = now + Duration::from_millis(150);
        circuit.try_admit(later, &config);
        circuit.record_failure(later, &config);

        match circuit.state() {
            CircuitState::Open { break_duration, .. } => {
                assert!(break_duration > config.break_duration);
            }
            other => panic!("expected Open, got {other:?}"),
        }
    }

    #[test]
    fn isolate_forces_open_and_ignores_resets_until_reset() {
        let config = config();
        let mut circuit = Circuit::new();
        circuit.isolate();
        assert!(matches!(
            circuit.try_admit(Instant::now(), &config),
            Admission::Reject { .. }
        ));
        circuit.reset();
        assert!(matches!(
            circuit.try_admit(Instant::now(), &config),
            Admission::Admit
        ));
    }
}
