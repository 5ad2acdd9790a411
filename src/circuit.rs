use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::BreakerConfig;
use crate::events::BreakerEvent;
#[cfg(feature = "metrics")]
use metrics::{counter, gauge, histogram};

/// Represents the state of a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    /// The circuit is closed and calls are allowed.
    Closed = 0,
    /// The circuit is open and calls are rejected.
    Open = 1,
    /// The circuit is half-open and a limited number of calls are allowed.
    HalfOpen = 2,
}

impl CircuitState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

/// Point-in-time snapshot of a breaker's internal counters.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitMetrics {
    /// Current state of the circuit.
    pub state: CircuitState,
    /// Total number of recorded calls in the current window.
    pub total_calls: usize,
    /// Number of failed calls in the current window.
    pub failure_count: usize,
    /// Number of successful calls in the current window.
    pub success_count: usize,
    /// Current failure rate (0.0 to 1.0).
    pub failure_rate: f64,
    /// Time since the last state transition.
    pub time_since_state_change: Duration,
}

pub(crate) struct Circuit {
    state: CircuitState,
    state_atomic: Arc<AtomicU8>,
    last_state_change: Instant,
    failure_count: usize,
    success_count: usize,
    total_count: usize,
}

impl Circuit {
    pub(crate) fn new_with_atomic(state_atomic: Arc<AtomicU8>) -> Self {
        Self {
            state: CircuitState::Closed,
            state_atomic,
            last_state_change: Instant::now(),
            failure_count: 0,
            success_count: 0,
            total_count: 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn new() -> Self {
        Self::new_with_atomic(Arc::new(AtomicU8::new(CircuitState::Closed as u8)))
    }

    pub(crate) fn state(&self) -> CircuitState {
        self.state
    }

    pub(crate) fn metrics(&self) -> CircuitMetrics {
        let failure_rate = if self.total_count > 0 {
            self.failure_count as f64 / self.total_count as f64
        } else {
            0.0
        };

        CircuitMetrics {
            state: self.state,
            total_calls: self.total_count,
            failure_count: self.failure_count,
            success_count: self.success_count,
            failure_rate,
            time_since_state_change: self.last_state_change.elapsed(),
        }
    }

    pub(crate) fn record_success(&mut self, config: &BreakerConfig, duration: Duration) {
        self.success_count += 1;
        self.total_count += 1;

        config.event_listeners.emit(&BreakerEvent::SuccessRecorded {
            breaker: config.name.clone(),
            timestamp: Instant::now(),
            state: self.state,
        });

        #[cfg(feature = "metrics")]
        {
            counter!("client_breaker_calls_total", "breaker" => config.name.clone(), "outcome" => "success").increment(1);
            histogram!("client_breaker_call_duration_seconds", "breaker" => config.name.clone())
                .record(duration.as_secs_f64());
        }
        #[cfg(not(feature = "metrics"))]
        let _ = duration;

        match self.state {
            CircuitState::HalfOpen => {
                if self.success_count >= config.permitted_calls_in_half_open {
                    self.transition_to(CircuitState::Closed, config);
                }
            }
            _ => self.evaluate_window(config),
        }
    }

    pub(crate) fn record_failure(&mut self, config: &BreakerConfig, duration: Duration) {
        self.failure_count += 1;
        self.total_count += 1;

        config.event_listeners.emit(&BreakerEvent::FailureRecorded {
            breaker: config.name.clone(),
            timestamp: Instant::now(),
            state: self.state,
        });

        #[cfg(feature = "metrics")]
        {
            counter!("client_breaker_calls_total", "breaker" => config.name.clone(), "outcome" => "failure").increment(1);
            histogram!("client_breaker_call_duration_seconds", "breaker" => config.name.clone())
                .record(duration.as_secs_f64());
        }
        #[cfg(not(feature = "metrics"))]
        let _ = duration;

        match self.state {
            // Any half-open failure reopens the circuit.
            CircuitState::HalfOpen => self.transition_to(CircuitState::Open, config),
            _ => self.evaluate_window(config),
        }
    }

    pub(crate) fn try_acquire(&mut self, config: &BreakerConfig) -> bool {
        match self.state {
            CircuitState::Closed => {
                config.event_listeners.emit(&BreakerEvent::CallPermitted {
                    breaker: config.name.clone(),
                    timestamp: Instant::now(),
                    state: self.state,
                });
                true
            }
            CircuitState::Open => {
                if self.last_state_change.elapsed() >= config.wait_duration_in_open {
                    self.transition_to(CircuitState::HalfOpen, config);
                    config.event_listeners.emit(&BreakerEvent::CallPermitted {
                        breaker: config.name.clone(),
                        timestamp: Instant::now(),
                        state: self.state,
                    });
                    true
                } else {
                    self.reject(config);
                    false
                }
            }
            CircuitState::HalfOpen => {
                let permitted =
                    self.success_count + self.failure_count < config.permitted_calls_in_half_open;
                if permitted {
                    config.event_listeners.emit(&BreakerEvent::CallPermitted {
                        breaker: config.name.clone(),
                        timestamp: Instant::now(),
                        state: self.state,
                    });
                } else {
                    self.reject(config);
                }
                permitted
            }
        }
    }

    fn reject(&self, config: &BreakerConfig) {
        config.event_listeners.emit(&BreakerEvent::CallRejected {
            breaker: config.name.clone(),
            timestamp: Instant::now(),
        });

        #[cfg(feature = "metrics")]
        counter!("client_breaker_calls_total", "breaker" => config.name.clone(), "outcome" => "rejected")
            .increment(1);
    }

    pub(crate) fn force_open(&mut self, config: &BreakerConfig) {
        self.transition_to(CircuitState::Open, config);
    }

    pub(crate) fn force_closed(&mut self, config: &BreakerConfig) {
        self.transition_to(CircuitState::Closed, config);
    }

    pub(crate) fn reset(&mut self, config: &BreakerConfig) {
        self.transition_to(CircuitState::Closed, config);
    }

    fn transition_to(&mut self, state: CircuitState, config: &BreakerConfig) {
        if self.state == state {
            return;
        }

        let from = self.state;

        config.event_listeners.emit(&BreakerEvent::StateTransition {
            breaker: config.name.clone(),
            timestamp: Instant::now(),
            from,
            to: state,
        });

        #[cfg(feature = "tracing")]
        tracing::info!(breaker = %config.name, from = ?from, to = ?state, "circuit state transition");

        #[cfg(feature = "metrics")]
        {
            counter!(
                "client_breaker_transitions_total",
                "breaker" => config.name.clone(),
                "from" => state_label(from),
                "to" => state_label(state)
            )
            .increment(1);

            gauge!("client_breaker_state", "breaker" => config.name.clone(), "state" => state_label(state))
                .set(1.0);
        }

        self.state = state;
        self.state_atomic.store(state as u8, Ordering::Release);
        self.last_state_change = Instant::now();
        self.success_count = 0;
        self.failure_count = 0;
        self.total_count = 0;
    }

    fn evaluate_window(&mut self, config: &BreakerConfig) {
        if self.total_count < config.minimum_number_of_calls {
            return;
        }
        if self.total_count < config.sliding_window_size {
            return;
        }

        let failure_rate = self.failure_count as f64 / self.total_count as f64;
        if failure_rate >= config.failure_rate_threshold {
            self.transition_to(CircuitState::Open, config);
        }
    }
}

#[cfg(feature = "metrics")]
fn state_label(state: CircuitState) -> &'static str {
    match state {
        CircuitState::Closed => "Closed",
        CircuitState::Open => "Open",
        CircuitState::HalfOpen => "HalfOpen",
    }
}
