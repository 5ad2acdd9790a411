use std::time::Duration;

use crate::circuit::CircuitState;
use crate::events::{BreakerEvent, EventListeners, FnListener};

/// Configuration for one breaker instance.
#[derive(Clone)]
pub struct BreakerConfig {
    pub(crate) failure_rate_threshold: f64,
    pub(crate) sliding_window_size: usize,
    pub(crate) minimum_number_of_calls: usize,
    pub(crate) wait_duration_in_open: Duration,
    pub(crate) permitted_calls_in_half_open: usize,
    pub(crate) event_listeners: EventListeners<BreakerEvent>,
    pub(crate) name: String,
}

impl BreakerConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> BreakerConfigBuilder {
        BreakerConfigBuilder::new()
    }

    /// The breaker's name. A factory-created breaker is named after its
    /// context id.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }
}

/// Builder for configuring a breaker.
pub struct BreakerConfigBuilder {
    failure_rate_threshold: f64,
    sliding_window_size: usize,
    minimum_number_of_calls: Option<usize>,
    wait_duration_in_open: Duration,
    permitted_calls_in_half_open: usize,
    event_listeners: EventListeners<BreakerEvent>,
    name: String,
}

impl BreakerConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            failure_rate_threshold: 0.5,
            sliding_window_size: 100,
            minimum_number_of_calls: None,
            wait_duration_in_open: Duration::from_secs(30),
            permitted_calls_in_half_open: 1,
            event_listeners: EventListeners::new(),
            name: String::from("<unnamed>"),
        }
    }

    /// Sets the failure rate threshold at which the circuit will open.
    ///
    /// Default: 0.5 (50%)
    pub fn failure_rate_threshold(mut self, rate: f64) -> Self {
        self.failure_rate_threshold = rate;
        self
    }

    /// Sets the number of calls tracked for failure rate calculation.
    ///
    /// Default: 100
    pub fn sliding_window_size(mut self, size: usize) -> Self {
        self.sliding_window_size = size;
        self
    }

    /// Sets the minimum number of calls before the failure rate is evaluated.
    ///
    /// Default: same as `sliding_window_size`
    pub fn minimum_number_of_calls(mut self, n: usize) -> Self {
        self.minimum_number_of_calls = Some(n);
        self
    }

    /// Sets the duration the circuit remains open before transitioning to
    /// half-open.
    ///
    /// Default: 30 seconds
    pub fn wait_duration_in_open(mut self, duration: Duration) -> Self {
        self.wait_duration_in_open = duration;
        self
    }

    /// Sets the number of permitted calls in the half-open state.
    ///
    /// Default: 1
    pub fn permitted_calls_in_half_open(mut self, n: usize) -> Self {
        self.permitted_calls_in_half_open = n;
        self
    }

    /// Gives this breaker a human-readable name for observability.
    ///
    /// A [`BreakerFactory`](crate::BreakerFactory) overrides the name with
    /// the context id it creates a breaker for.
    pub fn name<N: Into<String>>(mut self, n: N) -> Self {
        self.name = n.into();
        self
    }

    /// Registers a callback invoked whenever the circuit transitions between
    /// states, with the state left and the state entered.
    pub fn on_state_transition<F>(mut self, f: F) -> Self
    where
        F: Fn(CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &BreakerEvent| {
                if let BreakerEvent::StateTransition { from, to, .. } = event {
                    f(*from, *to);
                }
            }));
        self
    }

    /// Registers a callback invoked when a call is rejected because the
    /// circuit is open.
    pub fn on_call_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &BreakerEvent| {
                if matches!(event, BreakerEvent::CallRejected { .. }) {
                    f();
                }
            }));
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> BreakerConfig {
        BreakerConfig {
            failure_rate_threshold: self.failure_rate_threshold,
            sliding_window_size: self.sliding_window_size,
            minimum_number_of_calls: self
                .minimum_number_of_calls
                .unwrap_or(self.sliding_window_size),
            wait_duration_in_open: self.wait_duration_in_open,
            permitted_calls_in_half_open: self.permitted_calls_in_half_open,
            event_listeners: self.event_listeners,
            name: self.name,
        }
    }
}

impl Default for BreakerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
