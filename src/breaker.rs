//! Named circuit breakers shared across dispatch targets.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::AtomicU8;
use std::sync::{Arc, Mutex as SyncMutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::sync::Mutex;

use crate::circuit::{Circuit, CircuitMetrics, CircuitState};
use crate::config::BreakerConfig;
use crate::error::FailureCause;

#[cfg(feature = "metrics")]
use metrics::{describe_counter, describe_gauge, describe_histogram};
#[cfg(feature = "metrics")]
use std::sync::Once;

#[cfg(feature = "metrics")]
static METRICS_INIT: Once = Once::new();

/// A shared handle to one named circuit.
///
/// Clones observe the same circuit state, so every dispatcher built for one
/// context id sees the open/closed/half-open state every other one drives.
#[derive(Clone)]
pub struct Breaker {
    circuit: Arc<Mutex<Circuit>>,
    state_atomic: Arc<AtomicU8>,
    config: Arc<BreakerConfig>,
}

impl Breaker {
    pub(crate) fn new(config: Arc<BreakerConfig>) -> Self {
        #[cfg(feature = "metrics")]
        METRICS_INIT.call_once(|| {
            describe_counter!(
                "client_breaker_calls_total",
                "Total number of calls through a client breaker"
            );
            describe_counter!(
                "client_breaker_transitions_total",
                "Total number of breaker state transitions"
            );
            describe_gauge!("client_breaker_state", "Current state of a client breaker");
            describe_histogram!(
                "client_breaker_call_duration_seconds",
                "Duration of calls through a client breaker"
            );
        });

        let state_atomic = Arc::new(AtomicU8::new(CircuitState::Closed as u8));
        Self {
            circuit: Arc::new(Mutex::new(Circuit::new_with_atomic(Arc::clone(
                &state_atomic,
            )))),
            state_atomic,
            config,
        }
    }

    /// The breaker's name (the context id it was created for).
    pub fn name(&self) -> &str {
        self.config.name()
    }

    /// Runs the primary call under breaker supervision.
    ///
    /// Acquires a permit, executes the call, and records its outcome against
    /// the circuit. Returns the call's value, or the [`FailureCause`] the
    /// caller selects a fallback for: `CircuitOpen` when the permit was
    /// rejected, `Failure` when the primary call ran and failed.
    pub async fn run<F, T, E>(&self, primary: F) -> Result<T, FailureCause<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        let permitted = {
            let mut circuit = self.circuit.lock().await;
            circuit.try_acquire(&self.config)
        };

        if !permitted {
            return Err(FailureCause::CircuitOpen);
        }

        let start = Instant::now();
        let result = primary.await;
        let duration = start.elapsed();

        let mut circuit = self.circuit.lock().await;
        match result {
            Ok(value) => {
                circuit.record_success(&self.config, duration);
                Ok(value)
            }
            Err(error) => {
                circuit.record_failure(&self.config, duration);
                Err(FailureCause::Failure(error))
            }
        }
    }

    /// Forces the circuit into the open state.
    pub async fn force_open(&self) {
        let mut circuit = self.circuit.lock().await;
        circuit.force_open(&self.config);
    }

    /// Forces the circuit into the closed state.
    pub async fn force_closed(&self) {
        let mut circuit = self.circuit.lock().await;
        circuit.force_closed(&self.config);
    }

    /// Resets the circuit to the closed state and clears counts.
    pub async fn reset(&self) {
        let mut circuit = self.circuit.lock().await;
        circuit.reset(&self.config);
    }

    /// Returns a snapshot of the current circuit metrics.
    pub async fn metrics(&self) -> CircuitMetrics {
        let circuit = self.circuit.lock().await;
        circuit.metrics()
    }

    /// Returns the current state of the circuit.
    pub async fn state(&self) -> CircuitState {
        let circuit = self.circuit.lock().await;
        circuit.state()
    }

    /// Returns the current state without requiring async context.
    ///
    /// Safe to call from sync code (metrics collection, health checks).
    pub fn state_sync(&self) -> CircuitState {
        CircuitState::from_u8(self.state_atomic.load(std::sync::atomic::Ordering::Acquire))
    }

    /// Returns whether the circuit is currently open.
    pub fn is_open(&self) -> bool {
        self.state_sync() == CircuitState::Open
    }
}

/// Creates and caches [`Breaker`]s keyed by configuration-scope id.
///
/// Repeated `create` calls for one context id hand back handles over the
/// same circuit, so breaker state is shared across every dispatch target of
/// one client.
pub struct BreakerFactory {
    template: BreakerConfig,
    overrides: SyncMutex<HashMap<String, BreakerConfig>>,
    instances: SyncMutex<HashMap<String, Breaker>>,
}

impl BreakerFactory {
    /// Creates a factory whose breakers use `template`, renamed per context.
    pub fn new(template: BreakerConfig) -> Self {
        Self {
            template,
            overrides: SyncMutex::new(HashMap::new()),
            instances: SyncMutex::new(HashMap::new()),
        }
    }

    /// Creates a factory with the default breaker configuration.
    pub fn with_defaults() -> Self {
        Self::new(BreakerConfig::builder().build())
    }

    /// Registers a configuration override for one context id.
    ///
    /// Has no effect on a breaker already created for that context: the
    /// first-created instance stays authoritative so circuit state remains
    /// shared.
    pub fn configure(&self, context_id: impl Into<String>, config: BreakerConfig) {
        let mut overrides = lock(&self.overrides);
        overrides.insert(context_id.into(), config);
    }

    /// Returns the breaker for `context_id`, creating it on first use.
    pub fn create(&self, context_id: &str) -> Breaker {
        let mut instances = lock(&self.instances);
        if let Some(breaker) = instances.get(context_id) {
            return breaker.clone();
        }

        let config = {
            let overrides = lock(&self.overrides);
            overrides
                .get(context_id)
                .cloned()
                .unwrap_or_else(|| self.template.clone())
        };
        let breaker = Breaker::new(Arc::new(config.named(context_id)));
        instances.insert(context_id.to_string(), breaker.clone());
        breaker
    }
}

fn lock<T>(mutex: &SyncMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
