use thiserror::Error;

/// Errors raised while resolving a client definition's identity.
///
/// Fatal at registration time; registration aborts for that client only.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// No identity candidate carried any text.
    #[error("either `name` or `value` must be provided in the client definition")]
    MissingClientName,

    /// The identity string does not parse to a host-bearing value.
    #[error("client identity is not a legal hostname ({0})")]
    IllegalHostname(String),

    /// The configured base address is not a well-formed URL.
    #[error("{0} is malformed")]
    MalformedUrl(String),
}

/// Errors raised while resolving a fallback binding from a configuration
/// scope. Fatal at target-build time, never deferred to the first call.
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// Nothing is bound under the declared type in the client's scope.
    #[error("no {mechanism} instance of type {declared} found for client {client}")]
    FallbackNotFound {
        /// Which mechanism was being resolved ("fallback" or "fallback factory").
        mechanism: &'static str,
        /// The type the definition declared.
        declared: &'static str,
        /// The client the resolution ran for.
        client: String,
    },

    /// A binding exists under the declared type but is not usable as the
    /// capability this client requires.
    #[error(
        "incompatible {mechanism} instance: {declared} is not usable as {required} for client {client}"
    )]
    IncompatibleFallback {
        /// Which mechanism was being resolved.
        mechanism: &'static str,
        /// The type the definition declared.
        declared: &'static str,
        /// The capability the client interface requires.
        required: &'static str,
        /// The client the resolution ran for.
        client: String,
    },
}

/// Umbrella error for [`TargetBuilder::register`](crate::TargetBuilder::register).
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// Identity resolution rejected the definition.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Fallback resolution rejected the definition.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
}

/// What tripped the fallback path for a single call.
///
/// Passed to a [`FallbackFactory`](crate::FallbackFactory) so the produced
/// fallback can depend on the triggering cause.
#[derive(Debug)]
pub enum FailureCause<E> {
    /// The breaker rejected the call without running it.
    CircuitOpen,
    /// The primary call ran and failed.
    Failure(E),
}

impl<E> FailureCause<E> {
    /// Returns true when the breaker rejected the call.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, FailureCause::CircuitOpen)
    }

    /// Returns the primary call's error, if there was one.
    pub fn failure(&self) -> Option<&E> {
        match self {
            FailureCause::Failure(error) => Some(error),
            FailureCause::CircuitOpen => None,
        }
    }

    pub(crate) fn into_client_error(self, client: &str) -> ClientError<E> {
        match self {
            FailureCause::CircuitOpen => ClientError::CircuitOpen {
                client: client.to_string(),
            },
            FailureCause::Failure(error) => ClientError::Inner(error),
        }
    }
}

/// Per-call outcome error of a [`Dispatcher`](crate::Dispatcher).
#[derive(Debug, Error)]
pub enum ClientError<E> {
    /// The circuit is open and no fallback is bound.
    #[error("circuit for client {client} is open; call not permitted")]
    CircuitOpen {
        /// The client whose circuit rejected the call.
        client: String,
    },

    /// The primary call failed and no fallback is bound.
    #[error("client call failed: {0}")]
    Inner(E),

    /// The substituted fallback failed as well.
    #[error("fallback failed: {0}")]
    FallbackFailed(E),
}

impl<E> ClientError<E> {
    /// Returns true if the error indicates the circuit is open.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ClientError::CircuitOpen { .. })
    }

    /// Returns true if the substituted fallback failed.
    pub fn is_fallback_failed(&self) -> bool {
        matches!(self, ClientError::FallbackFailed(_))
    }

    /// Returns the underlying service error if present.
    pub fn into_inner(self) -> Option<E> {
        match self {
            ClientError::Inner(error) | ClientError::FallbackFailed(error) => Some(error),
            ClientError::CircuitOpen { .. } => None,
        }
    }
}
