//! Circuit-breaker guarded dispatch targets for declaratively described
//! remote clients.
//!
//! A remote client interface is described once (logical name, optional
//! configuration scope, base address, route prefix, declared fallback) and
//! this crate turns that description into a [`Dispatcher`]: a
//! `tower::Service` that routes every call through an optional breaker and
//! substitutes a degraded implementation when the breaker is open or the
//! call fails.
//!
//! ## Construction
//!
//! A [`ClientDefinition`] flows through the [`IdentityResolver`] to produce
//! a validated [`ResolvedIdentity`]; that identity plus the definition flows
//! into the [`TargetBuilder`], which resolves the declared fallback from the
//! client's configuration scope and binds a breaker keyed by the resolved
//! `context_id`:
//!
//! ```rust
//! use tower::service_fn;
//! use tower_resilient_client::{
//!     shared, BreakerConfig, BreakerFactory, ClientDefinition, ScopeRegistry, TargetBuilder,
//! };
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ScopeRegistry::new();
//! let breakers = BreakerFactory::new(
//!     BreakerConfig::builder()
//!         .failure_rate_threshold(0.5)
//!         .sliding_window_size(20)
//!         .build(),
//! );
//!
//! let definition = ClientDefinition::builder().name("orders-service").build();
//! let target = shared(service_fn(|req: String| async move {
//!     Ok::<_, std::io::Error>(req)
//! }));
//!
//! let orders = TargetBuilder::new(&registry)
//!     .with_breakers(&breakers)
//!     .register(&definition, target)?;
//! assert!(orders.is_guarded());
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```
//!
//! ## Fallbacks
//!
//! A fallback is any client of the same request/response shape, bound in the
//! client's configuration scope under a declared marker type. The builder
//! resolves it once, eagerly, and fails registration when nothing is bound
//! or the bound value is not usable as this client:
//!
//! ```rust
//! use tower::service_fn;
//! use tower_resilient_client::{shared, ClientDefinition, ScopeRegistry};
//!
//! struct OrdersFallback;
//!
//! let registry = ScopeRegistry::new();
//! registry.bind::<OrdersFallback>(
//!     "orders-service",
//!     shared(service_fn(|_req: String| async move {
//!         Ok::<_, std::io::Error>(String::from("cached order"))
//!     })),
//! );
//!
//! let definition = ClientDefinition::builder()
//!     .name("orders-service")
//!     .fallback::<OrdersFallback>()
//!     .build();
//! ```
//!
//! A [`FallbackFactory`] binds the same way and produces the degraded
//! client per triggering [`FailureCause`], so the substitute can depend on
//! whether the breaker rejected the call or the primary call failed.
//!
//! ## Call path
//!
//! Each invocation runs the primary call under breaker supervision. On
//! success the result is returned and recorded; on breaker rejection or
//! primary failure the bound fallback handles the same request, and with no
//! fallback bound the cause reaches the caller as a [`ClientError`], so
//! nothing is ever silently swallowed. Requests a client interface answers
//! itself can be intercepted with a [`LocalHandler`], bypassing breaker and
//! fallback entirely.
//!
//! ## Feature flags
//! - `metrics`: breaker call counters and state gauges via the `metrics`
//!   crate
//! - `tracing`: dispatch and state-transition logging via the `tracing`
//!   crate

pub use breaker::{Breaker, BreakerFactory};
pub use circuit::{CircuitMetrics, CircuitState};
pub use config::{BreakerConfig, BreakerConfigBuilder};
pub use definition::{ClientDefinition, ClientDefinitionBuilder, TypeRef};
pub use dispatcher::{Dispatcher, LocalDecision, LocalHandler};
pub use error::{
    ClientError, ConfigurationError, FailureCause, RegistrationError, ResolutionError,
};
pub use events::{BreakerEvent, EventListener, EventListeners, FnListener};
pub use fallback::{FallbackBinding, FallbackFactory};
pub use identity::{
    resolve_context_id, resolve_name, resolve_path, resolve_url, ExpressionResolver,
    IdentityResolver, ResolvedIdentity,
};
pub use registry::ScopeRegistry;
pub use target::TargetBuilder;

mod breaker;
mod circuit;
mod config;
mod definition;
mod dispatcher;
mod error;
mod events;
mod fallback;
mod identity;
mod registry;
mod target;

/// Type-erased client interface: any `tower::Service` over the client's
/// request/response shape, boxed for storage and cloning.
pub type SharedClient<Req, Res, E> = tower::util::BoxCloneService<Req, Res, E>;

/// Boxes a concrete client service into a [`SharedClient`].
pub fn shared<S, Req>(service: S) -> SharedClient<Req, S::Response, S::Error>
where
    S: tower::Service<Req> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    tower::util::BoxCloneService::new(service)
}
