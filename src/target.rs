//! Construction of resilient dispatch targets.

use std::sync::Arc;

use crate::breaker::BreakerFactory;
use crate::definition::ClientDefinition;
use crate::dispatcher::{Dispatcher, Guard};
use crate::error::{RegistrationError, ResolutionError};
use crate::fallback::{resolve_factory, resolve_instance, FallbackBinding};
use crate::identity::{IdentityResolver, ResolvedIdentity};
use crate::registry::ScopeRegistry;
use crate::SharedClient;

/// Builds [`Dispatcher`]s for client definitions.
///
/// Without a breaker factory every built dispatcher is an unguarded
/// passthrough. With one, the fallback mechanism declared on the definition
/// is resolved from the client's configuration scope and bound, and the
/// breaker is obtained from the factory keyed by the resolved `context_id`.
pub struct TargetBuilder<'a> {
    registry: &'a ScopeRegistry,
    breakers: Option<&'a BreakerFactory>,
    identities: IdentityResolver,
}

impl<'a> TargetBuilder<'a> {
    /// Creates a builder over the given configuration scopes, with no
    /// breaker factory.
    pub fn new(registry: &'a ScopeRegistry) -> Self {
        Self {
            registry,
            breakers: None,
            identities: IdentityResolver::new(),
        }
    }

    /// Enables breaker supervision for every target built from here on.
    pub fn with_breakers(mut self, breakers: &'a BreakerFactory) -> Self {
        self.breakers = Some(breakers);
        self
    }

    /// Replaces the identity resolver used by [`register`](Self::register).
    pub fn with_identity_resolver(mut self, identities: IdentityResolver) -> Self {
        self.identities = identities;
        self
    }

    /// Registration-time entry point: resolves and validates the
    /// definition's identity, then builds the dispatch target. Either
    /// failure aborts registration for this client only.
    pub fn register<Req, Res, E>(
        &self,
        definition: &ClientDefinition,
        target: SharedClient<Req, Res, E>,
    ) -> Result<Dispatcher<Req, Res, E>, RegistrationError>
    where
        Req: 'static,
        Res: 'static,
        E: 'static,
    {
        let identity = self.identities.resolve(definition)?;
        Ok(self.build(definition, &identity, target)?)
    }

    /// Builds the dispatch target for one client.
    ///
    /// Decision policy, in order: no breaker factory configured means a
    /// plain passthrough; a declared `fallback` binds a fixed instance (and
    /// wins over a simultaneously declared factory); a declared
    /// `fallback_factory` binds a per-cause factory; otherwise failures
    /// propagate unchanged. Building twice for one `context_id` yields
    /// dispatchers sharing one breaker, so duplicate construction is safe.
    pub fn build<Req, Res, E>(
        &self,
        definition: &ClientDefinition,
        identity: &ResolvedIdentity,
        target: SharedClient<Req, Res, E>,
    ) -> Result<Dispatcher<Req, Res, E>, ResolutionError>
    where
        Req: 'static,
        Res: 'static,
        E: 'static,
    {
        let identity = Arc::new(identity.clone());

        let Some(breakers) = self.breakers else {
            return Ok(Dispatcher::new(identity, target, None));
        };

        let fallback = if let Some(declared) = definition.fallback() {
            #[cfg(feature = "tracing")]
            if definition.fallback_factory().is_some() {
                tracing::warn!(
                    client = %identity.name,
                    "both fallback and fallback factory declared; the factory is ignored"
                );
            }
            FallbackBinding::Instance(resolve_instance(
                self.registry,
                &identity.context_id,
                declared,
                &identity.name,
            )?)
        } else if let Some(declared) = definition.fallback_factory() {
            FallbackBinding::Factory(resolve_factory(
                self.registry,
                &identity.context_id,
                declared,
                &identity.name,
            )?)
        } else {
            FallbackBinding::None
        };

        let breaker = breakers.create(&identity.context_id);
        Ok(Dispatcher::new(
            identity,
            target,
            Some(Guard { breaker, fallback }),
        ))
    }
}
