//! Fallback bindings resolved from a configuration scope.

use std::any::type_name;
use std::sync::Arc;

use crate::definition::TypeRef;
use crate::error::{FailureCause, ResolutionError};
use crate::registry::{Lookup, ScopeRegistry};
use crate::SharedClient;

/// Produces a fallback client from the cause that tripped the fallback path.
pub struct FallbackFactory<Req, Res, E> {
    produce: Arc<dyn Fn(&FailureCause<E>) -> SharedClient<Req, Res, E> + Send + Sync>,
}

impl<Req, Res, E> FallbackFactory<Req, Res, E> {
    /// Creates a factory from a producer function.
    pub fn new<F>(produce: F) -> Self
    where
        F: Fn(&FailureCause<E>) -> SharedClient<Req, Res, E> + Send + Sync + 'static,
    {
        Self {
            produce: Arc::new(produce),
        }
    }

    /// Produces a fallback client for the given cause.
    pub fn create(&self, cause: &FailureCause<E>) -> SharedClient<Req, Res, E> {
        (self.produce)(cause)
    }
}

impl<Req, Res, E> Clone for FallbackFactory<Req, Res, E> {
    fn clone(&self) -> Self {
        Self {
            produce: Arc::clone(&self.produce),
        }
    }
}

impl<Req, Res, E> std::fmt::Debug for FallbackFactory<Req, Res, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackFactory").finish_non_exhaustive()
    }
}

/// The fallback strategy selected for one dispatcher at construction time.
pub enum FallbackBinding<Req, Res, E> {
    /// Failures propagate to the caller unchanged.
    None,
    /// A fixed degraded implementation of the client interface.
    Instance(SharedClient<Req, Res, E>),
    /// A factory producing a degraded implementation per triggering cause.
    Factory(FallbackFactory<Req, Res, E>),
}

impl<Req, Res, E> Clone for FallbackBinding<Req, Res, E> {
    fn clone(&self) -> Self {
        match self {
            Self::None => Self::None,
            Self::Instance(instance) => Self::Instance(instance.clone()),
            Self::Factory(factory) => Self::Factory(factory.clone()),
        }
    }
}

pub(crate) fn resolve_instance<Req, Res, E>(
    registry: &ScopeRegistry,
    scope: &str,
    declared: TypeRef,
    client: &str,
) -> Result<SharedClient<Req, Res, E>, ResolutionError>
where
    Req: 'static,
    Res: 'static,
    E: 'static,
{
    resolve_as::<SharedClient<Req, Res, E>>(registry, scope, declared, "fallback", client)
}

pub(crate) fn resolve_factory<Req, Res, E>(
    registry: &ScopeRegistry,
    scope: &str,
    declared: TypeRef,
    client: &str,
) -> Result<FallbackFactory<Req, Res, E>, ResolutionError>
where
    Req: 'static,
    Res: 'static,
    E: 'static,
{
    resolve_as::<FallbackFactory<Req, Res, E>>(registry, scope, declared, "fallback factory", client)
}

// A wrong instance wired under the right declared type must surface here as
// an explicit error, not as a failed dispatch later.
fn resolve_as<T: std::any::Any + Clone>(
    registry: &ScopeRegistry,
    scope: &str,
    declared: TypeRef,
    mechanism: &'static str,
    client: &str,
) -> Result<T, ResolutionError> {
    match registry.instance::<T>(scope, &declared) {
        Lookup::Found(value) => Ok(value),
        Lookup::Missing => Err(ResolutionError::FallbackNotFound {
            mechanism,
            declared: declared.type_name(),
            client: client.to_string(),
        }),
        Lookup::Incompatible => Err(ResolutionError::IncompatibleFallback {
            mechanism,
            declared: declared.type_name(),
            required: type_name::<T>(),
            client: client.to_string(),
        }),
    }
}
