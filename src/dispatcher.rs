//! The per-call invocation path.

use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use tower::{Service, ServiceExt};

use crate::breaker::Breaker;
use crate::error::ClientError;
use crate::fallback::FallbackBinding;
use crate::identity::ResolvedIdentity;
use crate::SharedClient;

#[cfg(feature = "tracing")]
use tracing::debug;

/// Decision made by a [`LocalHandler`] for one request.
pub enum LocalDecision<Req, Res, E> {
    /// Forward the request to the remote call path.
    Forward(Req),
    /// The request was answered locally; breaker and fallback are bypassed.
    Handled(BoxFuture<'static, Result<Res, E>>),
}

/// Answers built-in (non-proxied) requests of the client interface directly,
/// bypassing the breaker and fallback path.
pub type LocalHandler<Req, Res, E> =
    Arc<dyn Fn(Req) -> LocalDecision<Req, Res, E> + Send + Sync>;

pub(crate) struct Guard<Req, Res, E> {
    pub(crate) breaker: Breaker,
    pub(crate) fallback: FallbackBinding<Req, Res, E>,
}

impl<Req, Res, E> Clone for Guard<Req, Res, E> {
    fn clone(&self) -> Self {
        Self {
            breaker: self.breaker.clone(),
            fallback: self.fallback.clone(),
        }
    }
}

/// The callable produced for one client interface.
///
/// Bound to exactly one [`ResolvedIdentity`], at most one [`Breaker`], one
/// [`FallbackBinding`], and one underlying real target. Created once per
/// client at registration time and reused for the client's lifetime; calls
/// may run concurrently on clones, with the breaker's circuit as the only
/// shared mutable state.
///
/// Without a breaker the dispatcher is an unguarded passthrough. With one,
/// each call runs under breaker supervision and, on rejection or failure,
/// the bound fallback substitutes for the primary target:
///
/// - [`FallbackBinding::None`] propagates the cause to the caller unchanged;
/// - [`FallbackBinding::Instance`] routes the same request to the fixed
///   degraded implementation;
/// - [`FallbackBinding::Factory`] produces a degraded implementation from
///   the triggering cause, then routes the request to it.
pub struct Dispatcher<Req, Res, E> {
    identity: Arc<ResolvedIdentity>,
    target: SharedClient<Req, Res, E>,
    local: Option<LocalHandler<Req, Res, E>>,
    guard: Option<Guard<Req, Res, E>>,
}

impl<Req, Res, E> Dispatcher<Req, Res, E> {
    pub(crate) fn new(
        identity: Arc<ResolvedIdentity>,
        target: SharedClient<Req, Res, E>,
        guard: Option<Guard<Req, Res, E>>,
    ) -> Self {
        Self {
            identity,
            target,
            local: None,
            guard,
        }
    }

    /// Installs a handler for requests the client interface answers itself.
    ///
    /// A handled request never reaches the breaker or the fallback path.
    pub fn with_local_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(Req) -> LocalDecision<Req, Res, E> + Send + Sync + 'static,
    {
        self.local = Some(Arc::new(handler));
        self
    }

    /// The identity this dispatcher was built for.
    pub fn identity(&self) -> &ResolvedIdentity {
        &self.identity
    }

    /// Whether calls run under breaker supervision.
    pub fn is_guarded(&self) -> bool {
        self.guard.is_some()
    }

    /// The breaker guarding this dispatcher, if any.
    pub fn breaker(&self) -> Option<&Breaker> {
        self.guard.as_ref().map(|guard| &guard.breaker)
    }
}

impl<Req, Res, E> Clone for Dispatcher<Req, Res, E> {
    fn clone(&self) -> Self {
        Self {
            identity: Arc::clone(&self.identity),
            target: self.target.clone(),
            local: self.local.clone(),
            guard: self.guard.clone(),
        }
    }
}

impl<Req, Res, E> std::fmt::Debug for Dispatcher<Req, Res, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("identity", &self.identity)
            .field("local", &self.local.is_some())
            .field("guarded", &self.guard.is_some())
            .finish()
    }
}

impl<Req, Res, E> Service<Req> for Dispatcher<Req, Res, E>
where
    Req: Clone + Send + 'static,
    Res: Send + 'static,
    E: Send + 'static,
{
    type Response = Res;
    type Error = ClientError<E>;
    type Future = BoxFuture<'static, Result<Res, ClientError<E>>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.target.poll_ready(cx).map_err(ClientError::Inner)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let identity = Arc::clone(&self.identity);
        let target = self.target.clone();
        let local = self.local.clone();
        let guard = self.guard.clone();

        Box::pin(async move {
            let req = match local {
                Some(handler) => match handler(req) {
                    LocalDecision::Handled(response) => {
                        #[cfg(feature = "tracing")]
                        debug!(client = %identity.name, "request answered locally");
                        return response.await.map_err(ClientError::Inner);
                    }
                    LocalDecision::Forward(req) => req,
                },
                None => req,
            };

            let Some(guard) = guard else {
                // Unguarded passthrough.
                return target.oneshot(req).await.map_err(ClientError::Inner);
            };

            #[cfg(feature = "tracing")]
            debug!(client = %identity.name, breaker = guard.breaker.name(), "dispatching under breaker supervision");

            // The request is retained only when a fallback could consume it.
            let retained = if matches!(guard.fallback, FallbackBinding::None) {
                None
            } else {
                Some(req.clone())
            };

            match guard.breaker.run(target.oneshot(req)).await {
                Ok(response) => Ok(response),
                Err(cause) => {
                    let substitute = match (&guard.fallback, retained) {
                        (FallbackBinding::Instance(instance), Some(req)) => {
                            Some((instance.clone(), req))
                        }
                        (FallbackBinding::Factory(factory), Some(req)) => {
                            Some((factory.create(&cause), req))
                        }
                        _ => None,
                    };

                    match substitute {
                        Some((fallback, req)) => {
                            #[cfg(feature = "tracing")]
                            debug!(
                                client = %identity.name,
                                circuit_open = cause.is_circuit_open(),
                                "substituting fallback for failed call"
                            );
                            fallback.oneshot(req).await.map_err(ClientError::FallbackFailed)
                        }
                        None => Err(cause.into_client_error(&identity.name)),
                    }
                }
            }
        })
    }
}
