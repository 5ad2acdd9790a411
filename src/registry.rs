//! Named configuration scopes for per-client instances.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::definition::TypeRef;

struct Binding {
    value: Box<dyn Any + Send>,
}

/// The per-client configuration container.
///
/// Values are bound within a named scope under a declared marker type and
/// looked up by scope name plus type. Scopes are keyed by a client's
/// `context_id`.
#[derive(Default)]
pub struct ScopeRegistry {
    scopes: Mutex<HashMap<String, HashMap<TypeId, Binding>>>,
}

pub(crate) enum Lookup<T> {
    Missing,
    Incompatible,
    Found(T),
}

impl ScopeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `value` in `scope` under the declared marker type `M`.
    ///
    /// Exactly one instance per declared type and scope: rebinding replaces
    /// the previous value.
    pub fn bind<M: 'static>(&self, scope: impl Into<String>, value: impl Any + Send) {
        let mut scopes = self.lock();
        scopes.entry(scope.into()).or_default().insert(
            TypeId::of::<M>(),
            Binding {
                value: Box::new(value),
            },
        );
    }

    /// Looks up the instance bound under `T` in `scope`, cloning it out.
    pub fn get<T: Any + Clone>(&self, scope: &str) -> Option<T> {
        let scopes = self.lock();
        scopes
            .get(scope)?
            .get(&TypeId::of::<T>())?
            .value
            .downcast_ref::<T>()
            .cloned()
    }

    /// Typed lookup by declared reference, distinguishing a missing binding
    /// from one whose value is not the required capability `T`.
    pub(crate) fn instance<T: Any + Clone>(&self, scope: &str, declared: &TypeRef) -> Lookup<T> {
        let scopes = self.lock();
        let Some(binding) = scopes
            .get(scope)
            .and_then(|bindings| bindings.get(&declared.id()))
        else {
            return Lookup::Missing;
        };
        match binding.value.downcast_ref::<T>() {
            Some(value) => Lookup::Found(value.clone()),
            None => Lookup::Incompatible,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, HashMap<TypeId, Binding>>> {
        self.scopes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
