//! Declarative description of one remote client interface.

use std::any::{type_name, TypeId};

/// Names a registered fallback implementation by its declared type.
///
/// The declared type is a marker: the value bound under it in the client's
/// configuration scope is what actually gets used, and the resolver checks
/// that value against the capability the client requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeRef {
    id: TypeId,
    name: &'static str,
}

impl TypeRef {
    /// Creates a reference to the type `T`.
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// The referenced type's name, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn id(&self) -> TypeId {
        self.id
    }
}

/// Immutable description of one remote client interface.
///
/// Carries the identity candidates (`service_id`, `name`, `value`), the
/// optional configuration-scope key, base address and route prefix, and the
/// declared fallback mechanisms. Built with [`ClientDefinition::builder`].
#[derive(Debug, Clone, Default)]
pub struct ClientDefinition {
    service_id: Option<String>,
    name: Option<String>,
    value: Option<String>,
    context_id: Option<String>,
    url: Option<String>,
    path: Option<String>,
    fallback: Option<TypeRef>,
    fallback_factory: Option<TypeRef>,
}

impl ClientDefinition {
    /// Creates a new definition builder.
    pub fn builder() -> ClientDefinitionBuilder {
        ClientDefinitionBuilder::default()
    }

    /// The deprecated identity candidate, highest precedence when set.
    pub fn service_id(&self) -> Option<&str> {
        self.service_id.as_deref()
    }

    /// The logical client name candidate.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The aliased identity candidate, lowest precedence.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// The explicit configuration-scope key, if any.
    pub fn context_id(&self) -> Option<&str> {
        self.context_id.as_deref()
    }

    /// The base address override, if any.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// The route prefix, if any.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// The declared fallback implementation, if any.
    pub fn fallback(&self) -> Option<TypeRef> {
        self.fallback
    }

    /// The declared fallback factory, if any.
    pub fn fallback_factory(&self) -> Option<TypeRef> {
        self.fallback_factory
    }
}

/// Builder for [`ClientDefinition`].
#[derive(Debug, Clone, Default)]
pub struct ClientDefinitionBuilder {
    definition: ClientDefinition,
}

impl ClientDefinitionBuilder {
    /// Sets the deprecated identity candidate.
    #[deprecated(note = "use `name` instead")]
    pub fn service_id(mut self, service_id: impl Into<String>) -> Self {
        self.definition.service_id = Some(service_id.into());
        self
    }

    /// Sets the logical client name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.definition.name = Some(name.into());
        self
    }

    /// Sets the aliased identity candidate.
    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.definition.value = Some(value.into());
        self
    }

    /// Sets the configuration-scope key. Defaults to the resolved name.
    pub fn context_id(mut self, context_id: impl Into<String>) -> Self {
        self.definition.context_id = Some(context_id.into());
        self
    }

    /// Sets an absolute base address override.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.definition.url = Some(url.into());
        self
    }

    /// Sets a route prefix.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.definition.path = Some(path.into());
        self
    }

    /// Declares a fixed fallback implementation, registered in the client's
    /// configuration scope under the type `T`.
    pub fn fallback<T: 'static>(mut self) -> Self {
        self.definition.fallback = Some(TypeRef::of::<T>());
        self
    }

    /// Declares a fallback factory, registered in the client's configuration
    /// scope under the type `T`.
    pub fn fallback_factory<T: 'static>(mut self) -> Self {
        self.definition.fallback_factory = Some(TypeRef::of::<T>());
        self
    }

    /// Builds the definition.
    pub fn build(self) -> ClientDefinition {
        self.definition
    }
}
