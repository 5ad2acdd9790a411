//! Identity resolution for client definitions.
//!
//! A definition's raw attributes go through expression substitution first,
//! then through validation: the identity candidates must yield a legal
//! host-bearing name, the base address must be a well-formed URL, and the
//! route prefix is normalized.

use std::sync::Arc;

use url::Url;

use crate::definition::ClientDefinition;
use crate::error::ConfigurationError;

/// Resolves embedded expressions in definition attributes.
///
/// Optional collaborator: when none is configured, plain `${VAR}`
/// environment substitution applies instead. Any `Fn(&str) -> String`
/// closure works as a resolver.
pub trait ExpressionResolver: Send + Sync {
    /// Resolves `raw`, returning the substituted text.
    fn resolve(&self, raw: &str) -> String;
}

impl<F> ExpressionResolver for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn resolve(&self, raw: &str) -> String {
        self(raw)
    }
}

/// A resolved, validated client identity. Derived once from a
/// [`ClientDefinition`], immutable thereafter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    /// The logical client name (service identity).
    pub name: String,
    /// The configuration-scope key. Defaults to `name`.
    pub context_id: String,
    /// Absolute base address override; empty when none is configured.
    pub url: String,
    /// Normalized route prefix; empty when none is configured.
    pub path: String,
}

/// Derives [`ResolvedIdentity`] values from client definitions.
#[derive(Clone, Default)]
pub struct IdentityResolver {
    expressions: Option<Arc<dyn ExpressionResolver>>,
}

impl IdentityResolver {
    /// Creates a resolver that uses plain `${VAR}` environment substitution.
    pub fn new() -> Self {
        Self { expressions: None }
    }

    /// Creates a resolver backed by an expression-resolution collaborator.
    pub fn with_expressions(resolver: impl ExpressionResolver + 'static) -> Self {
        Self {
            expressions: Some(Arc::new(resolver)),
        }
    }

    /// Resolves and validates the identity of `definition`.
    ///
    /// Substitution runs before every check, so expression-bearing
    /// attributes are legality-checked on their resolved values.
    pub fn resolve(
        &self,
        definition: &ClientDefinition,
    ) -> Result<ResolvedIdentity, ConfigurationError> {
        let name = resolve_name([
            definition.service_id().map(|v| self.substitute(v)),
            definition.name().map(|v| self.substitute(v)),
            definition.value().map(|v| self.substitute(v)),
        ])?;
        let context_id = resolve_context_id(
            definition.context_id().map(|v| self.substitute(v)).as_deref(),
            &name,
        )?;
        let url = resolve_url(&self.substitute(definition.url().unwrap_or("")))?;
        let path = resolve_path(&self.substitute(definition.path().unwrap_or("")));

        Ok(ResolvedIdentity {
            name,
            context_id,
            url,
            path,
        })
    }

    /// Substitutes embedded expressions in `raw`.
    pub fn substitute(&self, raw: &str) -> String {
        match &self.expressions {
            Some(resolver) => resolver.resolve(raw),
            None => substitute_env(raw),
        }
    }
}

/// Resolves the client name from identity candidates in precedence order.
///
/// The first candidate with non-whitespace text wins; the winner must pass
/// the host-legality check. With no usable candidate the definition is
/// invalid.
pub fn resolve_name<I, S>(candidates: I) -> Result<String, ConfigurationError>
where
    I: IntoIterator<Item = Option<S>>,
    S: AsRef<str>,
{
    for candidate in candidates.into_iter().flatten() {
        let value = candidate.as_ref();
        if has_text(value) {
            require_legal_host(value)?;
            return Ok(value.to_string());
        }
    }
    Err(ConfigurationError::MissingClientName)
}

/// Resolves the configuration-scope id: a non-blank explicit value wins and
/// is legality-checked; otherwise the resolved name applies.
pub fn resolve_context_id(
    explicit: Option<&str>,
    name: &str,
) -> Result<String, ConfigurationError> {
    match explicit {
        Some(value) if has_text(value) => {
            require_legal_host(value)?;
            Ok(value.to_string())
        }
        _ => Ok(name.to_string()),
    }
}

/// Validates the base address.
///
/// Empty input passes through, as does a deferred-expression placeholder
/// (`#{...}`). Anything else is prefixed with `http://` when it carries no
/// scheme separator and must then parse as a well-formed URL; the prefixed
/// value is returned.
pub fn resolve_url(raw: &str) -> Result<String, ConfigurationError> {
    if !has_text(raw) {
        return Ok(raw.to_string());
    }
    if raw.starts_with("#{") && raw.contains('}') {
        return Ok(raw.to_string());
    }

    let url = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };
    if Url::parse(&url).is_err() {
        return Err(ConfigurationError::MalformedUrl(url));
    }
    Ok(url)
}

/// Normalizes the route prefix: empty input passes through; otherwise trim,
/// ensure a single leading `/`, strip a single trailing `/`.
pub fn resolve_path(raw: &str) -> String {
    if !has_text(raw) {
        return raw.to_string();
    }
    let mut path = raw.trim().to_string();
    if !path.starts_with('/') {
        path.insert(0, '/');
    }
    if path.ends_with('/') {
        path.pop();
    }
    path
}

fn has_text(value: &str) -> bool {
    !value.trim().is_empty()
}

// A cheap sanity filter on the identity string: prefix a scheme when absent
// and require a resolvable host component.
fn require_legal_host(value: &str) -> Result<(), ConfigurationError> {
    let candidate = if value.starts_with("http://") || value.starts_with("https://") {
        value.to_string()
    } else {
        format!("http://{value}")
    };
    let legal = Url::parse(&candidate)
        .map(|url| url.host().is_some())
        .unwrap_or(false);
    if legal {
        Ok(())
    } else {
        Err(ConfigurationError::IllegalHostname(value.to_string()))
    }
}

// Plain `${VAR}` substitution against the process environment. Unresolvable
// placeholders stay intact.
fn substitute_env(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str("${");
            out.push_str(after);
            return out;
        };
        let key = &after[..end];
        match std::env::var(key) {
            Ok(value) => out.push_str(&value),
            Err(_) => {
                out.push_str("${");
                out.push_str(key);
                out.push('}');
            }
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}
