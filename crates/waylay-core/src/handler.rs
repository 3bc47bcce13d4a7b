//! The handler contract and registry (spec §4.3).
//!
//! Kept in `waylay-core` rather than a separate crate because `Job` calls
//! directly into the registry from `payload_object()` — the dependency the
//! spec draws (Job → Handler Registry → Handler) would otherwise become a
//! cycle across crates. Concrete handler *bodies* (the multiplexed handler,
//! reference `noop`/`always_fail` fixtures) live in `waylay-handlers`, which
//! depends on this crate, not the other way around.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::backend::Backend;
use crate::error::DeserializationError;

/// The single operation every handler exposes (spec §4.3).
///
/// Returning `Ok(())` means success; any `Err` triggers the worker's
/// retry-or-fail logic (spec §4.4). Handlers speak `anyhow` internally —
/// only `waylay-core`'s own operations return the structured `WaylayError`.
#[async_trait::async_trait]
pub trait Handler: Send + Sync {
    /// Execute the action this handler describes.
    async fn perform(&self) -> anyhow::Result<()>;

    /// Display name for logs (spec §4.2 `name()`). Defaults to the Rust
    /// type name, which is rarely what you want — handlers built from a
    /// `display_name` descriptor key should override this.
    fn name(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

/// Cross-cutting dependencies available to a handler constructor.
///
/// Notably carries the `Backend`, so composite handlers (the multiplexed
/// handler, §4.5) can enqueue further jobs from within `Perform`.
#[derive(Clone)]
pub struct HandlerContext {
    backend: Arc<Backend>,
}

impl HandlerContext {
    pub fn new(backend: Arc<Backend>) -> Self {
        Self { backend }
    }

    /// The shared backend, for handlers that enqueue further work.
    pub fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }
}

/// A registered constructor rejected its parameters (spec §7.3) — missing
/// required field, malformed value, and so on. Treated identically to a
/// `DeserializationError` by the worker: permanent for that job.
#[derive(Debug, thiserror::Error, Clone)]
#[error("{0}")]
pub struct HandlerBuildError(pub String);

impl HandlerBuildError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

type Constructor =
    Box<dyn Fn(&HandlerContext, &Value) -> Result<Box<dyn Handler>, HandlerBuildError> + Send + Sync>;

/// Process-wide mapping from a handler `type` string to a constructor
/// (spec §4.3). Populated once at startup and handed to `Backend`/`Worker`
/// as a shared `Arc` — the design note in spec §9 explicitly steers away
/// from a hidden global, so there is no `static` registry anywhere in this
/// crate.
#[derive(Default)]
pub struct HandlerRegistry {
    constructors: HashMap<String, Constructor>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor for `kind`. Registration is additive and
    /// meant to happen once at process startup (spec §4.3.1); re-registering
    /// the same kind replaces the previous constructor rather than erroring,
    /// since nothing downstream depends on registration being single-shot
    /// the way `CommandRegistry::register` in the grounding source does —
    /// there a duplicate indicates a programmer error with typed commands,
    /// here it's more often a test overriding a fixture.
    pub fn register<F>(&mut self, kind: impl Into<String>, constructor: F)
    where
        F: Fn(&HandlerContext, &Value) -> Result<Box<dyn Handler>, HandlerBuildError>
            + Send
            + Sync
            + 'static,
    {
        self.constructors.insert(kind.into(), Box::new(constructor));
    }

    /// Whether a constructor is registered for `kind`.
    pub fn has(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    /// Build a `Handler` from a parsed descriptor's `kind` and raw params.
    ///
    /// `params` is the full handler JSON object (not just `arguments`) —
    /// constructors receive the whole descriptor and pick out whatever keys
    /// they recognize, per spec §4.3.2 ("no further parsing contract").
    pub fn build(
        &self,
        ctx: &HandlerContext,
        kind: &str,
        params: &Value,
    ) -> Result<Box<dyn Handler>, DeserializationError> {
        let constructor = self
            .constructors
            .get(kind)
            .ok_or_else(|| DeserializationError::UnknownType(kind.to_string()))?;

        constructor(ctx, params)
            .map_err(|e| DeserializationError::MalformedPayload(e.0))
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("registered_types", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait::async_trait]
    impl Handler for Noop {
        async fn perform(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn ctx() -> HandlerContext {
        HandlerContext::new(Arc::new(Backend::new_for_test()))
    }

    #[test]
    fn unregistered_kind_is_unknown_type() {
        let registry = HandlerRegistry::new();
        let err = registry.build(&ctx(), "nope", &Value::Null).unwrap_err();
        assert_eq!(err, DeserializationError::UnknownType("nope".to_string()));
    }

    #[test]
    fn registered_kind_builds() {
        let mut registry = HandlerRegistry::new();
        registry.register("noop", |_, _| Ok(Box::new(Noop)));
        assert!(registry.has("noop"));
        let handler = registry.build(&ctx(), "noop", &Value::Null).unwrap();
        assert_eq!(handler.name(), std::any::type_name::<Noop>());
    }

    #[test]
    fn constructor_rejection_becomes_malformed_payload() {
        let mut registry = HandlerRegistry::new();
        registry.register("picky", |_, _| Err(HandlerBuildError::new("missing `url`")));
        let err = registry.build(&ctx(), "picky", &Value::Null).unwrap_err();
        assert!(matches!(err, DeserializationError::MalformedPayload(_)));
    }

    #[test]
    fn re_registering_replaces_constructor() {
        let mut registry = HandlerRegistry::new();
        registry.register("noop", |_, _| Err(HandlerBuildError::new("first")));
        registry.register("noop", |_, _| Ok(Box::new(Noop)));
        assert!(registry.build(&ctx(), "noop", &Value::Null).is_ok());
    }
}
