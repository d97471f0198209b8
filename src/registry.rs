//! String-keyed registry of collaborator-supplied behavior.
//!
//! The definition model references guards, assigners, effects, and services by
//! name only; the registry supplies the implementations at machine
//! construction time and is checked for completeness during validation, so a
//! missing name is a [`DefinitionError`](crate::DefinitionError) rather than a
//! runtime surprise. The core never hard-codes domain behavior.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::core::{Context, Event, Guard};
use crate::interpreter::invoke::Service;

/// Error reported by collaborator-supplied guards, assigners, or effects.
#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct BehaviorError {
    message: String,
}

impl BehaviorError {
    /// Wrap a failure message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The failure message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

pub(crate) type ComputeFn =
    Arc<dyn Fn(&Context, &Event) -> Result<Value, BehaviorError> + Send + Sync>;
pub(crate) type EffectFn =
    Arc<dyn Fn(&Context, &Event) -> Result<(), BehaviorError> + Send + Sync>;
pub(crate) type ServiceFn = Arc<dyn Fn(&Context, &Event) -> Service + Send + Sync>;

/// Named behavior implementations injected at machine construction.
///
/// # Example
///
/// ```rust
/// use statecraft::{Context, Event, Registry};
/// use serde_json::json;
///
/// let registry = Registry::new()
///     .guard("volumeWithinRange", |_ctx: &Context, event: &Event| {
///         event.get_i64("level").map(|l| (0..=10).contains(&l)).unwrap_or(false)
///     })
///     .compute("assignVolume", |_ctx: &Context, event: &Event| {
///         event.get("level").cloned().unwrap_or(json!(null))
///     })
///     .effect("logSkip", |_ctx: &Context, _event: &Event| {});
/// ```
#[derive(Clone, Default)]
pub struct Registry {
    guards: HashMap<String, Guard>,
    computes: HashMap<String, ComputeFn>,
    effects: HashMap<String, EffectFn>,
    services: HashMap<String, ServiceFn>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pure guard predicate.
    pub fn guard<F>(mut self, name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Context, &Event) -> bool + Send + Sync + 'static,
    {
        self.guards.insert(name.into(), Guard::new(predicate));
        self
    }

    /// Register a guard that may fail.
    pub fn try_guard<F>(mut self, name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Context, &Event) -> Result<bool, BehaviorError> + Send + Sync + 'static,
    {
        self.guards.insert(name.into(), Guard::fallible(predicate));
        self
    }

    /// Register a pure compute function used by assign actions.
    pub fn compute<F>(mut self, name: impl Into<String>, compute: F) -> Self
    where
        F: Fn(&Context, &Event) -> Value + Send + Sync + 'static,
    {
        self.computes
            .insert(name.into(), Arc::new(move |ctx, ev| Ok(compute(ctx, ev))));
        self
    }

    /// Register a compute function that may fail.
    pub fn try_compute<F>(mut self, name: impl Into<String>, compute: F) -> Self
    where
        F: Fn(&Context, &Event) -> Result<Value, BehaviorError> + Send + Sync + 'static,
    {
        self.computes.insert(name.into(), Arc::new(compute));
        self
    }

    /// Register an infallible side effect.
    pub fn effect<F>(mut self, name: impl Into<String>, effect: F) -> Self
    where
        F: Fn(&Context, &Event) + Send + Sync + 'static,
    {
        self.effects.insert(
            name.into(),
            Arc::new(move |ctx, ev| {
                effect(ctx, ev);
                Ok(())
            }),
        );
        self
    }

    /// Register a side effect that may fail; failures propagate to the caller
    /// of `send` after the step has committed.
    pub fn try_effect<F>(mut self, name: impl Into<String>, effect: F) -> Self
    where
        F: Fn(&Context, &Event) -> Result<(), BehaviorError> + Send + Sync + 'static,
    {
        self.effects.insert(name.into(), Arc::new(effect));
        self
    }

    /// Register a service factory for invoked child processes. The factory is
    /// called with the committed context and the triggering event each time
    /// the owning state is entered.
    pub fn service<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Context, &Event) -> Service + Send + Sync + 'static,
    {
        self.services.insert(name.into(), Arc::new(factory));
        self
    }

    pub(crate) fn get_guard(&self, name: &str) -> Option<&Guard> {
        self.guards.get(name)
    }

    pub(crate) fn get_compute(&self, name: &str) -> Option<&ComputeFn> {
        self.computes.get(name)
    }

    pub(crate) fn get_effect(&self, name: &str) -> Option<&EffectFn> {
        self.effects.get(name)
    }

    pub(crate) fn get_service(&self, name: &str) -> Option<&ServiceFn> {
        self.services.get(name)
    }

    pub(crate) fn has_guard(&self, name: &str) -> bool {
        self.guards.contains_key(name)
    }

    pub(crate) fn has_compute(&self, name: &str) -> bool {
        self.computes.contains_key(name)
    }

    pub(crate) fn has_effect(&self, name: &str) -> bool {
        self.effects.contains_key(name)
    }

    pub(crate) fn has_service(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("guards", &self.guards.keys().collect::<Vec<_>>())
            .field("computes", &self.computes.keys().collect::<Vec<_>>())
            .field("effects", &self.effects.keys().collect::<Vec<_>>())
            .field("services", &self.services.keys().collect::<Vec<_>>())
            .finish()
    }
}
