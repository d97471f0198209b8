//! Guard predicates for controlling state transitions.
//!
//! Guards are pure boolean functions of `(context, event)`. They are evaluated
//! synchronously during transition selection and must not mutate anything;
//! candidates are tried in declaration order and selection short-circuits, so
//! once one passes, later guards are never evaluated.

use std::fmt;
use std::sync::Arc;

use crate::core::{Context, Event};
use crate::registry::BehaviorError;

/// Pure predicate that determines whether a transition may be taken.
///
/// # Example
///
/// ```rust
/// use statecraft::{Context, Event, Guard};
/// use serde_json::json;
///
/// let within_range = Guard::new(|_ctx: &Context, event: &Event| {
///     event.get_i64("level").map(|l| (0..=10).contains(&l)).unwrap_or(false)
/// });
///
/// let ctx = Context::new();
/// assert!(within_range.check(&ctx, &Event::new("VOLUME").field("level", json!(7))).unwrap());
/// assert!(!within_range.check(&ctx, &Event::new("VOLUME").field("level", json!(15))).unwrap());
/// ```
#[derive(Clone)]
pub struct Guard {
    predicate: Arc<dyn Fn(&Context, &Event) -> Result<bool, BehaviorError> + Send + Sync>,
}

impl Guard {
    /// Create a guard from an infallible predicate.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&Context, &Event) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(move |ctx, event| Ok(predicate(ctx, event))),
        }
    }

    /// Create a guard from a predicate that may fail. A failing guard aborts
    /// the whole step with nothing committed.
    pub fn fallible<F>(predicate: F) -> Self
    where
        F: Fn(&Context, &Event) -> Result<bool, BehaviorError> + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    /// Evaluate the predicate.
    pub fn check(&self, context: &Context, event: &Event) -> Result<bool, BehaviorError> {
        (self.predicate)(context, event)
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Guard(..)")
    }
}
