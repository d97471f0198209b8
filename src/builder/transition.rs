//! Fluent construction of transitions.

use crate::core::action::Action;
use crate::core::node::{Target, TransitionDef};

/// Builder for one transition of a state.
///
/// A transition with no target fires its actions without exiting anything.
/// Targets use the machine's notation: `"#a.b"` is absolute, `"sibling"`
/// searches enclosing scopes, and `".child"` resolves against the source's
/// own children and is internal by default.
///
/// # Example
///
/// ```rust
/// use statecraft::{Action, TransitionBuilder};
///
/// let _skip = TransitionBuilder::new()
///     .guard("canSkip")
///     .action(Action::effect("logSkip"))
///     .target("#player.loading");
/// ```
#[derive(Clone, Debug, Default)]
pub struct TransitionBuilder {
    target: Option<String>,
    internal: Option<bool>,
    guard: Option<String>,
    actions: Vec<Action>,
}

impl TransitionBuilder {
    /// A targetless transition with no guard and no actions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the target using the textual notation.
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Name the registered guard that must pass for this transition to fire.
    pub fn guard(mut self, name: impl Into<String>) -> Self {
        self.guard = Some(name.into());
        self
    }

    /// Append one action.
    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Append several actions in order.
    pub fn actions(mut self, actions: impl IntoIterator<Item = Action>) -> Self {
        self.actions.extend(actions);
        self
    }

    /// Force internal semantics: when the target lies inside the source, the
    /// source itself is not exited and re-entered.
    pub fn internal(mut self) -> Self {
        self.internal = Some(true);
        self
    }

    /// Force external semantics even for a leading-dot target.
    pub fn external(mut self) -> Self {
        self.internal = Some(false);
        self
    }

    pub(crate) fn into_def(self, event: impl Into<String>) -> TransitionDef {
        let target = self.target.as_deref().map(Target::parse);
        // Leading-dot targets are internal unless overridden.
        let internal = self
            .internal
            .unwrap_or_else(|| target.as_ref().is_some_and(Target::is_dotted));
        TransitionDef {
            event: event.into(),
            guard: self.guard,
            actions: self.actions,
            target,
            internal,
        }
    }
}
