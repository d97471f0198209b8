//! Fluent construction of whole machines.

use crate::core::context::Context;
use crate::core::machine::Machine;
use crate::core::node::{NodeId, StateKind, StateNode};
use crate::registry::Registry;

use super::error::DefinitionError;
use super::state::StateBuilder;

/// Builder for a complete machine definition.
///
/// Top-level states form a compound root by default: exactly one is active,
/// starting with the first declared (or the one named by
/// [`initial`](Self::initial)). Call [`parallel`](Self::parallel) to make
/// every top-level state a concurrently active region instead.
///
/// [`build`](Self::build) validates the whole definition: every target must
/// resolve, every named guard, assigner, effect, and service must be
/// registered, compound states need a valid initial child, and history
/// states must sit directly under a compound parent.
///
/// # Example
///
/// ```rust
/// use statecraft::{MachineBuilder, StateBuilder, TransitionBuilder};
///
/// let machine = MachineBuilder::new("toggle")
///     .state(StateBuilder::atomic("off")
///         .on("FLIP", TransitionBuilder::new().target("on")))
///     .state(StateBuilder::atomic("on")
///         .on("FLIP", TransitionBuilder::new().target("off")))
///     .build()
///     .unwrap();
/// assert_eq!(machine.id(), "toggle");
/// ```
#[derive(Clone, Debug)]
pub struct MachineBuilder {
    id: String,
    root_kind: StateKind,
    initial: Option<String>,
    states: Vec<StateBuilder>,
    context: Context,
    registry: Registry,
}

impl MachineBuilder {
    /// Start a machine with the given identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            root_kind: StateKind::Compound,
            initial: None,
            states: Vec::new(),
            context: Context::new(),
            registry: Registry::new(),
        }
    }

    /// Make the top-level states parallel regions instead of alternatives.
    pub fn parallel(mut self) -> Self {
        self.root_kind = StateKind::Parallel;
        self
    }

    /// Name the top-level state entered first. Defaults to the first
    /// declared state. Ignored for parallel machines.
    pub fn initial(mut self, name: impl Into<String>) -> Self {
        self.initial = Some(name.into());
        self
    }

    /// Append a top-level state.
    pub fn state(mut self, state: StateBuilder) -> Self {
        self.states.push(state);
        self
    }

    /// Set the initial context.
    pub fn context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// Attach the registry of named guards, assigners, effects, and
    /// services.
    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Validate and produce the machine.
    pub fn build(self) -> Result<Machine, DefinitionError> {
        let root_id = NodeId::root();
        let children: Vec<StateNode> = self
            .states
            .into_iter()
            .map(|state| state.build(&root_id))
            .collect();
        let initial = match self.root_kind {
            StateKind::Compound => self
                .initial
                .or_else(|| children.first().map(|child| child.name.clone())),
            _ => None,
        };
        let root = StateNode {
            id: root_id,
            name: String::new(),
            kind: self.root_kind,
            initial,
            children,
            entry: Vec::new(),
            exit: Vec::new(),
            transitions: Vec::new(),
            always: Vec::new(),
            on_done: Vec::new(),
            invoke: None,
            tags: Default::default(),
        };
        Machine::new(self.id, root, self.context, self.registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TransitionBuilder;
    use crate::core::Event;
    use serde_json::json;

    #[test]
    fn empty_machines_are_rejected() {
        assert_eq!(
            MachineBuilder::new("empty").build().unwrap_err(),
            DefinitionError::NoStates
        );
    }

    #[test]
    fn first_state_is_the_default_initial() {
        let machine = MachineBuilder::new("m")
            .state(StateBuilder::atomic("a"))
            .state(StateBuilder::atomic("b"))
            .build()
            .unwrap();
        assert_eq!(machine.node(&NodeId::root()).unwrap().initial.as_deref(), Some("a"));
    }

    #[test]
    fn unregistered_names_are_rejected() {
        let err = MachineBuilder::new("m")
            .state(
                StateBuilder::atomic("a")
                    .on("GO", TransitionBuilder::new().guard("missing")),
            )
            .build()
            .unwrap_err();
        assert_eq!(err, DefinitionError::MissingGuard { name: "missing".into() });

        let err = MachineBuilder::new("m")
            .state(StateBuilder::atomic("a").entry(crate::core::Action::effect("missing")))
            .build()
            .unwrap_err();
        assert_eq!(err, DefinitionError::MissingEffect { name: "missing".into() });
    }

    #[test]
    fn history_must_live_under_a_compound_parent() {
        let err = MachineBuilder::new("m")
            .parallel()
            .state(StateBuilder::history("h"))
            .state(StateBuilder::atomic("a"))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            DefinitionError::HistoryPlacement { state: NodeId::from("h") }
        );
    }

    #[test]
    fn duplicate_invoke_ids_are_rejected() {
        let registry = Registry::new().service("svc", |_: &Context, _: &Event| {
            crate::interpreter::Service::task(|| Ok(json!(null)))
        });
        let err = MachineBuilder::new("m")
            .registry(registry)
            .state(StateBuilder::atomic("a").invoke(crate::builder::InvokeBuilder::new("svc")))
            .state(StateBuilder::atomic("b").invoke(crate::builder::InvokeBuilder::new("svc")))
            .build()
            .unwrap_err();
        assert_eq!(err, DefinitionError::DuplicateInvokeId { id: "svc".into() });
    }

    #[test]
    fn builder_context_becomes_the_initial_context() {
        let machine = MachineBuilder::new("m")
            .context(Context::new().with("volume", json!(5)))
            .state(StateBuilder::atomic("a"))
            .build()
            .unwrap();
        assert_eq!(machine.initial_context().get_i64("volume"), Some(5));
    }
}
