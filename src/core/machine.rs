//! Validated machine definitions.
//!
//! A [`Machine`] pairs the definition tree with its initial context and the
//! registry of named behavior. Construction validates the whole tree up front
//! so the resolver can assume every target resolves and every referenced
//! guard, assigner, effect, and service exists.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::builder::DefinitionError;
use crate::core::action::Action;
use crate::core::context::Context;
use crate::core::node::{NodeId, StateKind, StateNode, Target, TransitionDef};
use crate::interpreter::Interpreter;
use crate::registry::Registry;

/// An immutable, validated statechart definition.
///
/// Built through [`MachineBuilder`](crate::MachineBuilder); once constructed
/// it is shared read-only between the resolver, snapshots, and the
/// interpreter.
pub struct Machine {
    id: String,
    root: StateNode,
    initial_context: Context,
    registry: Registry,
}

impl Machine {
    pub(crate) fn new(
        id: String,
        root: StateNode,
        initial_context: Context,
        registry: Registry,
    ) -> Result<Self, DefinitionError> {
        if root.children.is_empty() {
            return Err(DefinitionError::NoStates);
        }
        let machine = Self {
            id,
            root,
            initial_context,
            registry,
        };
        let mut invoke_ids = HashSet::new();
        machine.validate_node(&machine.root, &mut invoke_ids)?;
        Ok(machine)
    }

    /// The machine's identifier, used in log output.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The context the interpreter starts from.
    pub fn initial_context(&self) -> &Context {
        &self.initial_context
    }

    pub(crate) fn root(&self) -> &StateNode {
        &self.root
    }

    pub(crate) fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Look up a node by its path id. The root id resolves to the root node.
    pub fn node(&self, id: &NodeId) -> Option<&StateNode> {
        let mut node = &self.root;
        for segment in id.segments() {
            node = node.child(segment)?;
        }
        Some(node)
    }

    /// Resolve a transition target relative to its source state.
    ///
    /// Absolute targets resolve from the root. Leading-dot targets resolve
    /// against the source's own children only. Bare relative targets search
    /// the source's children first, then each enclosing ancestor's children
    /// outwards, taking the innermost match.
    pub(crate) fn resolve_target(&self, source: &NodeId, target: &Target) -> Option<NodeId> {
        match target {
            Target::Absolute(id) => self.node(id).map(|node| node.id.clone()),
            Target::Relative(path) => {
                if let Some(rest) = path.strip_prefix('.') {
                    let segments: Vec<&str> = rest.split('.').collect();
                    return self.lookup_from(source, &segments);
                }
                let segments: Vec<&str> = path.split('.').collect();
                source
                    .self_and_ancestors()
                    .into_iter()
                    .find_map(|scope| self.lookup_from(&scope, &segments))
            }
        }
    }

    fn lookup_from(&self, base: &NodeId, segments: &[&str]) -> Option<NodeId> {
        let mut node = self.node(base)?;
        for segment in segments {
            node = node.child(segment)?;
        }
        Some(node.id.clone())
    }

    /// Wrap the machine in an interpreter ready to be started.
    pub fn interpret(self) -> Interpreter {
        Interpreter::new(Arc::new(self))
    }

    fn validate_node(
        &self,
        node: &StateNode,
        invoke_ids: &mut HashSet<String>,
    ) -> Result<(), DefinitionError> {
        let mut seen = HashSet::new();
        for child in &node.children {
            if !seen.insert(child.name.as_str()) {
                return Err(DefinitionError::DuplicateChild {
                    state: node.id.clone(),
                    name: child.name.clone(),
                });
            }
        }

        match node.kind {
            StateKind::Compound => {
                let initial = node.initial.as_ref().ok_or_else(|| {
                    DefinitionError::MissingInitialChild {
                        state: node.id.clone(),
                    }
                })?;
                let child = node.child(initial).ok_or_else(|| {
                    DefinitionError::UnknownInitialChild {
                        state: node.id.clone(),
                        initial: initial.clone(),
                    }
                })?;
                if child.kind == StateKind::History {
                    return Err(DefinitionError::HistoryAsInitial {
                        state: node.id.clone(),
                    });
                }
            }
            StateKind::Parallel => {}
            StateKind::Atomic | StateKind::Final | StateKind::History => {
                if !node.children.is_empty() {
                    return Err(DefinitionError::UnexpectedChildren {
                        state: node.id.clone(),
                    });
                }
            }
        }

        if node.kind == StateKind::History {
            let owns_behavior = !node.transitions.is_empty()
                || !node.always.is_empty()
                || !node.on_done.is_empty()
                || node.invoke.is_some()
                || !node.entry.is_empty()
                || !node.exit.is_empty();
            if owns_behavior {
                return Err(DefinitionError::HistoryWithTransitions {
                    state: node.id.clone(),
                });
            }
        }
        for child in &node.children {
            if child.kind == StateKind::History && node.kind != StateKind::Compound {
                return Err(DefinitionError::HistoryPlacement {
                    state: child.id.clone(),
                });
            }
        }

        self.validate_actions(&node.entry)?;
        self.validate_actions(&node.exit)?;
        self.validate_transitions(&node.id, &node.transitions)?;
        self.validate_transitions(&node.id, &node.always)?;
        self.validate_transitions(&node.id, &node.on_done)?;

        if let Some(invoke) = &node.invoke {
            if !invoke_ids.insert(invoke.id.clone()) {
                return Err(DefinitionError::DuplicateInvokeId {
                    id: invoke.id.clone(),
                });
            }
            if !self.registry.has_service(&invoke.src) {
                return Err(DefinitionError::MissingService {
                    name: invoke.src.clone(),
                });
            }
            self.validate_transitions(&node.id, &invoke.on_done)?;
            self.validate_transitions(&node.id, &invoke.on_error)?;
        }

        for child in &node.children {
            self.validate_node(child, invoke_ids)?;
        }
        Ok(())
    }

    fn validate_transitions(
        &self,
        source: &NodeId,
        transitions: &[TransitionDef],
    ) -> Result<(), DefinitionError> {
        for transition in transitions {
            if let Some(guard) = &transition.guard {
                if !self.registry.has_guard(guard) {
                    return Err(DefinitionError::MissingGuard {
                        name: guard.clone(),
                    });
                }
            }
            self.validate_actions(&transition.actions)?;
            if let Some(target) = &transition.target {
                if self.resolve_target(source, target).is_none() {
                    return Err(DefinitionError::UnknownTarget {
                        from: source.clone(),
                        target: target.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn validate_actions(&self, actions: &[Action]) -> Result<(), DefinitionError> {
        for action in actions {
            match action {
                Action::Assign(fields) => {
                    for (_, assigner) in fields {
                        if let crate::core::action::Assigner::Compute(name) = assigner {
                            if !self.registry.has_compute(name) {
                                return Err(DefinitionError::MissingAssigner {
                                    name: name.clone(),
                                });
                            }
                        }
                    }
                }
                Action::Effect(name) => {
                    if !self.registry.has_effect(name) {
                        return Err(DefinitionError::MissingEffect { name: name.clone() });
                    }
                }
                Action::Raise(_) | Action::SendTo { .. } => {}
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("id", &self.id)
            .field("initial_context", &self.initial_context)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{MachineBuilder, StateBuilder, TransitionBuilder};

    fn player() -> Machine {
        MachineBuilder::new("player")
            .state(
                StateBuilder::compound("player")
                    .initial("loading")
                    .child(StateBuilder::atomic("loading"))
                    .child(
                        StateBuilder::compound("ready")
                            .initial("paused")
                            .child(StateBuilder::atomic("paused"))
                            .child(StateBuilder::atomic("playing")),
                    ),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn node_lookup_walks_segments() {
        let machine = player();
        assert!(machine.node(&NodeId::root()).is_some());
        assert_eq!(
            machine.node(&NodeId::from("player.ready.paused")).unwrap().name,
            "paused"
        );
        assert!(machine.node(&NodeId::from("player.gone")).is_none());
    }

    #[test]
    fn relative_targets_search_enclosing_scopes() {
        let machine = player();
        let source = NodeId::from("player.ready.paused");
        assert_eq!(
            machine.resolve_target(&source, &Target::parse("playing")),
            Some(NodeId::from("player.ready.playing"))
        );
        assert_eq!(
            machine.resolve_target(&source, &Target::parse("loading")),
            Some(NodeId::from("player.loading"))
        );
        assert_eq!(machine.resolve_target(&source, &Target::parse("missing")), None);
    }

    #[test]
    fn dotted_targets_stay_inside_the_source() {
        let machine = player();
        let ready = NodeId::from("player.ready");
        assert_eq!(
            machine.resolve_target(&ready, &Target::parse(".playing")),
            Some(NodeId::from("player.ready.playing"))
        );
        // A dotted target never escapes to siblings or ancestors.
        assert_eq!(machine.resolve_target(&ready, &Target::parse(".loading")), None);
    }

    #[test]
    fn absolute_targets_resolve_from_the_root() {
        let machine = player();
        let source = NodeId::from("player.ready.playing");
        assert_eq!(
            machine.resolve_target(&source, &Target::parse("#player.loading")),
            Some(NodeId::from("player.loading"))
        );
        assert_eq!(machine.resolve_target(&source, &Target::parse("#nowhere")), None);
    }

    #[test]
    fn unknown_transition_target_is_rejected() {
        let err = MachineBuilder::new("bad")
            .state(
                StateBuilder::atomic("a")
                    .on("GO", TransitionBuilder::new().target("nowhere")),
            )
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            DefinitionError::UnknownTarget {
                from: NodeId::from("a"),
                target: "nowhere".into(),
            }
        );
        assert_eq!(
            err.to_string(),
            "transition from `a` targets unknown state `nowhere`"
        );
    }
}
