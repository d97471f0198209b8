//! Fluent construction of state nodes and invocations.

use std::collections::BTreeSet;

use crate::core::action::Action;
use crate::core::node::{InvokeDef, NodeId, StateKind, StateNode};

use super::transition::TransitionBuilder;

/// Builder for one state node and its subtree.
///
/// # Example
///
/// ```rust
/// use statecraft::{StateBuilder, TransitionBuilder};
///
/// let _ready = StateBuilder::compound("ready")
///     .initial("paused")
///     .child(StateBuilder::atomic("paused")
///         .on("PLAY", TransitionBuilder::new().target("playing")))
///     .child(StateBuilder::atomic("playing")
///         .on("PAUSE", TransitionBuilder::new().target("paused")))
///     .child(StateBuilder::history("hist"));
/// ```
#[derive(Clone, Debug)]
pub struct StateBuilder {
    name: String,
    kind: StateKind,
    initial: Option<String>,
    children: Vec<StateBuilder>,
    entry: Vec<Action>,
    exit: Vec<Action>,
    transitions: Vec<(String, TransitionBuilder)>,
    always: Vec<TransitionBuilder>,
    on_done: Vec<TransitionBuilder>,
    invoke: Option<InvokeBuilder>,
    tags: BTreeSet<String>,
}

impl StateBuilder {
    fn with_kind(name: impl Into<String>, kind: StateKind) -> Self {
        Self {
            name: name.into(),
            kind,
            initial: None,
            children: Vec::new(),
            entry: Vec::new(),
            exit: Vec::new(),
            transitions: Vec::new(),
            always: Vec::new(),
            on_done: Vec::new(),
            invoke: None,
            tags: BTreeSet::new(),
        }
    }

    /// A leaf state.
    pub fn atomic(name: impl Into<String>) -> Self {
        Self::with_kind(name, StateKind::Atomic)
    }

    /// A nested state with one active child at a time. Requires
    /// [`initial`](Self::initial).
    pub fn compound(name: impl Into<String>) -> Self {
        Self::with_kind(name, StateKind::Compound)
    }

    /// A state whose children are all active simultaneously.
    pub fn parallel(name: impl Into<String>) -> Self {
        Self::with_kind(name, StateKind::Parallel)
    }

    /// A terminal leaf; entering it completes the enclosing region.
    pub fn final_state(name: impl Into<String>) -> Self {
        Self::with_kind(name, StateKind::Final)
    }

    /// A shallow-history pseudo-state. Targeting it re-enters the region's
    /// last active child, or the region default before any exit.
    pub fn history(name: impl Into<String>) -> Self {
        Self::with_kind(name, StateKind::History)
    }

    /// Name the default child entered when this compound state is entered
    /// directly.
    pub fn initial(mut self, name: impl Into<String>) -> Self {
        self.initial = Some(name.into());
        self
    }

    /// Append a child state.
    pub fn child(mut self, child: StateBuilder) -> Self {
        self.children.push(child);
        self
    }

    /// Append a transition answering the given event type. Several
    /// transitions may share an event type; the first whose guard passes
    /// wins.
    pub fn on(mut self, event: impl Into<String>, transition: TransitionBuilder) -> Self {
        self.transitions.push((event.into(), transition));
        self
    }

    /// Append an eventless transition, re-checked after every microstep
    /// while this state is active.
    pub fn always(mut self, transition: TransitionBuilder) -> Self {
        self.always.push(transition);
        self
    }

    /// Append a transition taken when this region reaches its final
    /// configuration.
    pub fn on_done(mut self, transition: TransitionBuilder) -> Self {
        self.on_done.push(transition);
        self
    }

    /// Append an entry action.
    pub fn entry(mut self, action: Action) -> Self {
        self.entry.push(action);
        self
    }

    /// Append an exit action.
    pub fn exit(mut self, action: Action) -> Self {
        self.exit.push(action);
        self
    }

    /// Declare a child process started whenever this state is entered.
    pub fn invoke(mut self, invoke: InvokeBuilder) -> Self {
        self.invoke = Some(invoke);
        self
    }

    /// Attach a tag queryable through snapshots.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub(crate) fn build(self, parent: &NodeId) -> StateNode {
        let id = parent.child(&self.name);
        let children = self
            .children
            .into_iter()
            .map(|child| child.build(&id))
            .collect();
        StateNode {
            name: self.name,
            kind: self.kind,
            initial: self.initial,
            children,
            entry: self.entry,
            exit: self.exit,
            transitions: self
                .transitions
                .into_iter()
                .map(|(event, t)| t.into_def(event))
                .collect(),
            always: self
                .always
                .into_iter()
                .map(|t| t.into_def(""))
                .collect(),
            on_done: self
                .on_done
                .into_iter()
                .map(|t| t.into_def(""))
                .collect(),
            invoke: self.invoke.map(|invoke| invoke.build()),
            tags: self.tags,
            id,
        }
    }
}

/// Builder for an invoked child process declaration.
///
/// The id defaults to the service name; give an explicit id when the same
/// service is invoked from more than one state.
#[derive(Clone, Debug)]
pub struct InvokeBuilder {
    src: String,
    id: Option<String>,
    on_done: Vec<TransitionBuilder>,
    on_error: Vec<TransitionBuilder>,
}

impl InvokeBuilder {
    /// Invoke the named registered service.
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            id: None,
            on_done: Vec::new(),
            on_error: Vec::new(),
        }
    }

    /// Override the invocation id used for routing and completion events.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Transition taken when a task service resolves. The completion value
    /// arrives in the event's `data` field.
    pub fn on_done(mut self, transition: TransitionBuilder) -> Self {
        self.on_done.push(transition);
        self
    }

    /// Transition taken when a task service fails.
    pub fn on_error(mut self, transition: TransitionBuilder) -> Self {
        self.on_error.push(transition);
        self
    }

    fn build(self) -> InvokeDef {
        InvokeDef {
            id: self.id.unwrap_or_else(|| self.src.clone()),
            src: self.src,
            on_done: self.on_done.into_iter().map(|t| t.into_def("")).collect(),
            on_error: self.on_error.into_iter().map(|t| t.into_def("")).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_assigns_path_ids_recursively() {
        let node = StateBuilder::compound("ready")
            .initial("paused")
            .child(StateBuilder::atomic("paused"))
            .child(StateBuilder::atomic("playing"))
            .build(&NodeId::from("player"));
        assert_eq!(node.id, NodeId::from("player.ready"));
        assert_eq!(node.children[0].id, NodeId::from("player.ready.paused"));
        assert_eq!(node.children[1].id, NodeId::from("player.ready.playing"));
    }

    #[test]
    fn invoke_id_defaults_to_the_service_name() {
        let node = StateBuilder::atomic("loading")
            .invoke(InvokeBuilder::new("loadSong"))
            .build(&NodeId::root());
        assert_eq!(node.invoke.as_ref().unwrap().id, "loadSong");

        let node = StateBuilder::atomic("loading")
            .invoke(InvokeBuilder::new("loadSong").id("firstLoad"))
            .build(&NodeId::root());
        assert_eq!(node.invoke.as_ref().unwrap().id, "firstLoad");
    }
}
