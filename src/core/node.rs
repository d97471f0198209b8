//! The immutable definition model: state nodes, identifiers, transitions.
//!
//! A machine definition is a tree of [`StateNode`]s addressed by
//! path-qualified [`NodeId`]s. Definitions are constructed once through the
//! builder, validated, and never mutated afterwards.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::action::Action;

/// Path-qualified state identifier: dot-separated segments from the machine
/// root. The root itself is the empty path.
///
/// # Example
///
/// ```rust
/// use statecraft::NodeId;
///
/// let playing = NodeId::from("player.ready.playing");
/// assert_eq!(playing.parent(), Some(NodeId::from("player.ready")));
/// assert!(NodeId::from("player").is_ancestor_of(&playing));
/// assert_eq!(playing.depth(), 3);
/// ```
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    /// The machine root (empty path).
    pub fn root() -> Self {
        Self(String::new())
    }

    /// The full dot-separated path.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the machine root.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// The id of a direct child.
    pub fn child(&self, name: &str) -> Self {
        if self.is_root() {
            Self(name.to_string())
        } else {
            Self(format!("{}.{name}", self.0))
        }
    }

    /// The parent id, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('.') {
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => Some(Self::root()),
        }
    }

    /// Path segments, outermost first. Empty for the root.
    pub fn segments(&self) -> Vec<&str> {
        if self.is_root() {
            Vec::new()
        } else {
            self.0.split('.').collect()
        }
    }

    /// The final path segment, or `""` for the root.
    pub fn name(&self) -> &str {
        if self.is_root() {
            ""
        } else {
            match self.0.rfind('.') {
                Some(idx) => &self.0[idx + 1..],
                None => &self.0,
            }
        }
    }

    /// Number of segments; the root has depth 0.
    pub fn depth(&self) -> usize {
        if self.is_root() {
            0
        } else {
            self.0.split('.').count()
        }
    }

    /// Whether this id is a proper ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &NodeId) -> bool {
        if self.is_root() {
            return !other.is_root();
        }
        other.0.len() > self.0.len()
            && other.0.starts_with(&self.0)
            && other.0.as_bytes()[self.0.len()] == b'.'
    }

    /// This id followed by its ancestors up to and including the root.
    pub fn self_and_ancestors(&self) -> Vec<NodeId> {
        let mut chain = vec![self.clone()];
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            chain.push(parent.clone());
            current = parent;
        }
        chain
    }
}

impl From<&str> for NodeId {
    fn from(path: &str) -> Self {
        Self(path.to_string())
    }
}

impl From<String> for NodeId {
    fn from(path: String) -> Self {
        Self(path)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str("(root)")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({:?})", self.0)
    }
}

/// The kind of a state node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateKind {
    /// Leaf state with no children.
    Atomic,
    /// Nested state with exactly one active child at a time.
    Compound,
    /// All children active simultaneously.
    Parallel,
    /// Terminal leaf; entering it may complete the enclosing region.
    Final,
    /// Pseudo-state restoring the region's remembered child on entry.
    History,
}

/// A transition target, written either as an absolute machine-wide path
/// (`"#player.ready"`) or relative to the source's enclosing scope
/// (`"playing"`, `".loading"`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    /// Resolved from the machine root.
    Absolute(NodeId),
    /// Resolved by scope search: the source's own children first (always, for
    /// leading-dot paths), then each enclosing ancestor's children.
    Relative(String),
}

impl Target {
    /// Parse the textual target notation.
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix('#') {
            Some(path) => Self::Absolute(NodeId::from(path)),
            None => Self::Relative(raw.to_string()),
        }
    }

    /// Whether this is a leading-dot relative target (own-children scope).
    pub fn is_dotted(&self) -> bool {
        matches!(self, Self::Relative(path) if path.starts_with('.'))
    }
}

impl From<&str> for Target {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absolute(id) => write!(f, "#{}", id.as_str()),
            Self::Relative(path) => f.write_str(path),
        }
    }
}

/// A single transition: event type, optional guard, ordered actions, optional
/// target. Targetless transitions fire actions without exiting or entering
/// anything; `internal` transitions whose target is a descendant of the source
/// do not exit the source itself.
#[derive(Clone, Debug)]
pub struct TransitionDef {
    /// The event type this transition answers. Empty for eventless and
    /// region-done transitions, which are stored in their own lists.
    pub event: String,
    /// Name of a registered guard, if any.
    pub guard: Option<String>,
    /// Actions executed between exit and entry actions, in declared order.
    pub actions: Vec<Action>,
    /// Transition target; `None` makes the transition internal and targetless.
    pub target: Option<Target>,
    /// Whether the source state stays active when the target is inside it.
    pub internal: bool,
}

/// Declaration of a child process started when the owning state is entered
/// and stopped when it is exited.
#[derive(Clone, Debug)]
pub struct InvokeDef {
    /// Routing id; also names the `done.invoke.{id}` / `error.invoke.{id}`
    /// completion events.
    pub id: String,
    /// Service factory name in the registry.
    pub src: String,
    /// Transitions taken when a task service resolves.
    pub on_done: Vec<TransitionDef>,
    /// Transitions taken when a task service fails.
    pub on_error: Vec<TransitionDef>,
}

/// One node of the definition tree.
#[derive(Clone, Debug)]
pub struct StateNode {
    /// Full path id, assigned during build.
    pub id: NodeId,
    /// Local name (final path segment).
    pub name: String,
    /// Node kind.
    pub kind: StateKind,
    /// Name of the default child; required for compound nodes.
    pub initial: Option<String>,
    /// Children in declaration order.
    pub children: Vec<StateNode>,
    /// Actions run on entry, before any transition continues deeper.
    pub entry: Vec<Action>,
    /// Actions run on exit, innermost first across the exit set.
    pub exit: Vec<Action>,
    /// Event transitions in declaration order; several may share an event
    /// type, in which case the first with a passing guard wins.
    pub transitions: Vec<TransitionDef>,
    /// Eventless transitions, re-checked after every committed microstep.
    pub always: Vec<TransitionDef>,
    /// Transitions answering this region's `done.state.{id}` event.
    pub on_done: Vec<TransitionDef>,
    /// Child process started on entry, if any.
    pub invoke: Option<InvokeDef>,
    /// Tags queried through `Snapshot::has_tag`.
    pub tags: BTreeSet<String>,
}

impl StateNode {
    /// Look up a direct child by name.
    pub fn child(&self, name: &str) -> Option<&StateNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Whether the node can hold an active child.
    pub fn is_leaf_kind(&self) -> bool {
        matches!(self.kind, StateKind::Atomic | StateKind::Final | StateKind::History)
    }
}
