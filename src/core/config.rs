//! The active configuration: which state nodes are currently entered.
//!
//! A configuration is a slice of the definition tree. For every active node,
//! either it is a leaf or its required children are active too (the single
//! active child of a compound node, all children of a parallel node).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::node::NodeId;

/// The set of active state-node ids.
///
/// # Example
///
/// ```rust
/// use statecraft::{Configuration, NodeId};
///
/// let config = Configuration::from_ids(["player", "player.ready", "player.ready.playing"]);
/// assert!(config.matches("player.ready"));
/// assert!(config.matches("player.ready.playing"));
/// assert!(!config.matches("player.loading"));
/// let leaves: Vec<&str> = config.leaves().iter().map(|id| id.as_str()).collect();
/// assert_eq!(leaves, vec!["player.ready.playing"]);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration {
    active: BTreeSet<NodeId>,
}

impl Configuration {
    /// An empty configuration (interpreter not yet started).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a configuration from path strings. Primarily for tests and
    /// assertions; the resolver constructs configurations internally.
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            active: ids.into_iter().map(|s| NodeId::from(s.as_ref())).collect(),
        }
    }

    pub(crate) fn from_set(active: BTreeSet<NodeId>) -> Self {
        Self { active }
    }

    pub(crate) fn as_set(&self) -> &BTreeSet<NodeId> {
        &self.active
    }

    /// Whether the exact node id is active.
    pub fn contains(&self, id: &NodeId) -> bool {
        self.active.contains(id)
    }

    /// Whether the given path is active or an ancestor of an active node.
    /// Mirrors `state.matches(...)` checks collaborators use for rendering.
    pub fn matches(&self, path: &str) -> bool {
        let id = NodeId::from(path);
        self.active
            .iter()
            .any(|active| *active == id || id.is_ancestor_of(active))
    }

    /// Active node ids in path order.
    pub fn ids(&self) -> impl Iterator<Item = &NodeId> {
        self.active.iter()
    }

    /// Active nodes with no active descendant, the "innermost" slice.
    pub fn leaves(&self) -> Vec<&NodeId> {
        self.active
            .iter()
            .filter(|id| !self.active.iter().any(|other| id.is_ancestor_of(other)))
            .collect()
    }

    /// Whether nothing is active.
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_honors_ancestry() {
        let config = Configuration::from_ids(["player", "player.ready", "player.ready.paused"]);
        assert!(config.matches("player"));
        assert!(config.matches("player.ready.paused"));
        assert!(!config.matches("player.ready.playing"));
        assert!(!config.matches("volume"));
    }

    #[test]
    fn leaves_drop_active_ancestors() {
        let config = Configuration::from_ids([
            "player",
            "player.ready",
            "player.ready.playing",
            "volume",
            "volume.unmuted",
        ]);
        let leaves: Vec<&str> = config.leaves().iter().map(|id| id.as_str()).collect();
        assert_eq!(leaves, vec!["player.ready.playing", "volume.unmuted"]);
    }

    #[test]
    fn empty_configuration_matches_nothing() {
        let config = Configuration::empty();
        assert!(config.is_empty());
        assert!(!config.matches("player"));
        assert!(config.leaves().is_empty());
    }
}
