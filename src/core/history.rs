//! Remembered children for history pseudo-states.
//!
//! Every time a region with a history child is exited, the region's active
//! immediate child is recorded under the history node's id. Entering the
//! history node later restores that child instead of the region default
//! (shallow history: defaults re-expand below the restored child).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::node::NodeId;

/// Per-history-node remembered children.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryStore {
    records: BTreeMap<NodeId, NodeId>,
}

impl HistoryStore {
    /// An empty store; history targets fall back to region defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `child` as the last active immediate child for `history`.
    pub(crate) fn record(&mut self, history: NodeId, child: NodeId) {
        self.records.insert(history, child);
    }

    /// The remembered child for a history node, if the region was ever exited.
    pub fn remembered(&self, history: &NodeId) -> Option<&NodeId> {
        self.records.get(history)
    }

    /// Whether nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
