//! Immutable views of interpreter state.

use std::fmt;
use std::sync::Arc;

use crate::core::{resolver, Configuration, Context, Event, HistoryStore, Machine};

/// A frozen view of the machine at one committed step.
///
/// Snapshots are cheap to share and never change; the interpreter hands out a
/// fresh one per committed step and reuses the previous one when an event was
/// ignored.
pub struct Snapshot {
    machine: Arc<Machine>,
    configuration: Configuration,
    context: Context,
    history: HistoryStore,
    event: Event,
    changed: bool,
}

impl Snapshot {
    pub(crate) fn new(
        machine: Arc<Machine>,
        configuration: Configuration,
        context: Context,
        history: HistoryStore,
        event: Event,
        changed: bool,
    ) -> Self {
        Self {
            machine,
            configuration,
            context,
            history,
            event,
            changed,
        }
    }

    /// The active configuration.
    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// The extended state.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// The last event processed when this snapshot was taken.
    pub fn event(&self) -> &Event {
        &self.event
    }

    /// Whether the step that produced this snapshot changed anything.
    pub fn changed(&self) -> bool {
        self.changed
    }

    /// Whether the given path is active or an ancestor of an active state.
    pub fn matches(&self, path: &str) -> bool {
        self.configuration.matches(path)
    }

    /// Whether any active state carries the given tag.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.configuration.ids().any(|id| {
            self.machine
                .node(id)
                .is_some_and(|node| node.tags.contains(tag))
        })
    }

    /// Whether sending the event now would change anything. A dry run: no
    /// actions or effects execute, and a resolution failure reads as `false`.
    pub fn can(&self, event: &Event) -> bool {
        resolver::resolve(
            &self.machine,
            &self.configuration,
            &self.context,
            &self.history,
            event,
        )
        .map(|step| step.changed)
        .unwrap_or(false)
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("configuration", &self.configuration)
            .field("context", &self.context)
            .field("event", &self.event)
            .field("changed", &self.changed)
            .finish_non_exhaustive()
    }
}
