//! Events delivered to a state machine.
//!
//! An event is a named occurrence with an arbitrary structured payload.
//! Collaborators construct events by hand; the interpreter synthesizes a few
//! built-in types for lifecycle moments (initialization, eventless checks,
//! region completion, invoked-service completion).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::node::NodeId;

/// Event type emitted when the interpreter starts.
pub const INIT_EVENT: &str = "statecraft.init";

/// Pseudo-event type passed to guards and actions of eventless transitions.
pub const ALWAYS_EVENT: &str = "statecraft.always";

/// A named occurrence with a structured payload.
///
/// # Example
///
/// ```rust
/// use statecraft::Event;
/// use serde_json::json;
///
/// let event = Event::new("VOLUME").field("level", json!(7));
/// assert_eq!(event.event_type(), "VOLUME");
/// assert_eq!(event.get("level"), Some(&json!(7)));
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(flatten)]
    payload: Map<String, Value>,
}

impl Event {
    /// Create an event with an empty payload.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            payload: Map::new(),
        }
    }

    /// Create an event carrying the given payload object.
    pub fn with_payload(event_type: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
        }
    }

    /// Add a single payload field, builder-style.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// The event's type tag.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// The full payload object.
    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    /// Look up a top-level payload field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Look up an integer payload field.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.payload.get(key).and_then(Value::as_i64)
    }

    pub(crate) fn init() -> Self {
        Self::new(INIT_EVENT)
    }

    pub(crate) fn always() -> Self {
        Self::new(ALWAYS_EVENT)
    }

    /// The `done.state.{path}` event raised when a region reaches its final
    /// configuration.
    pub fn done_state(region: &NodeId) -> Self {
        Self::new(done_state_type(region))
    }

    /// The `done.invoke.{id}` event delivered when a task service resolves.
    pub fn done_invoke(id: &str, data: Value) -> Self {
        Self::new(done_invoke_type(id)).field("data", data)
    }

    /// The `error.invoke.{id}` event delivered when a task service fails.
    pub fn error_invoke(id: &str, data: Value) -> Self {
        Self::new(error_invoke_type(id)).field("data", data)
    }
}

/// Event type string for a region-done event.
pub(crate) fn done_state_type(region: &NodeId) -> String {
    format!("done.state.{}", region.as_str())
}

/// Event type string for an invoked-service completion.
pub(crate) fn done_invoke_type(id: &str) -> String {
    format!("done.invoke.{id}")
}

/// Event type string for an invoked-service failure.
pub(crate) fn error_invoke_type(id: &str) -> String {
    format!("error.invoke.{id}")
}
