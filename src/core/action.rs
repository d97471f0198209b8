//! Actions executed while taking transitions.
//!
//! Actions are a closed set of variants rather than arbitrary closures:
//! `Assign` patches the context, `Raise` enqueues a synthetic event with
//! priority over external sends, `Effect` runs a named opaque side effect from
//! the registry, and `SendTo` routes an event to a running invoked service.
//! Keeping them as data lets the resolver plan a whole step without executing
//! anything.

use std::fmt;

use serde_json::Value;

use super::event::Event;

/// One field of an assign action: either a literal value or the name of a
/// registered compute function of `(context, event)`.
#[derive(Clone)]
pub enum Assigner {
    /// A literal JSON value.
    Value(Value),
    /// A named compute function resolved against the registry.
    Compute(String),
}

impl Assigner {
    /// Literal assigner.
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }

    /// Named compute assigner.
    pub fn compute(name: impl Into<String>) -> Self {
        Self::Compute(name.into())
    }
}

impl fmt::Debug for Assigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "Value({v})"),
            Self::Compute(name) => write!(f, "Compute({name:?})"),
        }
    }
}

/// An action reference attached to a transition or to state entry/exit.
#[derive(Clone, Debug)]
pub enum Action {
    /// Merge a computed patch into the context. All assigners in one
    /// microstep observe the pre-update context; the merged patch is applied
    /// atomically at microstep end.
    Assign(Vec<(String, Assigner)>),
    /// Enqueue a synthetic event, processed after the current event settles
    /// and before any externally queued event.
    Raise(Event),
    /// Run a named side effect from the registry, after the step commits.
    Effect(String),
    /// Route an event to a running invoked service by its declared id.
    SendTo {
        /// The invocation id declared by the target service.
        service: String,
        /// The event delivered to the service's receive channel.
        event: Event,
    },
}

impl Action {
    /// Assign several fields at once.
    pub fn assign<K>(fields: impl IntoIterator<Item = (K, Assigner)>) -> Self
    where
        K: Into<String>,
    {
        Self::Assign(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Assign a single literal field.
    pub fn assign_value(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Assign(vec![(field.into(), Assigner::value(value))])
    }

    /// Raise a synthetic event by type.
    pub fn raise(event_type: impl Into<String>) -> Self {
        Self::Raise(Event::new(event_type))
    }

    /// Run a named effect.
    pub fn effect(name: impl Into<String>) -> Self {
        Self::Effect(name.into())
    }

    /// Route an event to an invoked service.
    pub fn send_to(service: impl Into<String>, event: Event) -> Self {
        Self::SendTo {
            service: service.into(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn constructors_build_expected_variants() {
        match Action::assign_value("volume", json!(7)) {
            Action::Assign(fields) => {
                assert_eq!(fields.len(), 1);
                assert_eq!(fields[0].0, "volume");
                assert!(matches!(fields[0].1, Assigner::Value(_)));
            }
            other => panic!("unexpected action: {other:?}"),
        }

        match Action::raise("SKIP") {
            Action::Raise(event) => assert_eq!(event.event_type(), "SKIP"),
            other => panic!("unexpected action: {other:?}"),
        }

        match Action::send_to("audio", Event::new("PLAY")) {
            Action::SendTo { service, event } => {
                assert_eq!(service, "audio");
                assert_eq!(event.event_type(), "PLAY");
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn assign_accepts_mixed_assigners() {
        let action = Action::assign([
            ("title", Assigner::compute("songTitle")),
            ("elapsed", Assigner::value(json!(0))),
        ]);
        match action {
            Action::Assign(fields) => assert_eq!(fields.len(), 2),
            other => panic!("unexpected action: {other:?}"),
        }
    }
}
