//! Guard evaluation and action execution against a planning sink.
//!
//! Nothing here touches live state. Actions write into an [`ActionSink`]
//! owned by the resolver: assigns accumulate a context patch, raises and
//! effects are collected for later, service routing becomes a queued
//! operation. The interpreter replays the collected work only after the whole
//! step has committed.

use serde_json::{Map, Value};

use crate::core::action::{Action, Assigner};
use crate::core::context::Context;
use crate::core::event::Event;
use crate::core::resolver::{EffectCall, InvokeOp, StepError};
use crate::registry::Registry;

/// Mutable collection points for one microstep's planned work.
pub(crate) struct ActionSink<'a> {
    pub patch: &'a mut Map<String, Value>,
    pub raised: &'a mut Vec<Event>,
    pub effects: &'a mut Vec<EffectCall>,
    pub ops: &'a mut Vec<InvokeOp>,
}

/// Evaluate a named guard against the frozen context.
pub(crate) fn eval_guard(
    registry: &Registry,
    name: &str,
    context: &Context,
    event: &Event,
) -> Result<bool, StepError> {
    let guard = registry
        .get_guard(name)
        .ok_or_else(|| StepError::MissingBehavior {
            name: name.to_string(),
        })?;
    guard.check(context, event).map_err(|source| StepError::Guard {
        name: name.to_string(),
        source,
    })
}

/// Run a list of actions in declared order.
///
/// Every assigner observes the same frozen context, regardless of earlier
/// assigns in the microstep; later writes to the same field overwrite earlier
/// ones in the patch.
pub(crate) fn run_actions(
    registry: &Registry,
    actions: &[Action],
    context: &Context,
    event: &Event,
    sink: &mut ActionSink<'_>,
) -> Result<(), StepError> {
    for action in actions {
        match action {
            Action::Assign(fields) => {
                for (key, assigner) in fields {
                    let value = match assigner {
                        Assigner::Value(value) => value.clone(),
                        Assigner::Compute(name) => {
                            let compute = registry.get_compute(name).ok_or_else(|| {
                                StepError::MissingBehavior {
                                    name: name.clone(),
                                }
                            })?;
                            compute(context, event).map_err(|source| StepError::Assign {
                                name: name.clone(),
                                source,
                            })?
                        }
                    };
                    sink.patch.insert(key.clone(), value);
                }
            }
            Action::Raise(raised) => sink.raised.push(raised.clone()),
            Action::Effect(name) => sink.effects.push(EffectCall {
                name: name.clone(),
                event: event.clone(),
            }),
            Action::SendTo { service, event: payload } => sink.ops.push(InvokeOp::Route {
                service: service.clone(),
                event: payload.clone(),
            }),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sink_parts() -> (Map<String, Value>, Vec<Event>, Vec<EffectCall>, Vec<InvokeOp>) {
        (Map::new(), Vec::new(), Vec::new(), Vec::new())
    }

    #[test]
    fn assigners_observe_the_frozen_context() {
        let registry = Registry::new().compute("bump", |ctx: &Context, _: &Event| {
            json!(ctx.get_i64("n").unwrap_or(0) + 1)
        });
        let context = Context::new().with("n", json!(1));
        let event = Event::new("X");
        let actions = vec![
            Action::assign([("n", Assigner::compute("bump"))]),
            Action::assign([("n", Assigner::compute("bump"))]),
        ];

        let (mut patch, mut raised, mut effects, mut ops) = sink_parts();
        let mut sink = ActionSink {
            patch: &mut patch,
            raised: &mut raised,
            effects: &mut effects,
            ops: &mut ops,
        };
        run_actions(&registry, &actions, &context, &event, &mut sink).unwrap();

        // Both computes read n == 1; the second overwrite still yields 2.
        assert_eq!(patch.get("n"), Some(&json!(2)));
    }

    #[test]
    fn raise_effect_and_route_are_collected_not_executed() {
        let registry = Registry::new().effect("logSkip", |_: &Context, _: &Event| {
            panic!("effects must not run during planning");
        });
        let context = Context::new();
        let event = Event::new("DISLIKE");
        let actions = vec![
            Action::raise("SKIP"),
            Action::effect("logSkip"),
            Action::send_to("audio", Event::new("PAUSE")),
        ];

        let (mut patch, mut raised, mut effects, mut ops) = sink_parts();
        let mut sink = ActionSink {
            patch: &mut patch,
            raised: &mut raised,
            effects: &mut effects,
            ops: &mut ops,
        };
        run_actions(&registry, &actions, &context, &event, &mut sink).unwrap();

        assert_eq!(raised, vec![Event::new("SKIP")]);
        assert_eq!(effects.len(), 1);
        assert_eq!(effects[0].name, "logSkip");
        assert_eq!(effects[0].event, event);
        assert!(matches!(&ops[0], InvokeOp::Route { service, .. } if service == "audio"));
    }

    #[test]
    fn failing_assigner_aborts_with_its_name() {
        let registry = Registry::new().try_compute("explode", |_: &Context, _: &Event| {
            Err(crate::registry::BehaviorError::new("nope"))
        });
        let context = Context::new();
        let event = Event::new("X");
        let actions = vec![Action::assign([("x", Assigner::compute("explode"))])];

        let (mut patch, mut raised, mut effects, mut ops) = sink_parts();
        let mut sink = ActionSink {
            patch: &mut patch,
            raised: &mut raised,
            effects: &mut effects,
            ops: &mut ops,
        };
        let err = run_actions(&registry, &actions, &context, &event, &mut sink).unwrap_err();
        assert!(matches!(err, StepError::Assign { name, .. } if name == "explode"));
    }

    #[test]
    fn guard_errors_carry_the_guard_name() {
        let registry = Registry::new().try_guard("broken", |_: &Context, _: &Event| {
            Err(crate::registry::BehaviorError::new("bad input"))
        });
        let err = eval_guard(&registry, "broken", &Context::new(), &Event::new("X")).unwrap_err();
        assert!(matches!(err, StepError::Guard { name, .. } if name == "broken"));
        assert!(matches!(
            eval_guard(&registry, "absent", &Context::new(), &Event::new("X")),
            Err(StepError::MissingBehavior { .. })
        ));
    }
}
