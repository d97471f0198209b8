//! Pure transition resolution.
//!
//! [`resolve`] takes a committed snapshot of interpreter state plus one event
//! and computes the complete macrostep that event causes: the next
//! configuration, context, and history, plus every deferred side effect the
//! interpreter must replay after committing. Nothing observable happens while
//! resolving, so a failed step leaves the machine exactly where it was and
//! [`Snapshot::can`](crate::Snapshot::can) is a free dry run.
//!
//! A macrostep is a sequence of microsteps. The first microstep answers the
//! triggering event; follow-up microsteps consume queued region-done events
//! and re-check eventless transitions until the configuration is stable. The
//! sequence is capped at [`MAX_MICROSTEPS`] to turn livelocks into errors.

use std::collections::{BTreeSet, HashSet, VecDeque};

use serde_json::{Map, Value};
use thiserror::Error;

use crate::core::action::Action;
use crate::core::config::Configuration;
use crate::core::context::Context;
use crate::core::event::{
    done_invoke_type, done_state_type, error_invoke_type, Event, ALWAYS_EVENT,
};
use crate::core::executor::{self, ActionSink};
use crate::core::history::HistoryStore;
use crate::core::machine::Machine;
use crate::core::node::{NodeId, StateKind, StateNode, TransitionDef};
use crate::registry::BehaviorError;

/// Upper bound on microsteps per macrostep. A machine that keeps firing
/// eventless or done transitions past this limit is treated as livelocked and
/// the whole step is rejected with nothing committed.
pub const MAX_MICROSTEPS: usize = 64;

/// A named effect scheduled to run after the step commits, paired with the
/// event that was being processed when it was scheduled.
#[derive(Clone, Debug, PartialEq)]
pub struct EffectCall {
    /// Registry name of the effect.
    pub name: String,
    /// The event in flight when the effect was declared.
    pub event: Event,
}

/// Invoked-process lifecycle work produced by a step, applied by the
/// interpreter in order after the step commits.
#[derive(Clone, Debug, PartialEq)]
pub enum InvokeOp {
    /// Start the service declared on the given state, which was just entered.
    Start(NodeId),
    /// Stop the service declared on the given state, which was just exited.
    Stop(NodeId),
    /// Deliver an event to a running service by its invocation id.
    Route {
        /// The invocation id named by the `SendTo` action.
        service: String,
        /// The event to deliver.
        event: Event,
    },
}

/// The uncommitted outcome of one macrostep.
///
/// The interpreter commits `configuration`, `context`, and `history`
/// atomically, then enqueues `raised`, applies `invoke_ops`, and finally runs
/// `effects` against the committed state.
#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    /// The configuration after the step.
    pub configuration: Configuration,
    /// The context after the step.
    pub context: Context,
    /// History records after the step.
    pub history: HistoryStore,
    /// Whether any transition fired. When `false` the other fields are
    /// byte-identical to the inputs and the event was ignored.
    pub changed: bool,
    /// Deferred side effects in execution order.
    pub effects: Vec<EffectCall>,
    /// Events raised by actions, to be processed before external events.
    pub raised: Vec<Event>,
    /// Service lifecycle and routing work, in order.
    pub invoke_ops: Vec<InvokeOp>,
}

/// Why a step could not be resolved. No part of a failed step is committed.
#[derive(Clone, Debug, Error)]
pub enum StepError {
    /// A guard predicate returned an error.
    #[error("guard `{name}` failed: {source}")]
    Guard {
        /// Registry name of the guard.
        name: String,
        /// The underlying failure.
        source: BehaviorError,
    },
    /// A compute assigner returned an error.
    #[error("assigner `{name}` failed: {source}")]
    Assign {
        /// Registry name of the assigner.
        name: String,
        /// The underlying failure.
        source: BehaviorError,
    },
    /// The macrostep did not stabilize within [`MAX_MICROSTEPS`].
    #[error("configuration did not stabilize within {limit} microsteps")]
    InfiniteLoop {
        /// The microstep cap that was hit.
        limit: usize,
    },
    /// A transition target failed to resolve at runtime. Validation makes
    /// this unreachable for machines built through the builder.
    #[error("target `{target}` of a transition from `{from}` did not resolve")]
    UnresolvedTarget {
        /// The transition's source state.
        from: NodeId,
        /// The target notation as written.
        target: String,
    },
    /// A history state had neither a record nor a region default.
    #[error("history state `{0}` has no restorable target")]
    HistoryUnavailable(NodeId),
    /// A referenced behavior was missing from the registry. Validation makes
    /// this unreachable for machines built through the builder.
    #[error("behavior `{name}` is not registered")]
    MissingBehavior {
        /// The missing registry name.
        name: String,
    },
    /// A node id did not resolve against the definition tree.
    #[error("state `{0}` is not defined in the machine")]
    UnknownState(NodeId),
}

/// Compute the machine's first step: enter the root's defaults with the
/// initial context, then settle eventless transitions.
pub fn initial_step(machine: &Machine) -> Result<Step, StepError> {
    let mut builder = StepBuilder::new(
        machine,
        BTreeSet::new(),
        machine.initial_context().clone(),
        HistoryStore::new(),
    );
    let event = Event::init();
    let frozen = builder.context.clone();
    builder.enter_children(machine.root(), &frozen, &event)?;
    let patch = std::mem::take(&mut builder.patch);
    builder.context.apply(patch);
    builder.changed = true;
    builder.settle()?;
    Ok(builder.into_step())
}

/// Resolve the macrostep caused by one event against committed state.
///
/// Pure: equal inputs give equal outputs, and the inputs are never mutated.
pub fn resolve(
    machine: &Machine,
    configuration: &Configuration,
    context: &Context,
    history: &HistoryStore,
    event: &Event,
) -> Result<Step, StepError> {
    let mut builder = StepBuilder::new(
        machine,
        configuration.as_set().clone(),
        context.clone(),
        history.clone(),
    );
    if builder.microstep(event)? {
        builder.settle()?;
    }
    Ok(builder.into_step())
}

/// An exit/entry plan for one targeted transition.
struct Plan {
    /// The transition domain: the innermost state (or root) left untouched.
    domain: NodeId,
    /// The entry target after history resolution.
    target: NodeId,
    /// Active states that would be exited, from the pre-microstep
    /// configuration. Used for conflict filtering.
    exit: BTreeSet<NodeId>,
}

struct StepBuilder<'m> {
    machine: &'m Machine,
    active: BTreeSet<NodeId>,
    context: Context,
    history: HistoryStore,
    changed: bool,
    effects: Vec<EffectCall>,
    raised: Vec<Event>,
    ops: Vec<InvokeOp>,
    done_queue: VecDeque<Event>,
    done_emitted: HashSet<String>,
    patch: Map<String, Value>,
}

impl<'m> StepBuilder<'m> {
    fn new(
        machine: &'m Machine,
        active: BTreeSet<NodeId>,
        context: Context,
        history: HistoryStore,
    ) -> Self {
        Self {
            machine,
            active,
            context,
            history,
            changed: false,
            effects: Vec::new(),
            raised: Vec::new(),
            ops: Vec::new(),
            done_queue: VecDeque::new(),
            done_emitted: HashSet::new(),
            patch: Map::new(),
        }
    }

    fn into_step(self) -> Step {
        Step {
            configuration: Configuration::from_set(self.active),
            context: self.context,
            history: self.history,
            changed: self.changed,
            effects: self.effects,
            raised: self.raised,
            invoke_ops: self.ops,
        }
    }

    /// Drain queued done events and eventless transitions until quiescent.
    fn settle(&mut self) -> Result<(), StepError> {
        let mut microsteps = 1usize;
        loop {
            if microsteps >= MAX_MICROSTEPS {
                return Err(StepError::InfiniteLoop {
                    limit: MAX_MICROSTEPS,
                });
            }
            if let Some(done) = self.done_queue.pop_front() {
                microsteps += 1;
                self.microstep(&done)?;
                continue;
            }
            microsteps += 1;
            if !self.microstep(&Event::always())? {
                return Ok(());
            }
        }
    }

    /// Select, filter, and apply every transition the event enables.
    /// Returns whether any transition fired.
    fn microstep(&mut self, event: &Event) -> Result<bool, StepError> {
        let frozen = self.context.clone();
        let selected = self.select(&frozen, event)?;
        if selected.is_empty() {
            return Ok(false);
        }

        // Conflict filter: a transition whose exit set overlaps an
        // earlier-selected one is preempted.
        let mut kept: Vec<(NodeId, TransitionDef, Option<Plan>)> = Vec::new();
        let mut claimed_exits: BTreeSet<NodeId> = BTreeSet::new();
        for (source, transition) in selected {
            match self.plan(&source, &transition)? {
                Some(plan) => {
                    if !plan.exit.is_disjoint(&claimed_exits) {
                        continue;
                    }
                    claimed_exits.extend(plan.exit.iter().cloned());
                    kept.push((source, transition, Some(plan)));
                }
                None => kept.push((source, transition, None)),
            }
        }

        self.patch.clear();
        for (_, transition, plan) in &kept {
            self.apply(transition, plan.as_ref(), &frozen, event)?;
        }
        let patch = std::mem::take(&mut self.patch);
        self.context.apply(patch);
        self.changed = true;
        Ok(true)
    }

    /// Pick at most one transition per active branch.
    ///
    /// Events are offered to each active leaf's own node first, then bubble
    /// through its ancestors; the first node with a passing candidate claims
    /// the branch. Candidates on one node are tried in declaration order and
    /// guard evaluation short-circuits at the first pass.
    fn select(
        &self,
        frozen: &Context,
        event: &Event,
    ) -> Result<Vec<(NodeId, TransitionDef)>, StepError> {
        let machine = self.machine;
        let leaves: Vec<NodeId> = self
            .active
            .iter()
            .filter(|id| !self.active.iter().any(|other| id.is_ancestor_of(other)))
            .cloned()
            .collect();

        let mut selected = Vec::new();
        let mut claimed: HashSet<NodeId> = HashSet::new();
        for leaf in leaves {
            for node_id in leaf.self_and_ancestors() {
                if node_id.is_root() || claimed.contains(&node_id) {
                    break;
                }
                let node = machine
                    .node(&node_id)
                    .ok_or_else(|| StepError::UnknownState(node_id.clone()))?;
                let mut chosen = None;
                for transition in candidates(node, event) {
                    let enabled = match &transition.guard {
                        Some(name) => {
                            executor::eval_guard(machine.registry(), name, frozen, event)?
                        }
                        None => true,
                    };
                    if enabled {
                        chosen = Some(transition.clone());
                        break;
                    }
                }
                if let Some(transition) = chosen {
                    claimed.insert(node_id.clone());
                    selected.push((node_id, transition));
                    break;
                }
            }
        }
        Ok(selected)
    }

    /// Compute the domain, resolved target, and exit set of a targeted
    /// transition. Targetless transitions have no plan.
    fn plan(&self, source: &NodeId, transition: &TransitionDef) -> Result<Option<Plan>, StepError> {
        let machine = self.machine;
        let Some(target_ref) = &transition.target else {
            return Ok(None);
        };
        let mut target = machine.resolve_target(source, target_ref).ok_or_else(|| {
            StepError::UnresolvedTarget {
                from: source.clone(),
                target: target_ref.to_string(),
            }
        })?;

        // A history target stands in for the region's remembered child, or
        // the region default when nothing was recorded yet.
        let target_node = machine
            .node(&target)
            .ok_or_else(|| StepError::UnknownState(target.clone()))?;
        if target_node.kind == StateKind::History {
            target = match self.history.remembered(&target) {
                Some(child) => child.clone(),
                None => {
                    let parent = target
                        .parent()
                        .ok_or_else(|| StepError::HistoryUnavailable(target.clone()))?;
                    let region = machine
                        .node(&parent)
                        .ok_or_else(|| StepError::UnknownState(parent.clone()))?;
                    let initial = region
                        .initial
                        .as_ref()
                        .ok_or_else(|| StepError::HistoryUnavailable(target.clone()))?;
                    parent.child(initial)
                }
            };
        }

        let domain = if transition.internal
            && (source == &target || source.is_ancestor_of(&target))
        {
            source.clone()
        } else {
            self.transition_domain(source, &target)?
        };

        let exit: BTreeSet<NodeId> = self
            .active
            .iter()
            .filter(|id| domain.is_ancestor_of(id))
            .cloned()
            .collect();
        Ok(Some(Plan {
            domain,
            target,
            exit,
        }))
    }

    /// The innermost compound proper ancestor of the source that also
    /// properly contains the target. Parallel ancestors never serve as a
    /// domain, so cross-region transitions exit the whole parallel state.
    fn transition_domain(&self, source: &NodeId, target: &NodeId) -> Result<NodeId, StepError> {
        let machine = self.machine;
        for ancestor in source.self_and_ancestors().into_iter().skip(1) {
            if !ancestor.is_ancestor_of(target) {
                continue;
            }
            if ancestor.is_root() {
                return Ok(ancestor);
            }
            let node = machine
                .node(&ancestor)
                .ok_or_else(|| StepError::UnknownState(ancestor.clone()))?;
            if node.kind == StateKind::Compound {
                return Ok(ancestor);
            }
        }
        Ok(NodeId::root())
    }

    /// Exit, run transition actions, and enter for one kept transition.
    fn apply(
        &mut self,
        transition: &TransitionDef,
        plan: Option<&Plan>,
        frozen: &Context,
        event: &Event,
    ) -> Result<(), StepError> {
        let machine = self.machine;
        let Some(plan) = plan else {
            return self.run_actions(&transition.actions, frozen, event);
        };

        // Exit set recomputed against the current configuration, innermost
        // first.
        let mut exits: Vec<NodeId> = self
            .active
            .iter()
            .filter(|id| plan.domain.is_ancestor_of(id))
            .cloned()
            .collect();
        exits.sort_by(|a, b| {
            b.depth()
                .cmp(&a.depth())
                .then_with(|| b.as_str().cmp(a.as_str()))
        });

        // Record shallow history before anything is removed.
        for id in &exits {
            if let Some(parent) = id.parent() {
                if let Some(parent_node) = machine.node(&parent) {
                    for child in &parent_node.children {
                        if child.kind == StateKind::History {
                            self.history.record(child.id.clone(), id.clone());
                        }
                    }
                }
            }
        }

        for id in &exits {
            let node = machine
                .node(id)
                .ok_or_else(|| StepError::UnknownState(id.clone()))?;
            self.run_actions(&node.exit, frozen, event)?;
            if node.invoke.is_some() {
                self.ops.push(InvokeOp::Stop(id.clone()));
            }
            self.active.remove(id);
        }

        self.run_actions(&transition.actions, frozen, event)?;
        self.enter_from(&plan.domain, &plan.target, frozen, event)
    }

    /// Enter the chain from just below the domain down to the target, then
    /// expand the target's defaults.
    fn enter_from(
        &mut self,
        domain: &NodeId,
        target: &NodeId,
        frozen: &Context,
        event: &Event,
    ) -> Result<(), StepError> {
        if domain == target {
            let node = self
                .machine
                .node(domain)
                .ok_or_else(|| StepError::UnknownState(domain.clone()))?;
            return self.enter_children(node, frozen, event);
        }
        let next = child_on_path(domain, target);
        self.enter_node(&next, Some(target), frozen, event)
    }

    /// Enter one node: activate it, schedule its service, run its entry
    /// actions, then descend toward the target or expand defaults.
    fn enter_node(
        &mut self,
        id: &NodeId,
        toward: Option<&NodeId>,
        frozen: &Context,
        event: &Event,
    ) -> Result<(), StepError> {
        let machine = self.machine;
        let node = machine
            .node(id)
            .ok_or_else(|| StepError::UnknownState(id.clone()))?;
        self.active.insert(id.clone());
        if node.invoke.is_some() {
            self.ops.push(InvokeOp::Start(id.clone()));
        }
        self.run_actions(&node.entry, frozen, event)?;

        match toward {
            Some(target) if id.is_ancestor_of(target) => {
                let next = child_on_path(id, target);
                if node.kind == StateKind::Parallel {
                    for child in &node.children {
                        let toward = if child.id == next { Some(target) } else { None };
                        self.enter_node(&child.id, toward, frozen, event)?;
                    }
                } else {
                    self.enter_node(&next, Some(target), frozen, event)?;
                }
            }
            _ => self.enter_children(node, frozen, event)?,
        }
        Ok(())
    }

    /// Expand a node's defaults: the initial child of a compound, every
    /// region of a parallel, done bubbling for a final.
    fn enter_children(
        &mut self,
        node: &'m StateNode,
        frozen: &Context,
        event: &Event,
    ) -> Result<(), StepError> {
        match node.kind {
            StateKind::Compound => {
                let initial = node
                    .initial
                    .as_ref()
                    .ok_or_else(|| StepError::UnknownState(node.id.clone()))?;
                self.enter_node(&node.id.child(initial), None, frozen, event)
            }
            StateKind::Parallel => {
                for child in &node.children {
                    self.enter_node(&child.id, None, frozen, event)?;
                }
                Ok(())
            }
            StateKind::Final => self.bubble_done(&node.id),
            StateKind::Atomic | StateKind::History => Ok(()),
        }
    }

    /// Queue `done.state` events for every region completed by entering the
    /// given final state, innermost outwards.
    fn bubble_done(&mut self, final_id: &NodeId) -> Result<(), StepError> {
        let mut region = final_id.parent();
        while let Some(id) = region {
            if id.is_root() || !self.region_done(&id)? {
                break;
            }
            let event_type = done_state_type(&id);
            if self.done_emitted.insert(event_type) {
                self.done_queue.push_back(Event::done_state(&id));
            }
            region = id.parent();
        }
        Ok(())
    }

    /// Whether a region has reached its final configuration: a compound with
    /// an active final child, or a parallel whose regions are all done.
    fn region_done(&self, id: &NodeId) -> Result<bool, StepError> {
        let node = self
            .machine
            .node(id)
            .ok_or_else(|| StepError::UnknownState(id.clone()))?;
        match node.kind {
            StateKind::Final => Ok(true),
            StateKind::Atomic | StateKind::History => Ok(false),
            StateKind::Compound => Ok(node
                .children
                .iter()
                .any(|child| child.kind == StateKind::Final && self.active.contains(&child.id))),
            StateKind::Parallel => {
                for child in &node.children {
                    if !self.region_done(&child.id)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }

    fn run_actions(
        &mut self,
        actions: &[Action],
        frozen: &Context,
        event: &Event,
    ) -> Result<(), StepError> {
        let machine = self.machine;
        executor::run_actions(
            machine.registry(),
            actions,
            frozen,
            event,
            &mut ActionSink {
                patch: &mut self.patch,
                raised: &mut self.raised,
                effects: &mut self.effects,
                ops: &mut self.ops,
            },
        )
    }
}

/// The immediate child of `ancestor` on the path down to `descendant`.
fn child_on_path(ancestor: &NodeId, descendant: &NodeId) -> NodeId {
    let segments = descendant.segments();
    ancestor.child(segments[ancestor.depth()])
}

/// Transitions on one node that answer the event, in declaration order:
/// regular transitions first, then region-done handlers, then invoked-service
/// completion handlers.
fn candidates<'n>(node: &'n StateNode, event: &Event) -> Vec<&'n TransitionDef> {
    let event_type = event.event_type();
    if event_type == ALWAYS_EVENT {
        return node.always.iter().collect();
    }
    let mut out: Vec<&TransitionDef> = node
        .transitions
        .iter()
        .filter(|t| t.event == event_type)
        .collect();
    if event_type == done_state_type(&node.id) {
        out.extend(node.on_done.iter());
    }
    if let Some(invoke) = &node.invoke {
        if event_type == done_invoke_type(&invoke.id) {
            out.extend(invoke.on_done.iter());
        } else if event_type == error_invoke_type(&invoke.id) {
            out.extend(invoke.on_error.iter());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{MachineBuilder, StateBuilder, TransitionBuilder};
    use crate::core::action::Assigner;
    use crate::registry::Registry;
    use serde_json::json;

    fn toggle() -> Machine {
        MachineBuilder::new("toggle")
            .state(StateBuilder::atomic("off").on("FLIP", TransitionBuilder::new().target("on")))
            .state(StateBuilder::atomic("on").on("FLIP", TransitionBuilder::new().target("off")))
            .build()
            .unwrap()
    }

    fn step(machine: &Machine, step: &Step, event: Event) -> Result<Step, StepError> {
        resolve(
            machine,
            &step.configuration,
            &step.context,
            &step.history,
            &event,
        )
    }

    #[test]
    fn initial_step_enters_the_default_leaf() {
        let machine = toggle();
        let first = initial_step(&machine).unwrap();
        assert!(first.changed);
        assert!(first.configuration.matches("off"));
        assert!(!first.configuration.matches("on"));
    }

    #[test]
    fn unmatched_events_change_nothing() {
        let machine = toggle();
        let first = initial_step(&machine).unwrap();
        let next = step(&machine, &first, Event::new("NOPE")).unwrap();
        assert!(!next.changed);
        assert_eq!(next.configuration, first.configuration);
        assert_eq!(next.context, first.context);
        assert!(next.effects.is_empty());
        assert!(next.invoke_ops.is_empty());
    }

    #[test]
    fn resolve_is_pure() {
        let machine = toggle();
        let first = initial_step(&machine).unwrap();
        let a = step(&machine, &first, Event::new("FLIP")).unwrap();
        let b = step(&machine, &first, Event::new("FLIP")).unwrap();
        assert_eq!(a, b);
        // The input step was not consumed or mutated.
        assert!(first.configuration.matches("off"));
    }

    #[test]
    fn first_passing_guard_wins_in_declaration_order() {
        let registry = Registry::new()
            .guard("never", |_: &Context, _: &Event| false)
            .guard("always", |_: &Context, _: &Event| true);
        let machine = MachineBuilder::new("guarded")
            .registry(registry)
            .state(
                StateBuilder::atomic("a")
                    .on("GO", TransitionBuilder::new().guard("never").target("b"))
                    .on("GO", TransitionBuilder::new().guard("always").target("c"))
                    .on("GO", TransitionBuilder::new().target("b")),
            )
            .state(StateBuilder::atomic("b"))
            .state(StateBuilder::atomic("c"))
            .build()
            .unwrap();
        let first = initial_step(&machine).unwrap();
        let next = step(&machine, &first, Event::new("GO")).unwrap();
        assert!(next.configuration.matches("c"));
    }

    #[test]
    fn targetless_transitions_fire_actions_without_moving() {
        let machine = MachineBuilder::new("counter")
            .context(Context::new().with("n", json!(0)))
            .registry(Registry::new().compute("bump", |ctx: &Context, _: &Event| {
                json!(ctx.get_i64("n").unwrap_or(0) + 1)
            }))
            .state(StateBuilder::atomic("idle").on(
                "TICK",
                TransitionBuilder::new().action(Action::assign([("n", Assigner::compute("bump"))])),
            ))
            .build()
            .unwrap();
        let first = initial_step(&machine).unwrap();
        let next = step(&machine, &first, Event::new("TICK")).unwrap();
        assert!(next.changed);
        assert_eq!(next.configuration, first.configuration);
        assert_eq!(next.context.get_i64("n"), Some(1));
    }

    #[test]
    fn eventless_transitions_settle_within_the_same_step() {
        let registry = Registry::new().guard("overflowed", |ctx: &Context, _: &Event| {
            ctx.get_i64("n").unwrap_or(0) >= 3
        });
        let machine = MachineBuilder::new("chain")
            .context(Context::new().with("n", json!(0)))
            .registry(registry)
            .state(
                StateBuilder::atomic("counting")
                    .on("SET", TransitionBuilder::new().action(Action::assign_value("n", json!(3))))
                    .always(TransitionBuilder::new().guard("overflowed").target("full")),
            )
            .state(StateBuilder::atomic("full"))
            .build()
            .unwrap();
        let first = initial_step(&machine).unwrap();
        assert!(first.configuration.matches("counting"));
        let next = step(&machine, &first, Event::new("SET")).unwrap();
        assert!(next.configuration.matches("full"));
    }

    #[test]
    fn livelocked_machines_are_rejected_whole() {
        let machine = MachineBuilder::new("spin")
            .state(StateBuilder::atomic("a").always(TransitionBuilder::new().target("b").external()))
            .state(StateBuilder::atomic("b").always(TransitionBuilder::new().target("a").external()))
            .build()
            .unwrap();
        let err = initial_step(&machine).unwrap_err();
        assert!(matches!(err, StepError::InfiniteLoop { limit } if limit == MAX_MICROSTEPS));
    }

    #[test]
    fn internal_transitions_keep_the_source_active() {
        let machine = MachineBuilder::new("nested")
            .state(
                StateBuilder::compound("outer")
                    .initial("one")
                    .entry(Action::assign_value("entered", json!(true)))
                    .child(StateBuilder::atomic("one"))
                    .child(StateBuilder::atomic("two"))
                    .on("HOP", TransitionBuilder::new().target(".two")),
            )
            .build()
            .unwrap();
        let first = initial_step(&machine).unwrap();
        assert!(first.configuration.matches("outer.one"));
        let next = step(&machine, &first, Event::new("HOP")).unwrap();
        assert!(next.configuration.matches("outer.two"));
        // The dotted target is internal: outer's entry actions did not rerun.
        assert_eq!(next.context.get("entered"), first.context.get("entered"));
    }

    #[test]
    fn final_children_raise_region_done() {
        let machine = MachineBuilder::new("quiz")
            .state(
                StateBuilder::compound("quiz")
                    .initial("asking")
                    .child(StateBuilder::atomic("asking").on(
                        "ANSWER",
                        TransitionBuilder::new().target("solved"),
                    ))
                    .child(StateBuilder::final_state("solved"))
                    .on_done(TransitionBuilder::new().target("review").external()),
            )
            .state(StateBuilder::atomic("review"))
            .build()
            .unwrap();
        let first = initial_step(&machine).unwrap();
        let next = step(&machine, &first, Event::new("ANSWER")).unwrap();
        assert!(next.configuration.matches("review"));
    }

    #[test]
    fn history_restores_the_remembered_child() {
        let machine = MachineBuilder::new("resume")
            .state(
                StateBuilder::compound("work")
                    .initial("draft")
                    .child(StateBuilder::atomic("draft").on(
                        "EDIT",
                        TransitionBuilder::new().target("editing"),
                    ))
                    .child(StateBuilder::atomic("editing"))
                    .child(StateBuilder::history("recent"))
                    .on("LEAVE", TransitionBuilder::new().target("away")),
            )
            .state(StateBuilder::atomic("away").on(
                "BACK",
                TransitionBuilder::new().target("work.recent"),
            ))
            .build()
            .unwrap();
        let first = initial_step(&machine).unwrap();
        let editing = step(&machine, &first, Event::new("EDIT")).unwrap();
        let away = step(&machine, &editing, Event::new("LEAVE")).unwrap();
        assert!(away.configuration.matches("away"));
        let back = step(&machine, &away, Event::new("BACK")).unwrap();
        assert!(back.configuration.matches("work.editing"));
    }

    #[test]
    fn history_falls_back_to_the_region_default() {
        let machine = MachineBuilder::new("resume")
            .state(
                StateBuilder::compound("work")
                    .initial("draft")
                    .child(StateBuilder::atomic("draft"))
                    .child(StateBuilder::atomic("editing"))
                    .child(StateBuilder::history("recent")),
            )
            .state(StateBuilder::atomic("away").on(
                "BACK",
                TransitionBuilder::new().target("work.recent"),
            ))
            .initial("away")
            .build()
            .unwrap();
        let first = initial_step(&machine).unwrap();
        assert!(first.configuration.matches("away"));
        let back = step(&machine, &first, Event::new("BACK")).unwrap();
        assert!(back.configuration.matches("work.draft"));
    }

    #[test]
    fn parallel_regions_enter_together_and_transition_independently() {
        let machine = MachineBuilder::new("deck")
            .parallel()
            .state(
                StateBuilder::compound("player")
                    .initial("paused")
                    .child(StateBuilder::atomic("paused").on(
                        "PLAY",
                        TransitionBuilder::new().target("playing"),
                    ))
                    .child(StateBuilder::atomic("playing")),
            )
            .state(
                StateBuilder::compound("volume")
                    .initial("unmuted")
                    .child(StateBuilder::atomic("unmuted").on(
                        "MUTE",
                        TransitionBuilder::new().target("muted"),
                    ))
                    .child(StateBuilder::atomic("muted")),
            )
            .build()
            .unwrap();
        let first = initial_step(&machine).unwrap();
        assert!(first.configuration.matches("player.paused"));
        assert!(first.configuration.matches("volume.unmuted"));

        let playing = step(&machine, &first, Event::new("PLAY")).unwrap();
        assert!(playing.configuration.matches("player.playing"));
        // The sibling region was untouched.
        assert!(playing.configuration.matches("volume.unmuted"));
    }

    #[test]
    fn raised_events_are_returned_not_consumed() {
        let machine = MachineBuilder::new("raiser")
            .state(
                StateBuilder::atomic("a")
                    .on("DISLIKE", TransitionBuilder::new().action(Action::raise("SKIP")))
                    .on("SKIP", TransitionBuilder::new().target("b")),
            )
            .state(StateBuilder::atomic("b"))
            .build()
            .unwrap();
        let first = initial_step(&machine).unwrap();
        let next = step(&machine, &first, Event::new("DISLIKE")).unwrap();
        assert_eq!(next.raised, vec![Event::new("SKIP")]);
        // Still in `a`; the raised event is the caller's to process.
        assert!(next.configuration.matches("a"));
    }

    #[test]
    fn guard_failure_aborts_the_step() {
        let registry = Registry::new().try_guard("broken", |_: &Context, _: &Event| {
            Err(BehaviorError::new("boom"))
        });
        let machine = MachineBuilder::new("fragile")
            .registry(registry)
            .state(
                StateBuilder::atomic("a")
                    .on("GO", TransitionBuilder::new().guard("broken").target("b")),
            )
            .state(StateBuilder::atomic("b"))
            .build()
            .unwrap();
        let first = initial_step(&machine).unwrap();
        let err = step(&machine, &first, Event::new("GO")).unwrap_err();
        assert!(matches!(err, StepError::Guard { name, .. } if name == "broken"));
    }
}
