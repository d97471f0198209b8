//! Statechart definition and interpretation.
//!
//! `statecraft` models hierarchical state machines: nested compound states,
//! parallel regions, final states, shallow history, guarded transitions,
//! eventless transitions, raised events, and invoked child processes. The
//! crate is split along a strict seam:
//!
//! - [`core`] is pure. A [`Machine`] is an immutable, validated definition;
//!   [`core::resolve`] turns committed state plus one event into an
//!   uncommitted [`core::Step`] without executing anything observable.
//! - [`interpreter`] is the imperative shell. It owns queues, subscribers,
//!   and running services, commits steps atomically, and replays deferred
//!   effects after each commit.
//!
//! Domain behavior never lives in the definition itself: guards, assigners,
//! effects, and services are registered by name in a [`Registry`] and
//! validated for completeness when the machine is built.
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use statecraft::{
//!     Action, Context, Event, MachineBuilder, Registry, StateBuilder, TransitionBuilder,
//! };
//!
//! let registry = Registry::new()
//!     .guard("volumeWithinRange", |_ctx: &Context, event: &Event| {
//!         event.get_i64("level").map(|l| (0..=10).contains(&l)).unwrap_or(false)
//!     })
//!     .compute("assignVolume", |_ctx: &Context, event: &Event| {
//!         event.get("level").cloned().unwrap_or(json!(null))
//!     });
//!
//! let machine = MachineBuilder::new("player")
//!     .context(Context::new().with("volume", json!(5)))
//!     .registry(registry)
//!     .state(StateBuilder::atomic("paused")
//!         .on("PLAY", TransitionBuilder::new().target("playing")))
//!     .state(StateBuilder::atomic("playing")
//!         .on("PAUSE", TransitionBuilder::new().target("paused"))
//!         .on("VOLUME", TransitionBuilder::new()
//!             .guard("volumeWithinRange")
//!             .action(Action::assign([("volume", statecraft::Assigner::compute("assignVolume"))]))))
//!     .build()
//!     .unwrap();
//!
//! let interpreter = machine.interpret();
//! interpreter.start().unwrap();
//! let snapshot = interpreter.send(Event::new("PLAY")).unwrap();
//! assert!(snapshot.matches("playing"));
//!
//! let snapshot = interpreter.send(Event::new("VOLUME").field("level", json!(15))).unwrap();
//! assert_eq!(snapshot.context().get_i64("volume"), Some(5)); // out of range, ignored
//! interpreter.stop();
//! ```

pub mod builder;
pub mod core;
pub mod interpreter;
pub mod registry;

pub use builder::{DefinitionError, InvokeBuilder, MachineBuilder, StateBuilder, TransitionBuilder};
pub use core::{
    Action, Assigner, Configuration, Context, Event, Guard, HistoryStore, Machine, NodeId,
    StateKind, Step, StepError, MAX_MICROSTEPS,
};
pub use interpreter::{
    CallbackService, Interpreter, InterpreterError, SendBack, Service, Snapshot, Status,
    StepRecord, Subscription, MAX_LOG_RECORDS,
};
pub use registry::{BehaviorError, Registry};
