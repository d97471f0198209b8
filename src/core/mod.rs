//! The pure core: definitions, configurations, and transition resolution.
//!
//! Everything in this module is side-effect free. The resolver turns
//! committed state plus one event into an uncommitted [`resolver::Step`];
//! running effects, managing invoked processes, and queueing events belong to
//! the interpreter.

pub mod action;
pub mod config;
pub mod context;
pub mod event;
pub mod executor;
pub mod guard;
pub mod history;
pub mod machine;
pub mod node;
pub mod resolver;

pub use action::{Action, Assigner};
pub use config::Configuration;
pub use context::Context;
pub use event::{Event, ALWAYS_EVENT, INIT_EVENT};
pub use guard::Guard;
pub use history::HistoryStore;
pub use machine::Machine;
pub use node::{NodeId, StateKind, Target};
pub use resolver::{
    initial_step, resolve, EffectCall, InvokeOp, Step, StepError, MAX_MICROSTEPS,
};
