//! Interpreter-level errors.

use thiserror::Error;

use crate::core::StepError;
use crate::registry::BehaviorError;

/// Why an interpreter call failed.
///
/// Step failures ([`InterpreterError::Step`]) leave the machine exactly as it
/// was. Effect failures ([`InterpreterError::Effect`]) are reported after the
/// step has already committed, since effects run against committed state.
#[derive(Clone, Debug, Error)]
pub enum InterpreterError {
    /// `send` was called before `start`.
    #[error("interpreter has not been started")]
    NotStarted,

    /// `start` was called more than once.
    #[error("interpreter was already started")]
    AlreadyStarted,

    /// `send` was called after `stop`.
    #[error("interpreter is stopped")]
    Stopped,

    /// Resolution failed; nothing was committed.
    #[error(transparent)]
    Step(#[from] StepError),

    /// A deferred effect failed after its step committed.
    #[error("effect `{name}` failed: {source}")]
    Effect {
        /// Registry name of the effect.
        name: String,
        /// The underlying failure.
        source: BehaviorError,
    },
}
