//! Fluent builders for machine definitions.
//!
//! Definitions are assembled bottom-up: [`TransitionBuilder`]s attach to
//! [`StateBuilder`]s, which nest into a [`MachineBuilder`]. Nothing is
//! validated until [`MachineBuilder::build`], which checks the whole tree and
//! the registry together and returns a [`DefinitionError`] describing the
//! first problem found.

mod error;
mod machine;
mod state;
mod transition;

pub use error::DefinitionError;
pub use machine::MachineBuilder;
pub use state::{InvokeBuilder, StateBuilder};
pub use transition::TransitionBuilder;
