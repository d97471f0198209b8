//! Validation errors reported while building a machine.

use thiserror::Error;

use crate::core::NodeId;

/// Why a machine definition was rejected. Every variant is a structural
/// problem caught before an interpreter can be created.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DefinitionError {
    /// The machine has no top-level states.
    #[error("machine has no states")]
    NoStates,

    /// A compound state did not declare an initial child.
    #[error("compound state `{state}` has no initial child")]
    MissingInitialChild {
        /// The offending compound state.
        state: NodeId,
    },

    /// A compound state's initial child does not exist.
    #[error("state `{state}` declares unknown initial child `{initial}`")]
    UnknownInitialChild {
        /// The offending compound state.
        state: NodeId,
        /// The missing child name.
        initial: String,
    },

    /// Two sibling states share a name.
    #[error("state `{state}` has two children named `{name}`")]
    DuplicateChild {
        /// The parent state.
        state: NodeId,
        /// The repeated child name.
        name: String,
    },

    /// An atomic, final, or history state declared children.
    #[error("leaf state `{state}` cannot have children")]
    UnexpectedChildren {
        /// The offending leaf state.
        state: NodeId,
    },

    /// A history state carried transitions, actions, or an invocation.
    #[error("history state `{state}` cannot declare behavior of its own")]
    HistoryWithTransitions {
        /// The offending history state.
        state: NodeId,
    },

    /// A history state was placed outside a compound parent.
    #[error("history state `{state}` must be the child of a compound state")]
    HistoryPlacement {
        /// The offending history state.
        state: NodeId,
    },

    /// A compound state named a history child as its initial child.
    #[error("state `{state}` uses a history child as its initial child")]
    HistoryAsInitial {
        /// The offending compound state.
        state: NodeId,
    },

    /// A transition target did not resolve anywhere in the tree.
    #[error("transition from `{from}` targets unknown state `{target}`")]
    UnknownTarget {
        /// The transition's source state.
        from: NodeId,
        /// The target notation as written.
        target: String,
    },

    /// A transition referenced a guard missing from the registry.
    #[error("guard `{name}` is not registered")]
    MissingGuard {
        /// The missing guard name.
        name: String,
    },

    /// An assign action referenced a compute missing from the registry.
    #[error("assigner `{name}` is not registered")]
    MissingAssigner {
        /// The missing compute name.
        name: String,
    },

    /// An action referenced an effect missing from the registry.
    #[error("effect `{name}` is not registered")]
    MissingEffect {
        /// The missing effect name.
        name: String,
    },

    /// An invocation referenced a service missing from the registry.
    #[error("service `{name}` is not registered")]
    MissingService {
        /// The missing service name.
        name: String,
    },

    /// Two invocations share an id, which would make routing ambiguous.
    #[error("invocation id `{id}` is declared twice")]
    DuplicateInvokeId {
        /// The repeated invocation id.
        id: String,
    },
}
