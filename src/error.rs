//! Validity-check failures.

use thiserror::Error;

use crate::engine::FsmStatus;
use crate::policy::EventSymbol;
use crate::state::StateId;

/// Reasons an automaton fails validation.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ValidityError<E: EventSymbol> {
    #[error("status {0:?} is neither running nor stopped")]
    InvalidStatus(FsmStatus),

    #[error("no states are registered")]
    NoStates,

    #[error("no start state is set")]
    MissingStartState,

    #[error("no stop states are registered")]
    MissingStopStates,

    #[error("no error state is set")]
    MissingErrorState,

    #[error("state {state} has no transition for symbol {event:?}")]
    MissingTransition { state: StateId, event: E },

    #[error("epsilon transition: state {state} accepts symbol {event:?} through more than one path")]
    EpsilonTransition { state: StateId, event: E },
}
