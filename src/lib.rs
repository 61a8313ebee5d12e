//! # hfsm
//!
//! Policy-driven hierarchical finite state machine engine.
//!
//! This crate provides:
//! - Typed event alphabets and guard-carrying transitions
//! - Hierarchical states with parent fall-through lookup
//! - Determinism and completeness validation before start
//! - A queue-driven execution step with watchdog refresh
//! - Threading models selected per engine by policy

pub mod engine;
pub mod error;
pub mod policy;
pub mod signal;
pub mod state;
pub mod table;
pub mod transition;
pub mod watchdog;

pub use engine::{FsmEngine, FsmOptions, FsmStatus};
pub use error::ValidityError;
pub use policy::{
    CondvarSignal, EventSymbol, MultiThreadedPolicy, MultiThreading, NoopSignal, Policy,
    SingleThreadedPolicy, SingleThreading, StopSignal, Threading,
};
pub use signal::Signal;
pub use state::{HandlerOutcome, State, StateHandler, StateId};
pub use table::{StateMap, TransitionTable};
pub use transition::{GuardFn, Transition};
pub use watchdog::{NoopWatchdog, SoftWatchdog, Watchdog};
