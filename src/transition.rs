//! Transitions and guards.

use std::fmt;
use std::sync::Arc;

use crate::policy::EventSymbol;
use crate::state::StateId;

/// Type-erased guard predicate.
pub type GuardFn<A> = Arc<dyn Fn(&A) -> bool + Send + Sync>;

/// A transition row: an input symbol, the destination state and an optional
/// guard predicate.
///
/// Guards are advisory in this engine: acceptance and validity checks key
/// on `(state, event)` alone, and execution does not consult the guard
/// before advancing. They are stored and queryable for callers that
/// evaluate them as part of their own handler logic.
pub struct Transition<E, A> {
    event: E,
    next: StateId,
    guard: Option<GuardFn<A>>,
}

impl<E: EventSymbol, A> Transition<E, A> {
    /// Creates a transition on `event` into `next`.
    pub fn new(event: E, next: StateId) -> Self {
        Self {
            event,
            next,
            guard: None,
        }
    }

    /// Creates a guarded transition.
    pub fn guarded<F>(event: E, next: StateId, guard: F) -> Self
    where
        F: Fn(&A) -> bool + Send + Sync + 'static,
    {
        Self {
            event,
            next,
            guard: Some(Arc::new(guard)),
        }
    }

    /// Installs or replaces the guard.
    pub fn set_guard<F>(&mut self, guard: F)
    where
        F: Fn(&A) -> bool + Send + Sync + 'static,
    {
        self.guard = Some(Arc::new(guard));
    }

    /// Whether a guard is installed.
    pub fn has_guard(&self) -> bool {
        self.guard.is_some()
    }

    /// Evaluates the guard against `args`. A transition without a guard is
    /// always taken, so the evaluation reports success.
    pub fn evaluate_guard(&self, args: &A) -> bool {
        match &self.guard {
            Some(guard) => guard(args),
            None => true,
        }
    }

    /// The symbol that triggers this transition.
    pub fn event(&self) -> E {
        self.event
    }

    /// The destination state.
    pub fn next(&self) -> StateId {
        self.next
    }

    /// Whether the transition is fully formed. The destination is valid by
    /// construction, so this reduces to the symbol being set.
    pub fn is_valid(&self) -> bool {
        self.event.is_set()
    }
}

impl<E: EventSymbol, A> PartialEq<E> for Transition<E, A> {
    fn eq(&self, event: &E) -> bool {
        self.event == *event
    }
}

impl<E: EventSymbol, A> Clone for Transition<E, A> {
    fn clone(&self) -> Self {
        Self {
            event: self.event,
            next: self.next,
            guard: self.guard.clone(),
        }
    }
}

impl<E: EventSymbol, A> fmt::Debug for Transition<E, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("event", &self.event)
            .field("next", &self.next)
            .field("guard", &self.guard.is_some())
            .finish()
    }
}
