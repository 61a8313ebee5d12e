//! The state machine engine.
//!
//! [`FsmEngine`] owns the automaton: registered states, the transition
//! table and its alphabet, the start/error/stop designations, the event
//! queue and the latched status. A driver loop repeatedly calls
//! [`step`](FsmEngine::step); events reach the queue through
//! [`raise`](FsmEngine::raise) (external callers, back of the queue) and
//! [`transition`](FsmEngine::transition) (state handlers, front of the
//! queue, at most one in flight).
//!
//! Every method takes `&self`: the engine serialises itself with a
//! reentrant lock assembled from the policy's threading model, so handlers
//! running inside `step` may call back into the non-blocking operations.
//! Handlers must not call `stop(wait = true)`.

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::mem;
use std::time::Duration;

use lock_api::ReentrantMutex;

use crate::error::ValidityError;
use crate::policy::{EventSymbol, Policy, StopSignal, Threading};
use crate::state::{State, StateId};
use crate::table::{StateMap, TransitionTable};
use crate::transition::Transition;
use crate::watchdog::{NoopWatchdog, Watchdog};

/// Engine status, also the return value of [`FsmEngine::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsmStatus {
    /// No transition has taken place.
    StateUnchanged,
    /// The engine moved from one state to another.
    StateChanged,
    /// A handler failed and the error state has been executed.
    Fault,
    /// Latched after a fault until the next start.
    Error,
    /// The engine is not running.
    Stopped,
    /// The engine is running.
    Running,
}

/// Engine construction options.
#[derive(Debug, Clone)]
pub struct FsmOptions {
    /// Timeout the watchdog is armed with at construction.
    pub watchdog_timeout: Duration,
    /// Suppresses the engine's own diagnostics.
    pub silent: bool,
}

impl Default for FsmOptions {
    fn default() -> Self {
        Self {
            watchdog_timeout: Duration::from_millis(2000),
            silent: false,
        }
    }
}

/// Bound on a single `stop(wait = true)` sleep.
const STOP_WAIT: Duration = Duration::from_millis(200);

type RawLockOf<P> = <<P as Policy>::Threading as Threading>::RawLock;
type ThreadIdOf<P> = <<P as Policy>::Threading as Threading>::ThreadId;
type SignalOf<P> = <<P as Policy>::Threading as Threading>::Signal;
type EventOf<P> = <P as Policy>::Event;

#[derive(Clone)]
struct QueuedEvent<E, A> {
    event: E,
    args: A,
}

struct Inner<E, A, W> {
    table: TransitionTable<E, A>,
    states: StateMap<A>,
    stop_states: Vec<StateId>,
    start_state: Option<StateId>,
    error_state: Option<StateId>,
    current: Option<StateId>,
    status: FsmStatus,
    events: VecDeque<QueuedEvent<E, A>>,
    in_transition: bool,
    silent: bool,
    watchdog: W,
}

impl<E: EventSymbol, A, W: Watchdog> Inner<E, A, W> {
    fn new(options: &FsmOptions) -> Self {
        let mut watchdog = W::default();
        watchdog.enable(options.watchdog_timeout);
        Self {
            table: TransitionTable::new(),
            states: StateMap::new(),
            stop_states: Vec::new(),
            start_state: None,
            error_state: None,
            current: None,
            status: FsmStatus::Stopped,
            events: VecDeque::new(),
            in_transition: false,
            silent: options.silent,
            watchdog,
        }
    }

    fn running(&self) -> bool {
        self.status == FsmStatus::Running
    }

    fn is_stop_state(&self, id: StateId) -> bool {
        self.stop_states.contains(&id)
    }

    fn accepts(&self, event: E) -> bool {
        if !self.running() {
            return false;
        }
        match self.current {
            Some(current) => self.table.lookup(&self.states, current, event).is_some(),
            None => false,
        }
    }

    /// Walks every state against the alphabet. A handler-bearing state with
    /// no row for a symbol is a missing transition; a symbol resolvable
    /// through more than one link of the parent chain is an epsilon
    /// transition (a direct row shadowing an ancestor row).
    fn check_deterministic(&self) -> Result<(), ValidityError<E>> {
        for (&id, state) in &self.states {
            for &symbol in self.table.alphabet() {
                let mut found = false;
                let mut cursor = Some(id);
                while let Some(link) = cursor {
                    if self.table.get(link, symbol).is_some() {
                        if found {
                            return Err(ValidityError::EpsilonTransition {
                                state: id,
                                event: symbol,
                            });
                        }
                        found = true;
                    }
                    cursor = self.states.get(&link).and_then(State::parent);
                }
                if !found && state.has_handler() {
                    return Err(ValidityError::MissingTransition {
                        state: id,
                        event: symbol,
                    });
                }
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ValidityError<E>> {
        if !matches!(self.status, FsmStatus::Running | FsmStatus::Stopped) {
            return Err(ValidityError::InvalidStatus(self.status));
        }
        if self.states.is_empty() {
            return Err(ValidityError::NoStates);
        }
        if self.start_state.is_none() {
            return Err(ValidityError::MissingStartState);
        }
        if self.stop_states.is_empty() {
            return Err(ValidityError::MissingStopStates);
        }
        if self.error_state.is_none() {
            return Err(ValidityError::MissingErrorState);
        }
        self.check_deterministic()
    }
}

/// A deterministic hierarchical finite state machine.
///
/// `P` selects the event symbol type and the threading model, `A` is the
/// argument type forwarded to handlers and guards (use a tuple for several
/// values) and `W` is the watchdog refreshed on every step.
pub struct FsmEngine<P: Policy, A, W: Watchdog = NoopWatchdog> {
    inner: ReentrantMutex<RawLockOf<P>, ThreadIdOf<P>, RefCell<Inner<EventOf<P>, A, W>>>,
    stop_signal: SignalOf<P>,
}

impl<P: Policy, A, W: Watchdog> FsmEngine<P, A, W> {
    /// Creates an engine with default options.
    pub fn new() -> Self {
        Self::with_options(FsmOptions::default())
    }

    /// Creates an engine with explicit options. The watchdog is armed with
    /// the configured timeout.
    pub fn with_options(options: FsmOptions) -> Self {
        Self {
            inner: ReentrantMutex::new(RefCell::new(Inner::new(&options))),
            stop_signal: SignalOf::<P>::default(),
        }
    }

    /// Registers `state`. Returns its id and whether it was inserted;
    /// duplicate ids are rejected.
    pub fn add_state(&self, state: State<A>) -> (StateId, bool) {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        let id = state.id();
        if inner.states.contains_key(&id) {
            return (id, false);
        }
        if !inner.silent {
            tracing::debug!("registering state {}", id);
        }
        inner.states.insert(id, state);
        (id, true)
    }

    /// Registers a batch of states. All-or-nothing: if any id collides with
    /// a registered state or with another id in the batch, nothing is
    /// added.
    pub fn add_states(&self, states: Vec<State<A>>) -> bool {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();

        let mut pending = HashSet::with_capacity(states.len());
        for state in &states {
            if inner.states.contains_key(&state.id()) || !pending.insert(state.id()) {
                return false;
            }
        }
        for state in states {
            if !inner.silent {
                tracing::debug!("registering state {}", state.id());
            }
            inner.states.insert(state.id(), state);
        }
        true
    }

    /// Adds a transition out of `state`. Rejected when either endpoint is
    /// unregistered or the `(state, event)` slot is already taken; a
    /// successful or duplicate insert extends the alphabet with the row's
    /// symbol.
    pub fn add_transition(&self, state: StateId, transition: Transition<EventOf<P>, A>) -> bool {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        if !inner.states.contains_key(&state) || !inner.states.contains_key(&transition.next()) {
            return false;
        }
        inner.table.insert(state, transition)
    }

    /// Adds a bare symbol to the alphabet. Returns whether it was new.
    pub fn add_alphabet_symbol(&self, event: EventOf<P>) -> bool {
        self.inner.lock().borrow_mut().table.add_symbol(event)
    }

    /// The accumulated alphabet.
    pub fn alphabet(&self) -> HashSet<EventOf<P>> {
        self.inner.lock().borrow().table.alphabet().clone()
    }

    /// Sets the start state. Unknown ids are ignored.
    pub fn set_start_state(&self, id: StateId) {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        if inner.states.contains_key(&id) {
            inner.start_state = Some(id);
        }
    }

    /// Sets the error state. Returns whether `id` names a registered state.
    pub fn set_error_state(&self, id: StateId) -> bool {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        if !inner.states.contains_key(&id) {
            return false;
        }
        inner.error_state = Some(id);
        true
    }

    /// Adds `id` to the stop state set. Rejects unknown and duplicate ids.
    pub fn add_stop_state(&self, id: StateId) -> bool {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        if !inner.states.contains_key(&id) || inner.is_stop_state(id) {
            return false;
        }
        inner.stop_states.push(id);
        true
    }

    /// Adds a batch of stop states. All-or-nothing: one unknown or
    /// duplicate id rejects the whole batch.
    pub fn add_stop_states(&self, ids: &[StateId]) -> bool {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        for (position, id) in ids.iter().enumerate() {
            if !inner.states.contains_key(id)
                || inner.is_stop_state(*id)
                || ids[..position].contains(id)
            {
                return false;
            }
        }
        inner.stop_states.extend_from_slice(ids);
        true
    }

    /// Latched status.
    pub fn status(&self) -> FsmStatus {
        self.inner.lock().borrow().status
    }

    /// Whether the engine is running.
    pub fn running(&self) -> bool {
        self.inner.lock().borrow().running()
    }

    /// A copy of the current state, or `None` when the engine is not
    /// running. Handlers are shared, so the copy is shallow.
    pub fn current_state(&self) -> Option<State<A>> {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        if !inner.running() {
            return None;
        }
        inner.current.and_then(|id| inner.states.get(&id).cloned())
    }

    /// Whether `event` is acceptable from the current state, climbing the
    /// parent chain. Always false when the engine is not running.
    pub fn accept(&self, event: EventOf<P>) -> bool {
        self.inner.lock().borrow().accepts(event)
    }

    /// Whether the automaton is well-formed: status running or stopped,
    /// states registered, start/error/stop states set and the automaton
    /// deterministic. Failures are logged unless the engine is silent.
    pub fn valid(&self) -> bool {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        self.check_validity(&inner)
    }

    /// Typed counterpart of [`valid`](Self::valid).
    pub fn validate(&self) -> Result<(), ValidityError<EventOf<P>>> {
        self.inner.lock().borrow().validate()
    }

    /// Whether every handler-bearing state resolves every alphabet symbol
    /// through exactly one row of its parent chain.
    pub fn deterministic(&self) -> bool {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        match inner.check_deterministic() {
            Ok(()) => true,
            Err(e) => {
                if !inner.silent {
                    tracing::warn!("automaton is not deterministic: {}", e);
                }
                false
            }
        }
    }

    fn check_validity(&self, inner: &Inner<EventOf<P>, A, W>) -> bool {
        match inner.validate() {
            Ok(()) => true,
            Err(e) => {
                if !inner.silent {
                    tracing::warn!("automaton failed validation: {}", e);
                }
                false
            }
        }
    }

    /// Starts the engine. With `check` set the automaton is validated
    /// first, and a failure aborts the start silently (the reason is
    /// logged). On success the start state becomes current and the status
    /// latches to running.
    pub fn start(&self, check: bool) {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        if check && !self.check_validity(&inner) {
            return;
        }
        let Some(start) = inner.start_state else {
            if !inner.silent {
                tracing::warn!("cannot start: no start state is set");
            }
            return;
        };
        inner.current = Some(start);
        inner.status = FsmStatus::Running;
    }

    /// Stops the engine.
    ///
    /// Succeeds immediately when the engine is not running, or when the
    /// current state is the error state or a stop state (latching the
    /// status to stopped). Otherwise, with `wait` set, blocks for one
    /// bounded wake-up of the stop signal and retries once; without `wait`
    /// the call fails.
    pub fn stop(&self, wait: bool) -> bool {
        let seen = {
            let guard = self.inner.lock();
            let mut inner = guard.borrow_mut();
            if !inner.running() {
                return true;
            }
            let at_rest = match inner.current {
                Some(current) => {
                    inner.error_state == Some(current) || inner.is_stop_state(current)
                }
                None => false,
            };
            if at_rest {
                inner.status = FsmStatus::Stopped;
                return true;
            }
            if !wait {
                return false;
            }
            self.stop_signal.epoch()
        };

        self.stop_signal.wait_for_pulse(seen, STOP_WAIT);
        self.stop(false)
    }

    /// Forces the status to stopped without waiting for a stop state.
    pub fn halt(&self) {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        if inner.running() {
            inner.status = FsmStatus::Stopped;
        }
    }

    /// Raises an external event. Rejected when the engine does not accept
    /// `event` from the current state. Accepted events join the back of the
    /// queue, so raises are consumed in raise order.
    pub fn raise(&self, event: EventOf<P>, args: A) -> bool {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        if !inner.accepts(event) {
            return false;
        }
        inner.events.push_back(QueuedEvent { event, args });
        true
    }

    /// Requests a transition from inside a state handler. Rejected when the
    /// engine does not accept `event` or when another handler-initiated
    /// transition is already queued. Accepted events jump to the front of
    /// the queue so that intra-handler advancement beats raised events
    /// already waiting.
    pub fn transition(&self, event: EventOf<P>, args: A) -> bool {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        if !inner.accepts(event) || inner.in_transition {
            return false;
        }
        inner.events.push_front(QueuedEvent { event, args });
        inner.in_transition = true;
        true
    }

    /// Executes one queued event: the primitive a driver loop calls.
    ///
    /// Refreshes the watchdog, then pops and executes the front of the
    /// queue. Returns the latched status when not running,
    /// [`FsmStatus::StateUnchanged`] on an empty queue,
    /// [`FsmStatus::Fault`] when the invoked handler fails (the engine is
    /// then in its error state with status [`FsmStatus::Error`]) and
    /// [`FsmStatus::StateChanged`] otherwise.
    pub fn step(&self) -> FsmStatus {
        let guard = self.inner.lock();
        let queued = {
            let mut inner = guard.borrow_mut();
            inner.watchdog.reset();
            if !inner.running() {
                return inner.status;
            }
            match inner.events.pop_front() {
                Some(queued) => queued,
                None => return FsmStatus::StateUnchanged,
            }
        };
        let status = self.execute(&guard, queued);
        guard.borrow_mut().in_transition = false;
        status
    }

    /// Runs `inspect` against the engine's watchdog under the lock.
    pub fn inspect_watchdog<R>(&self, inspect: impl FnOnce(&W) -> R) -> R {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        inspect(&inner.watchdog)
    }

    /// Swaps two automata, acquiring both locks in address order so that
    /// concurrent swaps cannot deadlock. Watchdogs stay with their engines.
    pub fn swap(a: &Self, b: &Self) {
        if std::ptr::eq(a, b) {
            return;
        }
        let (first, second) = if (a as *const Self) < (b as *const Self) {
            (a, b)
        } else {
            (b, a)
        };
        let first_guard = first.inner.lock();
        let second_guard = second.inner.lock();
        let mut x = first_guard.borrow_mut();
        let mut y = second_guard.borrow_mut();

        mem::swap(&mut x.table, &mut y.table);
        mem::swap(&mut x.states, &mut y.states);
        mem::swap(&mut x.stop_states, &mut y.stop_states);
        mem::swap(&mut x.start_state, &mut y.start_state);
        mem::swap(&mut x.error_state, &mut y.error_state);
        mem::swap(&mut x.current, &mut y.current);
        mem::swap(&mut x.status, &mut y.status);
        mem::swap(&mut x.events, &mut y.events);
        mem::swap(&mut x.in_transition, &mut y.in_transition);
        mem::swap(&mut x.silent, &mut y.silent);
    }

    fn execute(
        &self,
        cell: &RefCell<Inner<EventOf<P>, A, W>>,
        queued: QueuedEvent<EventOf<P>, A>,
    ) -> FsmStatus {
        let destination = {
            let mut inner = cell.borrow_mut();
            let inner = &mut *inner;
            let next = match inner.current {
                Some(current) => inner
                    .table
                    .lookup(&inner.states, current, queued.event)
                    .map(Transition::next),
                None => None,
            };
            match next {
                Some(next) => {
                    inner.current = Some(next);
                    inner.states.get(&next).cloned().map(|state| (next, state))
                }
                // Accepted before an intervening move; no row from here.
                None => None,
            }
        };

        let Some((next, state)) = destination else {
            return self.fault(cell, &queued.args);
        };

        // The handler runs with the engine lock held but no inner borrow,
        // so it may re-enter through `transition` and friends.
        if !state.invoke(&queued.args) {
            return self.fault(cell, &queued.args);
        }

        if cell.borrow().is_stop_state(next) {
            self.stop_signal.pulse();
        }
        FsmStatus::StateChanged
    }

    /// Drops the engine into its error state, replaying `args` into the
    /// error handler, and pulses the stop signal.
    fn fault(&self, cell: &RefCell<Inner<EventOf<P>, A, W>>, args: &A) -> FsmStatus {
        let (error_state, silent) = {
            let mut inner = cell.borrow_mut();
            inner.status = FsmStatus::Error;
            inner.current = inner.error_state;
            (
                inner.error_state.and_then(|id| inner.states.get(&id).cloned()),
                inner.silent,
            )
        };
        if let Some(state) = error_state {
            state.invoke(args);
        }
        self.stop_signal.pulse();
        if !silent {
            tracing::warn!("state handler failed, error state executed");
        }
        FsmStatus::Fault
    }
}

impl<P: Policy, A, W: Watchdog> Default for FsmEngine<P, A, W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Policy, A: Clone, W: Watchdog> Clone for FsmEngine<P, A, W> {
    /// Duplicates the automaton: table, states, stop/start/error ids,
    /// status, current, queue and the silent flag. The clone receives a
    /// fresh default watchdog and stop signal.
    fn clone(&self) -> Self {
        let guard = self.inner.lock();
        let src = guard.borrow();
        let inner = Inner {
            table: src.table.clone(),
            states: src.states.clone(),
            stop_states: src.stop_states.clone(),
            start_state: src.start_state,
            error_state: src.error_state,
            current: src.current,
            status: src.status,
            events: src.events.clone(),
            in_transition: src.in_transition,
            silent: src.silent,
            watchdog: W::default(),
        };
        Self {
            inner: ReentrantMutex::new(RefCell::new(inner)),
            stop_signal: SignalOf::<P>::default(),
        }
    }

    /// Copy-assigns between two live engines, acquiring both locks in
    /// address order.
    fn clone_from(&mut self, source: &Self) {
        let this: &Self = self;
        let (first, second) = if (this as *const Self) < (source as *const Self) {
            (this, source)
        } else {
            (source, this)
        };
        let first_guard = first.inner.lock();
        let second_guard = second.inner.lock();
        let (src_cell, dst_cell) = if std::ptr::eq(first, source) {
            (&*first_guard, &*second_guard)
        } else {
            (&*second_guard, &*first_guard)
        };
        let src = src_cell.borrow();
        let mut dst = dst_cell.borrow_mut();

        dst.table = src.table.clone();
        dst.states = src.states.clone();
        dst.stop_states = src.stop_states.clone();
        dst.start_state = src.start_state;
        dst.error_state = src.error_state;
        dst.current = src.current;
        dst.status = src.status;
        dst.events = src.events.clone();
        dst.in_transition = src.in_transition;
        dst.silent = src.silent;
    }
}
