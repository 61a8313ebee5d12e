//! Engine policies: event symbols and threading models.
//!
//! A [`Policy`] names the two things that vary between deployments of the
//! engine: the symbol type of the input alphabet and the threading model.
//! Engines shared between threads use [`MultiThreading`]; engines driven
//! from a single loop use [`SingleThreading`], whose primitives are no-ops
//! that trivially succeed.

use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lock_api::{GetThreadId, GuardSend, RawMutex};
use parking_lot::{Condvar, Mutex};

/// A symbol of the input alphabet.
///
/// Symbols are small integral values. The raw value 0 means "unset" and is
/// never a member of the alphabet; the raw projection is also what the
/// transition table packs into its composite key.
pub trait EventSymbol: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// The raw integral value of this symbol.
    fn to_raw(self) -> u32;

    /// Whether this symbol carries a value.
    fn is_set(self) -> bool {
        self.to_raw() != 0
    }
}

impl EventSymbol for u8 {
    fn to_raw(self) -> u32 {
        self.into()
    }
}

impl EventSymbol for u16 {
    fn to_raw(self) -> u32 {
        self.into()
    }
}

impl EventSymbol for u32 {
    fn to_raw(self) -> u32 {
        self
    }
}

/// Condition-variable contract behind the engine's stop signal.
///
/// The signal counts pulses. A waiter records the epoch while it still
/// holds the engine lock, releases the lock, then waits for the epoch to
/// move, which closes the window in which a pulse could otherwise be lost.
pub trait StopSignal: Default + Send + Sync + 'static {
    /// Current pulse count.
    fn epoch(&self) -> u64;

    /// Wakes all waiters.
    fn pulse(&self);

    /// Blocks until the epoch moves past `seen` or `timeout` elapses.
    /// Returns whether a pulse was observed.
    fn wait_for_pulse(&self, seen: u64, timeout: Duration) -> bool;
}

/// Threading model supplied by a [`Policy`].
pub trait Threading: 'static {
    /// Raw mutex the engine's reentrant lock is assembled from.
    type RawLock: RawMutex + Send + Sync + 'static;

    /// Thread identity used for reentrancy accounting.
    type ThreadId: GetThreadId + Send + Sync + 'static;

    /// Stop-signal implementation.
    type Signal: StopSignal;
}

/// Parallel threading model backed by `parking_lot`.
pub struct MultiThreading;

impl Threading for MultiThreading {
    type RawLock = parking_lot::RawMutex;
    type ThreadId = parking_lot::RawThreadId;
    type Signal = CondvarSignal;
}

/// Threading model for engines driven from one thread.
pub struct SingleThreading;

impl Threading for SingleThreading {
    type RawLock = NoopRawLock;
    type ThreadId = SingleThreadId;
    type Signal = NoopSignal;
}

/// Stop signal built from a pulse counter and a condition variable.
pub struct CondvarSignal {
    epoch: Mutex<u64>,
    cond: Condvar,
}

impl Default for CondvarSignal {
    fn default() -> Self {
        Self {
            epoch: Mutex::new(0),
            cond: Condvar::new(),
        }
    }
}

impl StopSignal for CondvarSignal {
    fn epoch(&self) -> u64 {
        *self.epoch.lock()
    }

    fn pulse(&self) {
        *self.epoch.lock() += 1;
        self.cond.notify_all();
    }

    fn wait_for_pulse(&self, seen: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut epoch = self.epoch.lock();
        while *epoch == seen {
            if self.cond.wait_until(&mut epoch, deadline).timed_out() {
                break;
            }
        }
        *epoch != seen
    }
}

/// Stop signal that never blocks.
#[derive(Debug, Default)]
pub struct NoopSignal;

impl StopSignal for NoopSignal {
    fn epoch(&self) -> u64 {
        0
    }

    fn pulse(&self) {}

    fn wait_for_pulse(&self, _seen: u64, _timeout: Duration) -> bool {
        false
    }
}

/// Raw mutex whose acquisition trivially succeeds.
pub struct NoopRawLock;

// Safety: the single-threaded model has exactly one thread, so there is
// nothing to exclude.
unsafe impl RawMutex for NoopRawLock {
    const INIT: Self = NoopRawLock;
    type GuardMarker = GuardSend;

    fn lock(&self) {}

    fn try_lock(&self) -> bool {
        true
    }

    unsafe fn unlock(&self) {}
}

/// Thread identity for the single-threaded model.
pub struct SingleThreadId;

// Safety: with one thread there is one identity, and it is non-zero.
unsafe impl GetThreadId for SingleThreadId {
    const INIT: Self = SingleThreadId;

    fn nonzero_thread_id(&self) -> NonZeroUsize {
        NonZeroUsize::MIN
    }
}

/// Names the event symbol type and the threading model an engine is built
/// with.
pub trait Policy: 'static {
    /// Input alphabet symbol type.
    type Event: EventSymbol;

    /// Threading model.
    type Threading: Threading;
}

/// Policy for engines shared between threads.
pub struct MultiThreadedPolicy<E>(PhantomData<E>);

impl<E: EventSymbol> Policy for MultiThreadedPolicy<E> {
    type Event = E;
    type Threading = MultiThreading;
}

/// Policy for engines driven from a single thread.
pub struct SingleThreadedPolicy<E>(PhantomData<E>);

impl<E: EventSymbol> Policy for SingleThreadedPolicy<E> {
    type Event = E;
    type Threading = SingleThreading;
}
