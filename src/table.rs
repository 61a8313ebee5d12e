//! The state transition table and the accumulated alphabet.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};

use crate::policy::EventSymbol;
use crate::state::{State, StateId};
use crate::transition::Transition;

/// Registered states, keyed by id.
pub type StateMap<A> = BTreeMap<StateId, State<A>>;

/// Transition rows keyed by `(state, event)` packed into one integer, plus
/// the alphabet accumulated from every inserted row.
///
/// The packed key keeps the state id in the low 32 bits and the raw event
/// symbol in the high 32 bits, so the same symbol against two different
/// states is two independent rows.
pub struct TransitionTable<E, A> {
    rows: BTreeMap<u64, Transition<E, A>>,
    alphabet: HashSet<E>,
}

impl<E: EventSymbol, A> TransitionTable<E, A> {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            alphabet: HashSet::new(),
        }
    }

    fn pack(state: StateId, event: E) -> u64 {
        u64::from(event.to_raw()) << 32 | u64::from(state.to_raw())
    }

    /// Inserts a row for `(state, event)`. The alphabet is extended with
    /// the row's symbol either way; the row itself is inserted only if the
    /// slot is free. Returns whether it was inserted.
    pub fn insert(&mut self, state: StateId, transition: Transition<E, A>) -> bool {
        self.alphabet.insert(transition.event());

        match self.rows.entry(Self::pack(state, transition.event())) {
            Entry::Vacant(slot) => {
                slot.insert(transition);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    /// The direct row for `(state, event)`, without parent fall-through.
    pub fn get(&self, state: StateId, event: E) -> Option<&Transition<E, A>> {
        self.rows.get(&Self::pack(state, event))
    }

    /// Resolves the row for `event` starting at `from`, climbing the parent
    /// chain on a miss until no parent remains.
    ///
    /// Parent chains are not checked for cycles; registering a cyclic chain
    /// makes this loop forever.
    pub fn lookup<'a>(
        &'a self,
        states: &StateMap<A>,
        from: StateId,
        event: E,
    ) -> Option<&'a Transition<E, A>> {
        let mut cursor = Some(from);
        while let Some(id) = cursor {
            if let Some(row) = self.get(id, event) {
                return Some(row);
            }
            cursor = states.get(&id).and_then(State::parent);
        }
        None
    }

    /// Adds a bare symbol to the alphabet. Returns whether it was new.
    pub fn add_symbol(&mut self, event: E) -> bool {
        self.alphabet.insert(event)
    }

    /// The set of symbols referenced by any inserted row or added directly.
    pub fn alphabet(&self) -> &HashSet<E> {
        &self.alphabet
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl<E: EventSymbol, A> Default for TransitionTable<E, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: EventSymbol, A> Clone for TransitionTable<E, A> {
    fn clone(&self) -> Self {
        Self {
            rows: self.rows.clone(),
            alphabet: self.alphabet.clone(),
        }
    }
}
