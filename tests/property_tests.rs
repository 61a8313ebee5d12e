//! Property-based tests for the engine's quantified invariants.
//!
//! These use proptest to check the alphabet, uniqueness, lookup and
//! execution invariants across many generated automata.

use std::collections::HashSet;

use hfsm::{
    FsmEngine, FsmOptions, FsmStatus, MultiThreadedPolicy, State, StateId, StateMap, Transition,
    TransitionTable,
};
use proptest::prelude::*;

type Engine = FsmEngine<MultiThreadedPolicy<u32>, u32>;

fn sid(raw: u32) -> StateId {
    StateId::from_raw(raw).unwrap()
}

fn silent_options() -> FsmOptions {
    FsmOptions {
        silent: true,
        ..FsmOptions::default()
    }
}

/// Engine with states 1..=n, each with a success handler.
fn engine_with_states(n: u32) -> Engine {
    let fsm = Engine::with_options(silent_options());
    for raw in 1..=n {
        let mut state = State::new().handler(|_: &u32| true);
        state.set_id(sid(raw));
        let (_, inserted) = fsm.add_state(state);
        assert!(inserted);
    }
    fsm
}

/// Ring of `n` states advanced by symbol 1, validated and started.
fn running_ring(n: u32) -> Engine {
    let fsm = engine_with_states(n);
    for raw in 1..=n {
        let next = raw % n + 1;
        assert!(fsm.add_transition(sid(raw), Transition::new(1, sid(next))));
    }
    fsm.set_start_state(sid(1));
    assert!(fsm.set_error_state(sid(1)));
    assert!(fsm.add_stop_state(sid(n)));
    assert!(fsm.valid());
    fsm.start(true);
    assert_eq!(fsm.status(), FsmStatus::Running);
    fsm
}

prop_compose! {
    /// Edges over a fixed pool of states: (from, event, to).
    fn arbitrary_edges(states: u32)(
        edges in prop::collection::vec((1..=states, 1..=8u32, 1..=states), 0..32)
    ) -> Vec<(u32, u32, u32)> {
        edges
    }
}

proptest! {
    #[test]
    fn alphabet_is_the_union_of_events_and_symbols(
        edges in arbitrary_edges(6),
        symbols in prop::collection::hash_set(1..16u32, 0..8),
    ) {
        let fsm = engine_with_states(6);
        let mut expected = HashSet::new();

        for &(from, event, to) in &edges {
            fsm.add_transition(sid(from), Transition::new(event, sid(to)));
            expected.insert(event);
        }
        for &symbol in &symbols {
            fsm.add_alphabet_symbol(symbol);
            expected.insert(symbol);
        }

        prop_assert_eq!(fsm.alphabet(), expected);
    }

    #[test]
    fn at_most_one_row_per_state_and_event(edges in arbitrary_edges(6)) {
        let mut table: TransitionTable<u32, u32> = TransitionTable::new();
        let mut keys = HashSet::new();

        for &(from, event, to) in &edges {
            let fresh = keys.insert((from, event));
            prop_assert_eq!(table.insert(sid(from), Transition::new(event, sid(to))), fresh);
        }
        prop_assert_eq!(table.len(), keys.len());
    }

    #[test]
    fn packed_keys_keep_rows_independent(state_a in 1..100u32, state_b in 1..100u32, event in 1..100u32) {
        prop_assume!(state_a != state_b);

        let mut table: TransitionTable<u32, u32> = TransitionTable::new();
        prop_assert!(table.insert(sid(state_a), Transition::new(event, sid(state_a))));
        prop_assert!(table.insert(sid(state_b), Transition::new(event, sid(state_b))));

        prop_assert_eq!(table.get(sid(state_a), event).unwrap().next(), sid(state_a));
        prop_assert_eq!(table.get(sid(state_b), event).unwrap().next(), sid(state_b));
    }

    #[test]
    fn acceptance_matches_chain_lookup(
        edges in arbitrary_edges(5),
        parent_links in prop::collection::vec(any::<bool>(), 5),
        probe in 1..8u32,
    ) {
        // States 2..=5 optionally parented to their predecessor; acyclic by
        // construction.
        let fsm = Engine::with_options(silent_options());
        let mut map: StateMap<u32> = StateMap::new();
        for raw in 1..=5u32 {
            let mut state: State<u32> = State::new().handler(|_: &u32| true);
            state.set_id(sid(raw));
            if raw > 1 && parent_links[(raw - 1) as usize] {
                state.set_parent(sid(raw - 1));
            }
            map.insert(state.id(), state.clone());
            fsm.add_state(state);
        }

        let mut table: TransitionTable<u32, u32> = TransitionTable::new();
        for &(from, event, to) in &edges {
            fsm.add_transition(sid(from), Transition::new(event, sid(to)));
            table.insert(sid(from), Transition::new(event, sid(to)));
        }

        fsm.set_start_state(sid(5));
        fsm.set_error_state(sid(1));
        fsm.add_stop_state(sid(1));
        fsm.start(false);

        let accepted = fsm.accept(probe);
        let resolved = table.lookup(&map, sid(5), probe).is_some();
        prop_assert_eq!(accepted, resolved);
    }

    #[test]
    fn start_latches_the_start_state(n in 2..8u32) {
        let fsm = running_ring(n);
        prop_assert_eq!(fsm.current_state().unwrap().id(), sid(1));
    }

    #[test]
    fn steps_follow_the_transition_rows(n in 2..8u32, steps in 0..20u32) {
        let fsm = running_ring(n);

        let mut expected = 1u32;
        for _ in 0..steps {
            prop_assert!(fsm.raise(1, 0));
            prop_assert_eq!(fsm.step(), FsmStatus::StateChanged);
            expected = expected % n + 1;
            prop_assert_eq!(fsm.current_state().unwrap().id(), sid(expected));
        }
    }

    #[test]
    fn raises_are_consumed_in_raise_order(count in 1..16u32) {
        let fsm = running_ring(8);

        for _ in 0..count {
            prop_assert!(fsm.raise(1, 0));
        }
        for consumed in 0..count {
            prop_assert_eq!(fsm.step(), FsmStatus::StateChanged);
            prop_assert_eq!(
                fsm.current_state().unwrap().id(),
                sid((consumed + 1) % 8 + 1)
            );
        }
        prop_assert_eq!(fsm.step(), FsmStatus::StateUnchanged);
    }
}
