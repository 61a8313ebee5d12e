//! State machine engine benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hfsm::{FsmEngine, FsmOptions, FsmStatus, MultiThreadedPolicy, State, StateId, Transition};

type Engine = FsmEngine<MultiThreadedPolicy<u32>, u32>;

const TICK: u32 = 1;

fn sid(raw: u32) -> StateId {
    StateId::from_raw(raw).unwrap()
}

fn silent_options() -> FsmOptions {
    FsmOptions {
        silent: true,
        ..FsmOptions::default()
    }
}

/// Ring of `n` states advanced by `TICK`.
fn ring(n: u32) -> Engine {
    let fsm = Engine::with_options(silent_options());
    for raw in 1..=n {
        let mut state = State::new().handler(|_: &u32| true);
        state.set_id(sid(raw));
        fsm.add_state(state);
    }
    for raw in 1..=n {
        fsm.add_transition(sid(raw), Transition::new(TICK, sid(raw % n + 1)));
    }
    fsm.set_start_state(sid(1));
    fsm.set_error_state(sid(1));
    fsm.add_stop_state(sid(n));
    fsm
}

/// Root state 1 with a chain of `depth` children hanging off it; the only
/// transition row sits on the root and leads back to the deepest child, so
/// every lookup climbs the whole chain.
fn deep_hierarchy(depth: u32) -> Engine {
    let fsm = Engine::with_options(silent_options());
    let mut root = State::new().handler(|_: &u32| true);
    root.set_id(sid(1));
    fsm.add_state(root);

    for raw in 2..=depth + 1 {
        let mut child = State::with_parent(sid(raw - 1)).handler(|_: &u32| true);
        child.set_id(sid(raw));
        fsm.add_state(child);
    }

    let leaf = sid(depth + 1);
    fsm.add_transition(sid(1), Transition::new(TICK, leaf));
    fsm.set_start_state(leaf);
    fsm.set_error_state(sid(1));
    fsm.add_stop_state(leaf);
    fsm
}

fn bench_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_step");
    group.throughput(Throughput::Elements(1));

    let fsm = ring(4);
    fsm.start(true);
    assert_eq!(fsm.status(), FsmStatus::Running);

    group.bench_function("raise_and_step", |b| {
        b.iter(|| {
            fsm.raise(TICK, 0);
            black_box(fsm.step())
        });
    });

    group.bench_function("step_empty_queue", |b| {
        b.iter(|| black_box(fsm.step()));
    });

    group.finish();
}

fn bench_hierarchical_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_hierarchy");
    group.throughput(Throughput::Elements(1));

    for depth in [1u32, 4, 16] {
        let fsm = deep_hierarchy(depth);
        fsm.start(true);
        assert_eq!(fsm.status(), FsmStatus::Running);

        group.bench_with_input(BenchmarkId::new("raise_and_step", depth), &depth, |b, _| {
            b.iter(|| {
                fsm.raise(TICK, 0);
                black_box(fsm.step())
            });
        });
    }

    group.finish();
}

fn bench_validation(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_validation");

    for states in [4u32, 32] {
        let fsm = ring(states);
        group.bench_with_input(BenchmarkId::new("valid", states), &states, |b, _| {
            b.iter(|| black_box(fsm.valid()));
        });
    }

    group.finish();
}

fn bench_registration(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_registration");

    group.bench_function("ring_32", |b| {
        b.iter(|| black_box(ring(32)));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_step,
    bench_hierarchical_lookup,
    bench_validation,
    bench_registration,
);

criterion_main!(benches);
