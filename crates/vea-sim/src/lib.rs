//! Deterministic simulation testing for `vea-core`.
//!
//! Runs several concurrent "I/O streams" — each with its own hint context —
//! against one shared `VeaSpace`, behind a `tokio::sync::Mutex`, driving
//! reserve/publish/cancel/free/migrate in a seeded random order. Every op
//! re-checks the free-set invariants, so a single bad interleaving fails the
//! run immediately instead of surfacing as a flaky production bug.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::Mutex;
use vea_core::{Clock, FakeClock, ReservationList, VeaConfig, VeaSpace};
use vea_store::CellArenaEngine;

/// Engine and space are mutated together on every operation, so they share
/// one lock rather than two (avoids lock-ordering questions entirely).
struct SharedState {
    engine: CellArenaEngine,
    space: VeaSpace<CellArenaEngine, FakeClock>,
}

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub seed: u64,
    pub stream_count: usize,
    pub ops_per_stream: usize,
    pub capacity_blocks: u64,
    pub header_blocks: u32,
    pub aging_window: Duration,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            stream_count: 4,
            ops_per_stream: 200,
            capacity_blocks: 1 << 16,
            header_blocks: 1,
            aging_window: Duration::from_millis(5),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SimulationReport {
    pub reserves_attempted: u64,
    pub reserves_succeeded: u64,
    pub publishes: u64,
    pub cancels: u64,
    pub frees: u64,
    pub migrations: u64,
    pub invariant_checks: u64,
}

/// Runs one simulation to completion, returning aggregate counters. Panics
/// (rather than returning a `Result`) on any invariant violation or
/// impossible-operation failure, since those represent a genuine allocator
/// bug, not an expected runtime condition — this mirrors how a fuzz harness
/// wants a hard failure, not a swallowed error.
pub async fn run(config: SimulationConfig) -> SimulationReport {
    let mut engine = CellArenaEngine::new();
    let vea_config = VeaConfig::default().with_aging_window(config.aging_window);
    let clock = FakeClock::new();
    let space = VeaSpace::format_with_clock(
        &mut engine,
        vea_config,
        config.header_blocks,
        config.capacity_blocks,
        config.stream_count,
        false,
        clock.clone(),
    )
    .expect("simulation config must describe a formattable device");

    let state = Rc::new(Mutex::new(SharedState { engine, space }));
    let report = Rc::new(Mutex::new(SimulationReport::default()));

    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let mut handles = Vec::with_capacity(config.stream_count);
            for stream_index in 0..config.stream_count {
                let state = Rc::clone(&state);
                let report = Rc::clone(&report);
                let clock = clock.clone();
                let seed = config.seed.wrapping_add(stream_index as u64);
                let ops = config.ops_per_stream;
                let aging_window = config.aging_window;
                handles.push(tokio::task::spawn_local(async move {
                    run_stream(state, report, clock, seed, stream_index, ops, aging_window).await;
                }));
            }
            for handle in handles {
                handle.await.expect("a simulation stream task panicked");
            }
        })
        .await;

    let report = Rc::try_unwrap(report).expect("every stream task has joined by now");
    report.into_inner()
}

async fn run_stream(
    state: Rc<Mutex<SharedState>>,
    report: Rc<Mutex<SimulationReport>>,
    clock: FakeClock,
    seed: u64,
    stream_index: usize,
    ops: usize,
    aging_window: Duration,
) {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut outstanding = ReservationList::new();
    let mut published: Vec<(u64, u32)> = Vec::new();

    for _ in 0..ops {
        let roll: u8 = rng.gen_range(0..100);
        let mut guard = state.lock().await;
        let SharedState { engine, space } = &mut *guard;

        match roll {
            0..=44 => {
                let blocks = rng.gen_range(1..64);
                report.lock().await.reserves_attempted += 1;
                if space.reserve(engine, blocks, Some(stream_index), &mut outstanding).is_ok() {
                    report.lock().await.reserves_succeeded += 1;
                }
            }
            45..=64 if !outstanding.is_empty() => {
                published.extend(outstanding.iter().map(|e| (e.offset, e.length)));
                space
                    .tx_publish(engine, &mut outstanding)
                    .expect("publishing a list this stream alone reserved cannot fail");
                report.lock().await.publishes += 1;
            }
            65..=79 if !outstanding.is_empty() => {
                space
                    .cancel(&mut outstanding)
                    .expect("cancelling a list this stream alone reserved cannot fail");
                report.lock().await.cancels += 1;
            }
            80..=94 if !published.is_empty() => {
                let (offset, length) = published.swap_remove(rng.gen_range(0..published.len()));
                space.free(offset, length).expect("freeing a range this stream itself published cannot fail");
                report.lock().await.frees += 1;
            }
            _ => {
                clock.advance(aging_window);
                let migrated = space
                    .migrate_aging(engine, clock.now())
                    .expect("migrating against a healthy in-process engine cannot fail");
                if migrated > 0 {
                    report.lock().await.migrations += 1;
                }
            }
        }

        space.free_transient().check_invariants().expect("free-transient invariant violated mid-simulation");
        space.free_persistent().check_invariants().expect("free-persistent invariant violated mid-simulation");
        report.lock().await.invariant_checks += 1;
        drop(guard);
    }

    let mut guard = state.lock().await;
    if !outstanding.is_empty() {
        guard.space.cancel(&mut outstanding).expect("end-of-run drain cancel cannot fail");
    }
}
