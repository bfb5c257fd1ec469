//! Property-based checks for the seven invariants and three laws a reachable
//! allocator state must satisfy, modeled on the teacher's
//! `crates/ringmpsc/tests/property_tests.rs`.

use proptest::prelude::*;
use std::time::Duration;
use vea_core::{Clock, FakeClock, FreeView, ReservationList, VeaConfig, VeaSpace};
use vea_store::CellArenaEngine;

const CAPACITY: u64 = 10_000;
const HEADER_BLOCKS: u32 = 4;

fn config() -> VeaConfig {
    VeaConfig::default().with_aging_window(Duration::from_millis(1))
}

fn fresh_space() -> (CellArenaEngine, VeaSpace<CellArenaEngine, FakeClock>) {
    let mut engine = CellArenaEngine::new();
    let space =
        VeaSpace::format_with_clock(&mut engine, config(), HEADER_BLOCKS, CAPACITY, 0, false, FakeClock::new())
            .unwrap();
    (engine, space)
}

/// Invariants 1, 2, 4: both free sets stay pairwise disjoint and
/// non-adjacent, and the ordered-map pair's own multiset bookkeeping agrees
/// with itself (checked internally by `check_invariants`).
fn assert_free_set_invariants(index: &vea_core::FreeExtentIndex) {
    index.check_invariants().expect("free set invariants must hold");
}

/// Invariant 5: no free extent reaches into the header region or past
/// capacity.
fn assert_within_bounds(index: &vea_core::FreeExtentIndex, header_blocks: u32, capacity: u64) {
    for extent in index.iter() {
        assert!(extent.offset >= header_blocks as u64, "extent starts inside the header region");
        assert!(extent.end() <= capacity, "extent extends past capacity");
    }
}

proptest! {
    /// Invariants 1/2/4/5 hold after any sequence of reserve calls that
    /// happen to succeed, interspersed with immediate cancels.
    #[test]
    fn invariants_hold_after_random_reserve_cancel_sequence(
        block_counts in prop::collection::vec(1u32..200, 0..40),
        cancel_mask in prop::collection::vec(any::<bool>(), 0..40),
    ) {
        let (mut engine, mut space) = fresh_space();
        // Reservations we chose to keep outstanding never get published or
        // cancelled; they just fall out of scope at the end of the test,
        // the same as a crashed caller would leave them.
        let mut outstanding = ReservationList::new();

        for (i, &blocks) in block_counts.iter().enumerate() {
            let cancel = cancel_mask.get(i).copied().unwrap_or(false);
            let mut one = ReservationList::new();
            if space.reserve(&mut engine, blocks, None, &mut one).is_ok() {
                if cancel {
                    space.cancel(&mut one).unwrap();
                } else {
                    for entry in one.drain() {
                        outstanding.push(entry);
                    }
                }
            }
            assert_free_set_invariants(space.free_transient());
            assert_within_bounds(space.free_transient(), space.header_blocks(), space.capacity_blocks());
        }

        assert_free_set_invariants(space.free_persistent());
        assert_within_bounds(space.free_persistent(), space.header_blocks(), space.capacity_blocks());
        let _ = outstanding;
    }

    /// Law: idempotence. `reserve; cancel` returns (B) to its pre-call
    /// state, since the only reservation outstanding is the one being
    /// cancelled and free-transient fully absorbs it back via coalescing.
    #[test]
    fn reserve_then_cancel_is_idempotent_on_free_transient(block_count in 1u32..5_000) {
        let (mut engine, mut space) = fresh_space();
        let before: Vec<_> = space.free_transient().iter().collect();

        let mut list = ReservationList::new();
        if space.reserve(&mut engine, block_count, None, &mut list).is_ok() {
            space.cancel(&mut list).unwrap();
            let after: Vec<_> = space.free_transient().iter().collect();
            prop_assert_eq!(before, after);
        }
    }

    /// Invariant 7: a reservation's recorded range lies entirely inside a
    /// single free-transient extent that existed right before the call —
    /// here checked indirectly: immediately after `reserve` succeeds, the
    /// reserved range must no longer be satisfiable as a fresh reservation
    /// at the same offset (it has genuinely left free-transient).
    #[test]
    fn reserved_range_leaves_free_transient(block_count in 1u32..500) {
        let (mut engine, mut space) = fresh_space();
        let mut list = ReservationList::new();
        if space.reserve(&mut engine, block_count, None, &mut list).is_ok() {
            let entry = *list.iter().next().unwrap();
            let state = space.verify_alloc(FreeView::Transient, entry.offset, entry.length).unwrap();
            prop_assert_eq!(state, vea_core::AllocState::Allocated);
        }
    }
}

/// Law: round-trip. `reserve; tx_publish; free; migrate_aging(now + window)`
/// returns (A) to the pre-reservation free set, modulo coalescing (which can
/// only reduce entry count, never change total blocks).
#[test]
fn round_trip_restores_persistent_free_set() {
    let (mut engine, mut space) = fresh_space();
    let before_blocks = space.free_persistent().total_blocks();
    let before_entries = space.free_persistent().len();

    let mut list = ReservationList::new();
    space.reserve(&mut engine, 37, None, &mut list).unwrap();
    let entry = *list.iter().next().unwrap();
    space.tx_publish(&mut engine, &mut list).unwrap();
    space.free(entry.offset, entry.length).unwrap();

    let clock = FakeClock::new();
    clock.advance(config().aging_window);
    space.migrate_aging(&mut engine, clock.now()).unwrap();

    assert_eq!(space.free_persistent().total_blocks(), before_blocks);
    assert!(space.free_persistent().len() <= before_entries);
}

/// Law: commutativity of publish under disjoint reservations. Publishing
/// two disjoint reservation lists in either order yields the same (A).
#[test]
fn publish_order_does_not_affect_persistent_free_set() {
    let (mut engine_a, mut space_a) = fresh_space();
    let mut list_1a = ReservationList::new();
    let mut list_2a = ReservationList::new();
    space_a.reserve(&mut engine_a, 20, None, &mut list_1a).unwrap();
    space_a.reserve(&mut engine_a, 30, None, &mut list_2a).unwrap();
    space_a.tx_publish(&mut engine_a, &mut list_1a).unwrap();
    space_a.tx_publish(&mut engine_a, &mut list_2a).unwrap();

    let (mut engine_b, mut space_b) = fresh_space();
    let mut list_1b = ReservationList::new();
    let mut list_2b = ReservationList::new();
    space_b.reserve(&mut engine_b, 20, None, &mut list_1b).unwrap();
    space_b.reserve(&mut engine_b, 30, None, &mut list_2b).unwrap();
    space_b.tx_publish(&mut engine_b, &mut list_2b).unwrap();
    space_b.tx_publish(&mut engine_b, &mut list_1b).unwrap();

    let free_a: Vec<_> = space_a.free_persistent().iter().collect();
    let free_b: Vec<_> = space_b.free_persistent().iter().collect();
    assert_eq!(free_a, free_b, "publish order must not change the resulting free set");
}

/// Invariant 6: a block freed at time `t` is never handed back out before
/// `t + AGING_WINDOW`, even under an opportunistic migration attempt.
#[test]
fn freed_block_is_not_reused_before_aging_window_elapses() {
    let mut engine = CellArenaEngine::new();
    let clock = FakeClock::new();
    let mut space =
        VeaSpace::format_with_clock(&mut engine, config(), 1, 50, 0, false, clock.clone()).unwrap();

    let mut list = ReservationList::new();
    space.reserve(&mut engine, 49, None, &mut list).unwrap();
    let entry = *list.iter().next().unwrap();
    space.tx_publish(&mut engine, &mut list).unwrap();
    space.free(entry.offset, entry.length).unwrap();

    let mut probe = ReservationList::new();
    assert!(space.reserve(&mut engine, 1, None, &mut probe).is_err());

    clock.advance(config().aging_window);
    space.migrate_aging(&mut engine, clock.now()).unwrap();
    space.reserve(&mut engine, 49, None, &mut probe).unwrap();
}
