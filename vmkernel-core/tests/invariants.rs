//! Property tests for the universal invariants of spec §8.

extern crate std;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use proptest::prelude::*;

use vmkernel_core::alloc_model::{AllocBlock, Bound, SharesSpec, Units, SHARES_MAX, SHARES_MIN};
use vmkernel_core::ids::WorldId;
use vmkernel_core::semaphore::{HeldSemaphores, Rank};
use vmkernel_core::sync::VersionedCell;
use vmkernel_core::vcpu::RunState;
use vmkernel_core::vsmp::Vsmp;

fn leader() -> WorldId {
    WorldId { slot: 0, reinc: 0 }
}

proptest! {
    /// Invariant 6: "the stack of held ranked semaphores has strictly
    /// increasing ranks from bottom to top." A strictly increasing rank
    /// sequence must always push cleanly and pop back off in exact LIFO
    /// order.
    #[test]
    fn strictly_increasing_ranks_always_push_and_pop_lifo(
        ranks in prop::collection::btree_set(1u32..10_000, 1..12)
    ) {
        let ranks: Vec<u32> = ranks.into_iter().collect();
        let mut held = HeldSemaphores::new();
        for (id, &r) in ranks.iter().enumerate() {
            prop_assert!(held.push_acquire(id as u32, Rank::Ranked(r)).is_ok());
        }
        for (id, _) in ranks.iter().enumerate().rev() {
            prop_assert!(held.pop_release(id as u32).is_ok());
        }
    }

    /// Invariant 6, failure side: a rank that does not strictly exceed the
    /// current top of stack is always rejected, regardless of its value.
    #[test]
    fn non_increasing_rank_is_always_rejected(top in 1u32..10_000, next in 0u32..10_000) {
        prop_assume!(next <= top);
        let mut held = HeldSemaphores::new();
        held.push_acquire(0, Rank::Ranked(top)).unwrap();
        prop_assert!(held.push_acquire(1, Rank::Ranked(next)).is_err());
    }

    /// Invariant 4: "nRun + nWait + nIdle == |vcpus|" must hold for every
    /// reachable per-vcpu run-state/idle assignment, not just the ones
    /// exercised by the hand-written unit tests.
    #[test]
    fn run_counts_always_partition_the_vcpu_array(
        states in prop::collection::vec(0u8..6, 1..16),
        idle_bits in prop::collection::vec(any::<bool>(), 1..16),
    ) {
        let n = states.len().min(idle_bits.len());
        let mut vsmp = Vsmp::new(leader(), n, false, 5);
        for i in 0..n {
            vsmp.vcpus[i].idle = idle_bits[i];
            vsmp.vcpus[i].run_state = match states[i] % 6 {
                0 => RunState::Run,
                1 => RunState::Ready,
                2 => RunState::Wait,
                3 => RunState::BusyWait,
                4 => RunState::New,
                _ => RunState::Zombie,
            };
        }
        vsmp.recompute_counts();
        prop_assert_eq!(vsmp.counts.total() as usize, n);
    }

    /// AllocModel normalization (spec §4.2 "Negative min/max clamp to 0 ...
    /// or 'no max'") must never produce a negative `min`, and resolved
    /// shares must stay within `[SHARES_MIN, SHARES_MAX]` no matter what
    /// raw bound or share count a caller supplies.
    #[test]
    fn normalized_alloc_block_always_respects_its_bounds(
        min_raw in -1_000_000i64..1_000_000,
        shares_raw in -1_000_000i64..1_000_000,
        total in 1i64..1_000_000,
        num_vcpus in 1u32..64,
    ) {
        let block = AllocBlock::normalize(
            Bound::Absolute(min_raw),
            None,
            SharesSpec::Explicit(shares_raw),
            0,
            None,
            Units::Percent,
            total,
            num_vcpus,
        );
        prop_assert!(block.min >= 0);
        prop_assert!(block.shares >= SHARES_MIN && block.shares <= SHARES_MAX);
    }
}

/// Invariant 8: "a successful reader sees a consistent snapshot ... no
/// writer completed an update between the matching reads." Drives a real
/// writer thread against many reader threads and asserts every observed
/// value was actually published by the writer at some point (no torn
/// read), matching scenario S6.
#[test]
fn versioned_cell_readers_never_observe_a_torn_value() {
    const WRITES: u64 = 5_000;

    let cell = Arc::new(VersionedCell::new(0u64));
    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let cell = cell.clone();
        let done = done.clone();
        thread::spawn(move || {
            for i in 1..=WRITES {
                cell.update(|v| *v = i);
            }
            done.store(true, Ordering::Release);
        })
    };

    let mut readers = Vec::new();
    for _ in 0..4 {
        let cell = cell.clone();
        let done = done.clone();
        readers.push(thread::spawn(move || {
            let mut last_seen = 0u64;
            while !done.load(Ordering::Acquire) {
                let v = cell.read();
                assert!(v <= WRITES, "read a value the writer never published: {v}");
                assert!(v >= last_seen, "reader observed time going backwards");
                last_seen = v;
            }
        }));
    }

    writer.join().unwrap();
    for r in readers {
        r.join().unwrap();
    }
    assert_eq!(cell.read(), WRITES);
}
