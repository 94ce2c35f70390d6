//! Ranked LIFO semaphores and RW-semaphores (spec §4.5 "Semaphores").
//! Grounded on `examples/original_source/main/semaphore.c`
//! (`Semaphore_Init`'s `ASSERT(rank == SEMA_RANK_UNRANKED)` for non-binary
//! semaphores) and spec.md §C.6.

extern crate alloc;

use alloc::vec::Vec;

use crate::error::{SchedError, SchedResult};

/// A semaphore's position in the global rank order, or unranked. Per spec
/// §C.6, only binary (`count == 1`) semaphores may carry a rank; counting
/// semaphores must be `Unranked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Rank {
    Unranked,
    Ranked(u32),
}

/// A counting semaphore with an optional rank. Acquiring a ranked
/// semaphore requires its rank to exceed the caller's current
/// held-semaphore stack top (spec §4.5 "Ranked semaphores").
pub struct Semaphore {
    count: i64,
    rank: Rank,
}

impl Semaphore {
    /// Construct a semaphore. `debug_assert`s that non-binary (`count !=
    /// 1`) semaphores are `Unranked`, mirroring the original's
    /// `ASSERT(rank == SEMA_RANK_UNRANKED)` for counting semaphores.
    pub fn new(count: i64, rank: Rank) -> Semaphore {
        debug_assert!(
            count == 1 || rank == Rank::Unranked,
            "counting semaphores must be unranked"
        );
        Semaphore { count, rank }
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn count(&self) -> i64 {
        self.count
    }

    /// Decrement, blocking conceptually if the result would go negative.
    /// The caller (wait engine) is responsible for suspension; this
    /// method only performs the arithmetic and reports whether the
    /// acquire would have to wait.
    pub fn try_acquire(&mut self) -> bool {
        if self.count > 0 {
            self.count -= 1;
            true
        } else {
            false
        }
    }

    pub fn release(&mut self) {
        self.count += 1;
    }
}

/// Per-world stack of currently held ranked semaphores, enforcing the
/// global LIFO/strictly-increasing-rank order (spec §4.5, invariant 6:
/// "the stack of held ranked semaphores has strictly increasing ranks
/// from bottom to top").
#[derive(Default)]
pub struct HeldSemaphores {
    stack: Vec<(u32, Rank)>,
}

impl HeldSemaphores {
    pub fn new() -> HeldSemaphores {
        HeldSemaphores { stack: Vec::new() }
    }

    /// Record acquisition of `sema` (identified by `id`). Unranked
    /// semaphores are exempt from the ordering check (spec: "Unranked
    /// semaphores are exempt").
    pub fn push_acquire(&mut self, id: u32, rank: Rank) -> SchedResult<()> {
        if let Rank::Ranked(r) = rank {
            if let Some(&(_, top)) = self.stack.last() {
                match top {
                    Rank::Ranked(top_r) if r > top_r => {}
                    Rank::Unranked => {}
                    Rank::Ranked(_) => return Err(SchedError::BadParam),
                }
            }
        }
        self.stack.push((id, rank));
        Ok(())
    }

    /// Record release of `id`. Must be the most recently acquired ranked
    /// semaphore still held (spec: "a world may not release a semaphore
    /// that is not the most recently acquired ranked semaphore it
    /// holds").
    pub fn pop_release(&mut self, id: u32) -> SchedResult<()> {
        match self.stack.last() {
            Some(&(top_id, _)) if top_id == id => {
                self.stack.pop();
                Ok(())
            }
            _ => Err(SchedError::BadParam),
        }
    }
}

/// The side of an RW-semaphore a holder acquired (spec §4.5 "RW-lock
/// variants know whether they hold the read side or write side").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RwSide {
    Shared,
    Exclusive,
}

/// Counting RW-semaphore with a single upgrade-waiter slot (spec §4.5
/// "RW-semaphores additionally model an upgrade waiter slot").
pub struct RwSemaphore {
    readers: u32,
    writer: bool,
    upgrade_pending: bool,
}

impl RwSemaphore {
    pub fn new() -> RwSemaphore {
        RwSemaphore {
            readers: 0,
            writer: false,
            upgrade_pending: false,
        }
    }

    pub fn try_acquire_shared(&mut self) -> bool {
        if self.writer {
            return false;
        }
        self.readers += 1;
        true
    }

    pub fn try_acquire_exclusive(&mut self) -> bool {
        if self.writer || self.readers > 0 {
            return false;
        }
        self.writer = true;
        true
    }

    /// Attempt to upgrade a held shared lock to exclusive. Fails with
    /// `Busy` if another upgrade is already pending (spec:
    /// "`UpgradeFromShared` returns `Busy` if another upgrade is already
    /// pending"); succeeds only once this is the sole reader.
    pub fn upgrade_from_shared(&mut self) -> SchedResult<bool> {
        if self.upgrade_pending {
            return Err(SchedError::Busy);
        }
        if self.readers == 1 {
            self.readers = 0;
            self.writer = true;
            return Ok(true);
        }
        self.upgrade_pending = true;
        Ok(false)
    }

    /// Complete a previously-pending upgrade once this becomes the sole
    /// reader. Returns `true` once the upgrade has succeeded.
    pub fn poll_upgrade(&mut self) -> bool {
        if self.upgrade_pending && self.readers == 1 {
            self.readers = 0;
            self.writer = true;
            self.upgrade_pending = false;
            true
        } else {
            false
        }
    }

    /// Downgrade exclusive to shared. Never fails; wakes shared waiters
    /// if no exclusive waiter exists (spec: "Downgrade from exclusive to
    /// shared is non-failing"). Waking is the wait engine's job; this
    /// only flips internal state.
    pub fn downgrade(&mut self) {
        debug_assert!(self.writer);
        self.writer = false;
        self.readers = 1;
    }

    pub fn release_shared(&mut self) {
        debug_assert!(self.readers > 0);
        self.readers -= 1;
    }

    pub fn release_exclusive(&mut self) {
        debug_assert!(self.writer);
        self.writer = false;
    }
}

impl Default for RwSemaphore {
    fn default() -> RwSemaphore {
        RwSemaphore::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranked_stack_enforces_strictly_increasing_order() {
        let mut held = HeldSemaphores::new();
        held.push_acquire(1, Rank::Ranked(10)).unwrap();
        held.push_acquire(2, Rank::Ranked(20)).unwrap();
        held.push_acquire(3, Rank::Ranked(30)).unwrap();
        assert!(held.push_acquire(4, Rank::Ranked(15)).is_err());
    }

    #[test]
    fn release_out_of_order_is_rejected() {
        let mut held = HeldSemaphores::new();
        held.push_acquire(1, Rank::Ranked(10)).unwrap();
        held.push_acquire(2, Rank::Ranked(20)).unwrap();
        assert!(held.pop_release(1).is_err());
        assert!(held.pop_release(2).is_ok());
        assert!(held.pop_release(1).is_ok());
    }

    #[test]
    fn upgrade_from_shared_succeeds_when_sole_reader() {
        let mut rw = RwSemaphore::new();
        assert!(rw.try_acquire_shared());
        let upgraded = rw.upgrade_from_shared().unwrap();
        assert!(upgraded);
        assert!(rw.writer);
    }

    #[test]
    fn upgrade_from_shared_rejects_second_pending_upgrade() {
        let mut rw = RwSemaphore::new();
        rw.try_acquire_shared();
        rw.try_acquire_shared();
        let first = rw.upgrade_from_shared().unwrap();
        assert!(!first);
        assert_eq!(rw.upgrade_from_shared().unwrap_err(), SchedError::Busy);
    }

    #[test]
    fn downgrade_is_non_failing_and_leaves_one_reader() {
        let mut rw = RwSemaphore::new();
        assert!(rw.try_acquire_exclusive());
        rw.downgrade();
        assert_eq!(rw.readers, 1);
        assert!(!rw.writer);
    }
}
