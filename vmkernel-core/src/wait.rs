//! C5 WaitEngine: wait/wakeup on opaque event IDs, timed waits, directed
//! yield, IRQ-safe wait. Grounded on
//! `examples/original_source/sched/sched.c` (`CpuSched_Wait`/
//! `CpuSched_Wakeup`) and spec.md §4.5.

extern crate alloc;

use alloc::vec::Vec;

use crate::error::{SchedError, SchedResult};
use crate::ids::WorldId;
use crate::vcpu::{RunState, WaitState};

/// Outcome of a completed wait (spec §7 "Waits return `Timeout` or
/// `DeathPending` only; successful wake is `Ok`").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Woken,
    Timeout,
    DeathPending,
}

/// One blocked world's wait-engine bookkeeping (spec §4.5 "Event
/// identity", "Scheduling model").
#[derive(Debug, Clone, Copy)]
struct Waiter {
    world: WorldId,
    event: u32,
    state: WaitState,
    deadline_cycles: Option<u64>,
}

/// Global table of currently suspended worlds. A single instance is
/// owned by the scheduler; callers serialize access via whatever lock
/// already guards the calling world's run state (spec §5 "Each vcpu: one
/// IRQ lock ... for its sleep-event").
#[derive(Default)]
pub struct WaitEngine {
    waiters: Vec<Waiter>,
}

impl WaitEngine {
    pub fn new() -> WaitEngine {
        WaitEngine { waiters: Vec::new() }
    }

    /// Register `world` as waiting on `event` (spec §4.5 "A call to
    /// `wait(event, state, opt_lock)` atomically releases the given lock
    /// ... transitions the current vcpu to `Wait[state]`"). Releasing the
    /// caller-supplied lock and the scheduler yield itself are the cell
    /// scheduler's responsibility (`crate::cell`); this only records the
    /// wait-table entry.
    pub fn begin_wait(&mut self, world: WorldId, event: u32, state: WaitState, deadline_cycles: Option<u64>) {
        self.waiters.push(Waiter {
            world,
            event,
            state,
            deadline_cycles,
        });
    }

    /// Wake every world waiting on `event` (spec §4.5 "Wakeup semantics":
    /// "wakes *all* worlds whose `waitEvent == event` and `waitState !=
    /// None`"). A wakeup on an event with no waiters is a no-op.
    /// Returns the woken world ids so the caller can transition their
    /// run states to `Ready`.
    pub fn wakeup(&mut self, event: u32) -> Vec<WorldId> {
        let mut woken = Vec::new();
        self.waiters.retain(|w| {
            if w.event == event && w.state != WaitState::None {
                woken.push(w.world);
                false
            } else {
                true
            }
        });
        woken
    }

    /// Advance the deadline clock, returning worlds whose timed wait has
    /// expired (spec §4.5 "Timed variants add a deadline").
    pub fn expire_deadlines(&mut self, now_cycles: u64) -> Vec<WorldId> {
        let mut expired = Vec::new();
        self.waiters.retain(|w| {
            if let Some(d) = w.deadline_cycles {
                if now_cycles >= d {
                    expired.push(w.world);
                    return false;
                }
            }
            true
        });
        expired
    }

    /// Remove `world` from the wait table unconditionally (used by
    /// `force_wakeup` and cartel termination, spec §4.4 "Forced
    /// wakeup").
    pub fn cancel(&mut self, world: WorldId) {
        self.waiters.retain(|w| w.world != world);
    }

    pub fn is_waiting(&self, world: WorldId) -> bool {
        self.waiters.iter().any(|w| w.world == world)
    }
}

/// Evaluate a single world's suspension request against cancellation
/// signals before it actually blocks (spec §4.5 "Cancellation":
/// `deathPending` checked "at every wait point"; spec §7 "`DeathPending`
/// is not recovered; every caller propagates immediately").
pub fn check_suspension_allowed(death_pending: bool) -> SchedResult<()> {
    if death_pending {
        return Err(SchedError::DeathPending);
    }
    Ok(())
}

/// Directed yield: hand the CPU to `target` instead of the normal
/// dispatch choice, without changing cancellation semantics (spec §4.5
/// "`WaitDirectedYield` additionally hands the CPU to a specified peer
/// world"; §5 "the donated time is still accounted to the donor").
#[derive(Debug, Clone, Copy)]
pub struct DirectedYield {
    pub donor: WorldId,
    pub target: WorldId,
}

/// The run-state transition a successful `wait()` call performs before
/// yielding to the cell scheduler (spec §4.5 "transitions the current
/// vcpu to `Wait[state]`").
pub fn enter_wait_run_state() -> RunState {
    RunState::Wait
}

#[cfg(test)]
mod tests {
    use super::*;

    fn w(slot: u32) -> WorldId {
        WorldId { slot, reinc: 0 }
    }

    #[test]
    fn wakeup_on_idle_event_is_a_no_op() {
        let mut engine = WaitEngine::new();
        assert!(engine.wakeup(0xdead).is_empty());
    }

    #[test]
    fn wakeup_wakes_every_waiter_on_the_event_exactly_once() {
        let mut engine = WaitEngine::new();
        engine.begin_wait(w(1), 42, WaitState::Sleep, None);
        engine.begin_wait(w(2), 42, WaitState::Lock, None);
        engine.begin_wait(w(3), 7, WaitState::Sleep, None);
        let mut woken = engine.wakeup(42);
        woken.sort_by_key(|id| id.slot);
        assert_eq!(woken, alloc::vec![w(1), w(2)]);
        assert!(!engine.is_waiting(w(1)));
        assert!(engine.is_waiting(w(3)));
        // A second wakeup on the same event finds nobody left.
        assert!(engine.wakeup(42).is_empty());
    }

    #[test]
    fn expired_deadlines_are_reported_once() {
        let mut engine = WaitEngine::new();
        engine.begin_wait(w(1), 1, WaitState::Sleep, Some(100));
        engine.begin_wait(w(2), 1, WaitState::Sleep, Some(200));
        let expired = engine.expire_deadlines(150);
        assert_eq!(expired, alloc::vec![w(1)]);
        assert!(engine.is_waiting(w(2)));
    }

    #[test]
    fn death_pending_blocks_suspension() {
        assert_eq!(
            check_suspension_allowed(true).unwrap_err(),
            SchedError::DeathPending
        );
        assert!(check_suspension_allowed(false).is_ok());
    }
}
