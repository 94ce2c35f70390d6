//! C4 Cell scheduler: per-cell ready queues, virtual-time accounting,
//! stride math, quantum/preemption, idle handling. Grounded on
//! `examples/original_source/sched/sched.c` (`CpuSchedDispatch`,
//! `CpuSchedChargeVtime`) and spec.md §4.4.

extern crate alloc;

use alloc::vec::Vec;

use vmkernel_hal::cpu::{CpuMask, PCpu};

use crate::sync::{IrqLock, VersionedCell};
use crate::tree::GroupPath;

/// `SCHED_STRIDE_TOTAL / effective_shares` (spec §4.4 "Virtual time").
/// A large fixed numerator keeps stride precision stable across the
/// spec's share range (`[0, 100_000]`).
pub const STRIDE_TOTAL: u64 = 1 << 32;

pub fn stride_for_shares(effective_shares: i64) -> u64 {
    if effective_shares <= 0 {
        return STRIDE_TOTAL;
    }
    STRIDE_TOTAL / effective_shares as u64
}

/// Dispatch key: `(group.vtime, vsmp.vtime.main)` ascending, then
/// wakeup order, matching spec §4.4 "Dispatch order and tie-breaks".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DispatchKey {
    pub group_vtime: u64,
    pub vsmp_vtime_main: u64,
    pub wakeup_seq: u64,
}

/// One runnable vsmp's queue entry.
#[derive(Debug, Clone, Copy)]
pub struct ReadyEntry {
    pub vsmp_slot: u32,
    pub key: DispatchKey,
    pub affinity: CpuMask,
}

/// Bonus/lag bookkeeping for one vsmp (spec §4.4 "Bonus/lag bounding").
#[derive(Debug, Clone, Copy, Default)]
pub struct LagBounds {
    pub bound_lag_behind: u64,
    pub bound_lag_ahead: u64,
    pub bound_lag_total: u64,
}

impl LagBounds {
    /// Clamp `delta` (vtime minus the cell's reference vtime) into
    /// `[-ahead_ceiling, behind_ceiling]`, counting every clamp (spec:
    /// "bounded by a ceiling in both directions ... so a long-blocked
    /// vsmp cannot monopolize the CPU on wakeup").
    pub fn clamp(&mut self, delta: i64, ahead_ceiling: u64, behind_ceiling: u64) -> i64 {
        if delta < 0 && (-delta) as u64 > ahead_ceiling {
            self.bound_lag_ahead += 1;
            self.bound_lag_total += 1;
            return -(ahead_ceiling as i64);
        }
        if delta > 0 && delta as u64 > behind_ceiling {
            self.bound_lag_behind += 1;
            self.bound_lag_total += 1;
            return behind_ceiling as i64;
        }
        delta
    }
}

/// Mutable per-cell state guarded by the cell's IRQ lock (spec §4.4
/// "Cells ... its own IRQ-disabling lock").
struct CellState {
    ready: Vec<ReadyEntry>,
    wakeup_clock: u64,
    pcpu_running: Vec<Option<u32>>,
    reschedule_pending: Vec<bool>,
    handoff: Vec<Option<(u32, PCpu)>>,
    cell_migrate: u64,
    group_vtime: Vec<VersionedCell<u64>>,
}

/// A statically partitioned subset of PCPUs sharing one scheduler lock
/// (spec §3 GLOSSARY "Cell").
pub struct Cell {
    pcpus: Vec<PCpu>,
    state: IrqLock<CellState>,
}

impl Cell {
    pub fn new(pcpus: Vec<PCpu>, max_groups: usize) -> Cell {
        let n = pcpus.len();
        let mut group_vtime = Vec::with_capacity(max_groups);
        group_vtime.resize_with(max_groups, || VersionedCell::new(0));
        Cell {
            pcpus,
            state: IrqLock::new(CellState {
                ready: Vec::new(),
                wakeup_clock: 0,
                pcpu_running: alloc::vec![None; n],
                reschedule_pending: alloc::vec![false; n],
                handoff: alloc::vec![None; n],
                cell_migrate: 0,
                group_vtime,
            }),
        }
    }

    /// Insert a vsmp into the ready queue at its current dispatch key
    /// (spec §4.4 "Dispatch order and tie-breaks").
    pub fn enqueue(&self, vsmp_slot: u32, group_vtime: u64, vsmp_vtime_main: u64, affinity: CpuMask) {
        let mut st = self.state.lock();
        let seq = st.wakeup_clock;
        st.wakeup_clock += 1;
        st.ready.push(ReadyEntry {
            vsmp_slot,
            key: DispatchKey {
                group_vtime,
                vsmp_vtime_main,
                wakeup_seq: seq,
            },
            affinity,
        });
    }

    /// Pick the next vsmp to run on `pcpu`, honoring affinity as a filter
    /// and a pending handoff as an override (spec §4.4: "Handoff
    /// (`pcpuHandoff`) overrides normal selection once and is then
    /// cleared"; "if the highest-priority eligible vsmp has no PCPU
    /// in-mask on this cell, pick the next").
    pub fn dispatch(&self, pcpu: PCpu) -> Option<u32> {
        let mut st = self.state.lock();
        let pcpu_idx = self.index_of(pcpu)?;

        if let Some((vsmp_slot, target)) = st.handoff[pcpu_idx] {
            if target == pcpu {
                st.handoff[pcpu_idx] = None;
                st.ready.retain(|e| e.vsmp_slot != vsmp_slot);
                return Some(vsmp_slot);
            }
        }

        let mut best_idx = None;
        let mut best_key = None;
        for (i, entry) in st.ready.iter().enumerate() {
            if !entry.affinity.is_all() && !entry.affinity.is_set(pcpu) {
                continue;
            }
            if best_key.is_none() || Some(entry.key) < best_key {
                best_key = Some(entry.key);
                best_idx = Some(i);
            }
        }
        let idx = best_idx?;
        Some(st.ready.remove(idx).vsmp_slot)
    }

    /// Set a one-shot handoff target, overriding the next `dispatch` on
    /// `target` (spec §4.4 "Handoff").
    pub fn set_handoff(&self, vsmp_slot: u32, target: PCpu) {
        if let Some(idx) = self.index_of(target) {
            self.state.lock().handoff[idx] = Some((vsmp_slot, target));
        }
    }

    /// Charge `cycles` of consumption against a vsmp's vtime and
    /// propagate `cycles / effective_shares` up every group in
    /// `path` (spec §4.4 "Charge on dispatch"; "Propagation is under the
    /// tree lock; reads of group vtime for scheduling use the versioned
    /// protocol"). `effective_shares` is the already-normalized share
    /// count for each group along the path, indexed the same way.
    pub fn charge_vtime(&self, path: &GroupPath, effective_shares: &[i64], cycles: u64) {
        let st = self.state.lock();
        for (slot_id, &shares) in path.ids.iter().zip(effective_shares.iter()) {
            let Some(gid) = slot_id else { continue };
            let stride = stride_for_shares(shares);
            let delta = (cycles as u128 * stride as u128 / STRIDE_TOTAL as u128) as u64;
            let idx = gid.slot as usize;
            if idx < st.group_vtime.len() {
                st.group_vtime[idx].update(|v| *v += delta);
            }
        }
    }

    pub fn group_vtime(&self, group_slot: u32) -> u64 {
        let st = self.state.lock();
        st.group_vtime
            .get(group_slot as usize)
            .map(|c| c.read())
            .unwrap_or(0)
    }

    /// Mark `pcpu` for reschedule at its next safe point (spec §4.4
    /// "it may mark the current PCPU for reschedule").
    pub fn mark_reschedule(&self, pcpu: PCpu) {
        if let Some(idx) = self.index_of(pcpu) {
            self.state.lock().reschedule_pending[idx] = true;
        }
    }

    pub fn take_reschedule(&self, pcpu: PCpu) -> bool {
        match self.index_of(pcpu) {
            Some(idx) => core::mem::take(&mut self.state.lock().reschedule_pending[idx]),
            None => false,
        }
    }

    /// Run the per-tick handler: check quantum expiry, mark reschedule if
    /// the deadline has passed (spec §4.4 "Quantum & preemption").
    /// Returns `true` if the current vcpu on `pcpu` should be
    /// rescheduled.
    pub fn timer_interrupt(&self, pcpu: PCpu, now_cycles: u64, quantum_expire: u64) -> bool {
        if now_cycles >= quantum_expire {
            self.mark_reschedule(pcpu);
            true
        } else {
            false
        }
    }

    /// Record an inter-cell migration (spec §4.4 "Inter-cell migration is
    /// an explicit bounded operation counted in `cellMigrate`").
    pub fn record_migration(&self) {
        self.state.lock().cell_migrate += 1;
    }

    pub fn cell_migrate_count(&self) -> u64 {
        self.state.lock().cell_migrate
    }

    fn index_of(&self, pcpu: PCpu) -> Option<usize> {
        self.pcpus.iter().position(|&p| p == pcpu)
    }
}
