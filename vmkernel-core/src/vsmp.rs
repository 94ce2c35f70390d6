//! C3 VSMP: co-run aggregation, HT sharing/quarantine, skew detection,
//! affinity aggregation. Grounded on
//! `examples/original_source/sched/cpusched.h` (`CpuSched_Vsmp`) and
//! spec.md §4.3.

extern crate alloc;

use alloc::vec::Vec;

use bitflags::bitflags;

use vmkernel_hal::cpu::CpuMask;

use crate::ids::WorldId;
use crate::vcpu::{RunState, Vcpu};

/// Aggregate co-scheduling state of a vsmp (spec §4.3 "Aggregation").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoRunState {
    CoRun,
    CoReady,
    CoStop,
    None,
}

/// Hyperthread sharing policy (spec §4.3 "Hyperthread policy").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HtSharing {
    Any,
    Internal,
    None,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HtQuarantineStats {
    pub num_quarantines: u64,
    pub quarantine_periods: u64,
}

/// Skew-detection counters (spec §4.3 "Stats counters
/// samples/good/bad/resched/ignore/intraSkewSamples/intraSkewOut").
#[derive(Debug, Clone, Copy, Default)]
pub struct SkewStats {
    pub samples: u64,
    pub good: u64,
    pub bad: u64,
    pub resched: u64,
    pub ignore: u64,
    pub intra_skew_samples: u64,
    pub intra_skew_out: u64,
}

/// Virtual-time context for proportional-share dispatch (spec §4.4
/// "Virtual time"; spec §3 "virtual-time context").
#[derive(Debug, Clone, Copy, Default)]
pub struct VtimeContext {
    pub main: u64,
    pub extra: u64,
    pub stride: u64,
    pub normalized_stride: u64,
    pub bonus_cycles_total: u64,
}

bitflags! {
    /// Affinity flags aggregated across a vsmp's vcpus (spec §4.3
    /// "Affinity").
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct AffinityFlags: u8 {
        const CONSTRAINED = 1 << 0;
        const JOINT = 1 << 1;
        const HARD = 1 << 2;
    }
}

/// Counts over the vcpu array, kept equal to the live state at all times
/// (spec invariant 4: "nRun + nWait + nIdle == |vcpus|").
#[derive(Debug, Clone, Copy, Default)]
pub struct RunCounts {
    pub n_run: u32,
    pub n_wait: u32,
    pub n_idle: u32,
}

impl RunCounts {
    pub fn total(&self) -> u32 {
        self.n_run + self.n_wait + self.n_idle
    }
}

/// The co-scheduled group of vcpus belonging to one VM (spec §3 "VSMP").
pub struct Vsmp {
    pub leader: WorldId,
    pub vcpus: Vec<Vcpu>,
    pub co_run_state: CoRunState,
    pub strict_cosched: bool,
    pub counts: RunCounts,
    pub vtime: VtimeContext,
    pub max_rate_stride: Option<u64>,
    pub quantum_expire: u64,
    pub affinity: AffinityFlags,
    pub ht_sharing: HtSharing,
    pub ht_quarantine: bool,
    pub ht_quarantine_stats: HtQuarantineStats,
    pub skew: SkewStats,
    pub skew_threshold: i64,
    /// NUMA home node (spec §3 "VSMP ... NUMA home info"), set once at
    /// initial placement. The balancer that revises it (`numasched.h`'s
    /// `NUMASched_*`) is a separate subsystem out of scope for this crate;
    /// only the field the scheduler reads for affinity scoring lives here.
    pub home_node: Option<u32>,
}

impl Vsmp {
    pub fn new(leader: WorldId, num_vcpus: usize, strict_cosched: bool, skew_threshold: i64) -> Vsmp {
        let mut vcpus = Vec::with_capacity(num_vcpus);
        vcpus.resize_with(num_vcpus, Vcpu::new);
        Vsmp {
            leader,
            vcpus,
            co_run_state: CoRunState::None,
            strict_cosched,
            counts: RunCounts {
                n_idle: 0,
                n_run: 0,
                n_wait: num_vcpus as u32,
            },
            vtime: VtimeContext::default(),
            max_rate_stride: None,
            quantum_expire: 0,
            affinity: AffinityFlags::default(),
            ht_sharing: HtSharing::Any,
            ht_quarantine: false,
            ht_quarantine_stats: HtQuarantineStats::default(),
            skew: SkewStats::default(),
            skew_threshold,
            home_node: None,
        }
    }

    /// Recompute `counts` from the live vcpu array (spec §4.3
    /// "nRun/nWait/nIdle invariants always equal the counts over the
    /// vcpu array; updated atomically under the vsmp's vcpu-array lock").
    /// Callers own the vsmp's lock; this module does not take one itself
    /// so it composes with whatever lock the owning `Cell` already holds.
    pub fn recompute_counts(&mut self) {
        let mut counts = RunCounts::default();
        for v in &self.vcpus {
            if v.idle {
                counts.n_idle += 1;
            } else {
                match v.run_state {
                    RunState::Run | RunState::Ready | RunState::ReadyCoRun | RunState::ReadyCoStop => {
                        counts.n_run += 1
                    }
                    RunState::Wait | RunState::BusyWait | RunState::New | RunState::Zombie => {
                        counts.n_wait += 1
                    }
                }
            }
        }
        self.counts = counts;
    }

    /// Enforce strict co-scheduling: if any vcpu is `Run`, every
    /// non-waiting sibling must be `Run` or `ReadyCoRun`; violators are
    /// pushed to `ReadyCoStop` (spec §4.3 "Aggregation").
    pub fn enforce_strict_cosched(&mut self) {
        if !self.strict_cosched {
            return;
        }
        let any_running = self.vcpus.iter().any(|v| v.run_state == RunState::Run);
        if !any_running {
            return;
        }
        for v in &mut self.vcpus {
            if v.idle {
                continue;
            }
            match v.run_state {
                RunState::Run | RunState::ReadyCoRun => {}
                RunState::Wait | RunState::BusyWait => {}
                RunState::Ready if v.idle => {}
                _ => {
                    v.run_state = RunState::ReadyCoStop;
                    self.co_run_state = CoRunState::CoStop;
                }
            }
        }
    }

    /// Recompute the aggregated affinity flags from the current vcpu
    /// array (spec §4.3 "Affinity"). `CPUSCHED_AFFINITY_NONE` (an
    /// all-zero mask) is substituted for `ALL` before this runs, per
    /// §C.1's normalization note.
    pub fn recompute_affinity(&mut self, hard: bool) {
        let masks: Vec<CpuMask> = self
            .vcpus
            .iter()
            .map(|v| if v.affinity.is_empty() { CpuMask::ALL } else { v.affinity })
            .collect();
        let constrained = masks.iter().any(|m| *m != CpuMask::ALL);
        let joint = masks.windows(2).all(|w| w[0] == w[1]) || masks.len() <= 1;
        let mut flags = AffinityFlags::empty();
        flags.set(AffinityFlags::CONSTRAINED, constrained);
        flags.set(AffinityFlags::JOINT, joint);
        flags.set(AffinityFlags::HARD, hard);
        self.affinity = flags;
    }

    /// Sample intra-vsmp skew across runnable vcpus on a scheduling tick
    /// (spec §4.3 "Skew detection"). Vcpus ahead past the threshold are
    /// marked `ReadyCoStop`; behind vcpus are flagged urgent via their
    /// own `skew_index` sign. Returns the indices pushed to `ReadyCoStop`.
    pub fn sample_skew(&mut self) -> Vec<usize> {
        let runnable: Vec<usize> = self
            .vcpus
            .iter()
            .enumerate()
            .filter(|(_, v)| matches!(v.run_state, RunState::Run | RunState::Ready | RunState::ReadyCoRun))
            .map(|(i, _)| i)
            .collect();
        if runnable.len() <= 1 {
            return Vec::new();
        }
        self.skew.samples += 1;
        self.skew.intra_skew_samples += runnable.len() as u64;
        let min_index = runnable
            .iter()
            .map(|&i| self.vcpus[i].skew_index)
            .min()
            .unwrap_or(0);
        let mut stopped = Vec::new();
        for &i in &runnable {
            let delta = self.vcpus[i].skew_index - min_index;
            if delta > self.skew_threshold {
                self.vcpus[i].run_state = RunState::ReadyCoStop;
                self.skew.bad += 1;
                self.skew.intra_skew_out += 1;
                stopped.push(i);
            } else {
                self.skew.good += 1;
            }
        }
        if !stopped.is_empty() {
            self.skew.resched += 1;
        } else {
            self.skew.ignore += 1;
        }
        stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leader() -> WorldId {
        WorldId { slot: 0, reinc: 0 }
    }

    #[test]
    fn recompute_counts_matches_invariant_4() {
        let mut vsmp = Vsmp::new(leader(), 4, false, 5);
        vsmp.vcpus[0].run_state = RunState::Run;
        vsmp.vcpus[1].run_state = RunState::Ready;
        vsmp.vcpus[2].run_state = RunState::Wait;
        vsmp.vcpus[3].idle = true;
        vsmp.recompute_counts();
        assert_eq!(vsmp.counts.total(), 4);
        assert_eq!(vsmp.counts.n_run, 2);
        assert_eq!(vsmp.counts.n_wait, 1);
        assert_eq!(vsmp.counts.n_idle, 1);
    }

    #[test]
    fn strict_cosched_pushes_stragglers_to_co_stop() {
        let mut vsmp = Vsmp::new(leader(), 2, true, 5);
        vsmp.vcpus[0].run_state = RunState::Run;
        vsmp.vcpus[1].run_state = RunState::Ready;
        vsmp.enforce_strict_cosched();
        assert_eq!(vsmp.vcpus[1].run_state, RunState::ReadyCoStop);
        assert_eq!(vsmp.co_run_state, CoRunState::CoStop);
    }

    #[test]
    fn affinity_none_masks_normalize_to_unconstrained() {
        let mut vsmp = Vsmp::new(leader(), 2, false, 5);
        vsmp.vcpus[0].affinity = CpuMask::NONE;
        vsmp.vcpus[1].affinity = CpuMask::NONE;
        vsmp.recompute_affinity(false);
        assert!(!vsmp.affinity.contains(AffinityFlags::CONSTRAINED));
        assert!(vsmp.affinity.contains(AffinityFlags::JOINT));
    }

    #[test]
    fn skew_beyond_threshold_marks_ready_co_stop() {
        let mut vsmp = Vsmp::new(leader(), 2, false, 3);
        vsmp.vcpus[0].run_state = RunState::Run;
        vsmp.vcpus[0].skew_index = 0;
        vsmp.vcpus[1].run_state = RunState::Ready;
        vsmp.vcpus[1].skew_index = 10;
        let stopped = vsmp.sample_skew();
        assert_eq!(stopped, alloc::vec![1]);
        assert_eq!(vsmp.vcpus[1].run_state, RunState::ReadyCoStop);
    }
}
