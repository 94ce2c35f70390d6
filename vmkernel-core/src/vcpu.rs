//! C3 VCPU state machine, wait-state tags, and per-vcpu stats.
//! Grounded on `examples/original_source/sched/cpusched.h`
//! (`CpuSched_State`, `CpuSched_WaitState`, `CpuSched_VcpuStats`) and
//! spec.md §4.3.

use bitflags::bitflags;

use vmkernel_hal::cpu::{CpuMask, PCpu};

use crate::sync::VersionedCell;

/// Run state of a vcpu (spec §4.3 "States (per vcpu)").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    New,
    Zombie,
    Run,
    Ready,
    ReadyCoRun,
    ReadyCoStop,
    Wait,
    BusyWait,
}

bitflags! {
    /// Orthogonal per-vcpu flags (spec §4.3 "Orthogonal flags").
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct RunFlags: u8 {
        const LIMBO = 1 << 0;
        const SWITCH_IN_PROGRESS = 1 << 1;
        const REMOVE_IN_PROGRESS = 1 << 2;
    }
}

/// Full wait-state tag set, carried forward verbatim from
/// `CpuSched_WaitState` (spec §C.4: "we use this full enum verbatim
/// ... rather than a truncated placeholder"). Purely informational; only
/// used for waker-side disambiguation and the trace/observability surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    None,
    Action,
    Aio,
    Driver,
    Fs,
    Idle,
    Lock,
    Semaphore,
    Mem,
    Net,
    Request,
    Rpc,
    Rtc,
    Scsi,
    Sleep,
    Tlb,
    WorldDeath,
    RwLock,
    SwapIn,
    SwapAio,
    SwapSlots,
    SwapDone,
    SwapCptFileOpen,
    SwapAsync,
    UwSigWait,
    UwPipeReader,
    UwPipeWriter,
    UwExitCollect,
    UwSleep,
    UwPoll,
    UwDebugger,
    UwProcDebug,
    UwUnixConnect,
    UwTerm,
}

/// Whether a wait may additionally be woken by `action_notify` (spec
/// §4.5 "Action wakeups").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionWakeup {
    Allowed,
    Disallowed,
}

/// A per-state meter: count, cycles elapsed, and a coarse histogram
/// bucket count (spec §3 "per-state meters (count, elapsed, histogram)").
#[derive(Debug, Clone, Copy, Default)]
pub struct StateMeter {
    pub count: u64,
    pub elapsed_cycles: u64,
    pub histogram: [u32; 8],
}

impl StateMeter {
    pub fn record(&mut self, cycles: u64) {
        self.count += 1;
        self.elapsed_cycles += cycles;
        let bucket = (64 - cycles.leading_zeros().min(63)) as usize % 8;
        self.histogram[bucket] += 1;
    }
}

/// Per-vcpu counters exported for observability (spec §C.5, full
/// `CpuSched_VcpuStats`), beyond the skew/migrate subset §4.3-4.4 call
/// out individually.
#[derive(Debug, Clone, Copy, Default)]
pub struct VcpuStats {
    pub world_switch: u64,
    pub migrate: u64,
    pub pkg_migrate: u64,
    pub wakeup_migrate_idle: u64,
    pub timer: u64,
    pub halt: u64,
    pub quantum_expire: u64,
    pub action_wakeup_check: u64,
    pub action_notify: u64,
    pub action_prevent_wait: [u64; 4],
    pub force_wakeup: [u64; 4],
    pub ht_whole_package_samples: u64,
    pub ht_total_samples: u64,
}

/// Charge-start timestamp pair, read off-cell via the versioned protocol
/// (spec §3 "charge-start timestamp pair guarded by versioned atomics").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChargeStart {
    pub cycles: u64,
    pub pcpu: PCpu,
}

/// One vcpu's complete scheduling state (spec §3 "VCPU state").
pub struct Vcpu {
    pub run_state: RunState,
    pub run_flags: RunFlags,
    pub wait_state: WaitState,
    pub wait_action_wakeup: ActionWakeup,
    pub wait_event: u32,
    pub affinity: CpuMask,
    pub phys_cpu: Option<PCpu>,
    pub handoff_cpu: Option<PCpu>,
    pub idle: bool,
    pub meters: [StateMeter; 8],
    pub charge_start: VersionedCell<ChargeStart>,
    pub charge_cycles_total: VersionedCell<u64>,
    pub system_overlap_cycles: u64,
    pub skew_index: i64,
    pub quantum_expire: u64,
    pub wakeup_latency_cycles: u64,
    pub preempt_disable_start: Option<u64>,
    pub preempt_disable_count: u32,
    pub preempt_disable_meter: StateMeter,
    pub action_wakeup_mask: u32,
    pub stats: VcpuStats,
    /// Halt cycles, attributed separately from useful `Run` cycles (spec
    /// §4.4 "Idle": "halt cycles are attributed separately from useful
    /// cycles").
    pub halt_cycles_total: u64,
}

impl Vcpu {
    pub fn new() -> Vcpu {
        Vcpu {
            run_state: RunState::New,
            run_flags: RunFlags::default(),
            wait_state: WaitState::None,
            wait_action_wakeup: ActionWakeup::Disallowed,
            wait_event: 0,
            affinity: CpuMask::ALL,
            phys_cpu: None,
            handoff_cpu: None,
            idle: false,
            meters: Default::default(),
            charge_start: VersionedCell::new(ChargeStart::default()),
            charge_cycles_total: VersionedCell::new(0),
            system_overlap_cycles: 0,
            skew_index: 0,
            quantum_expire: 0,
            wakeup_latency_cycles: 0,
            preempt_disable_start: None,
            preempt_disable_count: 0,
            preempt_disable_meter: StateMeter::default(),
            action_wakeup_mask: 0,
            stats: VcpuStats::default(),
            halt_cycles_total: 0,
        }
    }

    /// Disable preemption, recording a start timestamp on the 0→1
    /// transition (spec §4.4 "disabling is recorded with a timestamp").
    pub fn preempt_disable(&mut self, now_cycles: u64) {
        if self.preempt_disable_count == 0 {
            self.preempt_disable_start = Some(now_cycles);
        }
        self.preempt_disable_count += 1;
    }

    /// Re-enable preemption, histogramming the disabled duration on the
    /// 1→0 transition (spec §4.4 "histogrammed on re-enable").
    pub fn preempt_enable(&mut self, now_cycles: u64) {
        if self.preempt_disable_count == 0 {
            return;
        }
        self.preempt_disable_count -= 1;
        if self.preempt_disable_count == 0 {
            if let Some(start) = self.preempt_disable_start.take() {
                let elapsed = now_cycles.saturating_sub(start);
                self.preempt_disable_meter.record(elapsed);
            }
        }
    }

    /// Report the end of an idle halt (spec §4.4 "Idle":
    /// `idle_halt_end(from_intr)` reports the end of a halt; halt cycles
    /// are attributed separately from useful cycles"). `from_intr`
    /// distinguishes a halt ended by a hardware interrupt from one ended
    /// by an explicit reschedule, for the `halt` stats counter only.
    pub fn idle_halt_end(&mut self, halt_cycles: u64, from_intr: bool) {
        self.halt_cycles_total += halt_cycles;
        self.stats.halt += 1;
        let _ = from_intr;
    }

    /// Post a wakeup action. If the vcpu's current wait allows action
    /// wakeups, transition it to `Ready` immediately (spec §4.5 "Action
    /// wakeups").
    pub fn action_notify(&mut self, bits: u32) {
        self.action_wakeup_mask |= bits;
        self.stats.action_notify += 1;
        if self.run_state == RunState::Wait && self.wait_action_wakeup == ActionWakeup::Allowed {
            self.run_state = RunState::Ready;
            self.wait_state = WaitState::None;
        }
    }

    /// Unconditional wakeup bypassing the normal event match (spec §4.4
    /// "Forced wakeup"). Used only for cartel termination.
    pub fn force_wakeup(&mut self) {
        self.wait_state = WaitState::None;
        self.run_state = RunState::Ready;
    }

    /// Record that this vcpu stopped running after `elapsed` cycles,
    /// updating its state meter and the versioned charge counter (spec
    /// §4.4 "Charge on dispatch").
    pub fn charge(&mut self, elapsed: u64) {
        self.meters[RunState::Run as usize].record(elapsed);
        self.charge_cycles_total.update(|total| *total += elapsed);
    }
}

impl Default for Vcpu {
    fn default() -> Vcpu {
        Vcpu::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preempt_disable_enable_histograms_once_per_nesting_level() {
        let mut v = Vcpu::new();
        v.preempt_disable(100);
        v.preempt_disable(150);
        assert_eq!(v.preempt_disable_count, 2);
        v.preempt_enable(200);
        assert_eq!(v.preempt_disable_meter.count, 0, "still nested, no histogram yet");
        v.preempt_enable(250);
        assert_eq!(v.preempt_disable_meter.count, 1);
        assert_eq!(v.preempt_disable_meter.elapsed_cycles, 150);
    }

    #[test]
    fn idle_halt_end_accumulates_separately_from_run_charge() {
        let mut v = Vcpu::new();
        v.charge(100);
        v.idle_halt_end(40, true);
        v.idle_halt_end(10, false);
        assert_eq!(v.charge_cycles_total.read(), 100);
        assert_eq!(v.halt_cycles_total, 50);
        assert_eq!(v.stats.halt, 2);
    }

    #[test]
    fn action_notify_wakes_only_when_allowed() {
        let mut v = Vcpu::new();
        v.run_state = RunState::Wait;
        v.wait_state = WaitState::Sleep;
        v.wait_action_wakeup = ActionWakeup::Disallowed;
        v.action_notify(0x1);
        assert_eq!(v.run_state, RunState::Wait);

        v.wait_action_wakeup = ActionWakeup::Allowed;
        v.action_notify(0x2);
        assert_eq!(v.run_state, RunState::Ready);
        assert_eq!(v.wait_state, WaitState::None);
        assert_eq!(v.action_wakeup_mask, 0x3);
    }

    #[test]
    fn force_wakeup_clears_any_wait_state() {
        let mut v = Vcpu::new();
        v.run_state = RunState::Wait;
        v.wait_state = WaitState::WorldDeath;
        v.force_wakeup();
        assert_eq!(v.run_state, RunState::Ready);
        assert_eq!(v.wait_state, WaitState::None);
    }

    #[test]
    fn charge_accumulates_total_via_versioned_cell() {
        let mut v = Vcpu::new();
        v.charge(100);
        v.charge(50);
        assert_eq!(v.charge_cycles_total.read(), 150);
    }
}
