#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

//! `vmkernel_sched` — the thin top-level crate gluing the HAL, the
//! x86_64 backend, and the scheduler core together, the way the
//! teacher's root crate sequences `hal_init`, `security_init`, and the
//! rest of its subsystems behind one `init()` call.

extern crate alloc;

pub use vmkernel_core::*;

use vmkernel_core::config::SchedConfig;

/// Bring up the scheduler: register the architecture backend, then
/// build the predefined group tree under `cfg`.
///
/// Mirrors the teacher's `init()` ordering — HAL first, then the
/// subsystem that depends on it — narrowed to this workspace's single
/// subsystem in scope.
#[cfg(feature = "x86_64")]
pub fn init(cfg: SchedConfig, tsc_hz: u64) -> Result<SchedCore, SchedError> {
    static ARCH: spin::Once<vmkernel_x86_64::X86ArchOps> = spin::Once::new();
    let ops = ARCH.call_once(|| vmkernel_x86_64::X86ArchOps::new(tsc_hz));
    vmkernel_hal::arch::register(ops);
    SchedCore::init(cfg)
}

/// Bring up the scheduler against an already-registered architecture
/// backend (used by hosts that bring their own `ArchOps`, e.g. a
/// different target than x86_64, or a test harness).
pub fn init_with_registered_arch(cfg: SchedConfig) -> Result<SchedCore, SchedError> {
    SchedCore::init(cfg)
}
