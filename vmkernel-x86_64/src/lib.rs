#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

//! x86_64 backend for `vmkernel-hal`: IRQ save/restore, TSC cycle reads, and
//! the segment-limited user copy primitives backing `CopyIn`/`CopyOut`.

pub mod irq;
pub mod usercopy;

use core::sync::atomic::{AtomicU32, Ordering};
use vmkernel_hal::arch::{ArchOps, IrqFlags};
use vmkernel_hal::cpu::PCpu;

/// x86_64-specific error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum X86Error {
    TscUnavailable,
}

/// x86_64 implementation of [`ArchOps`].
///
/// `tsc_hz` is the calibrated TSC frequency; calibration itself (PIT/HPET
/// cross-check) is a boot-time collaborator out of scope for this crate —
/// callers pass in an already-calibrated value.
pub struct X86ArchOps {
    tsc_hz: u64,
}

impl X86ArchOps {
    pub const fn new(tsc_hz: u64) -> Self {
        Self { tsc_hz }
    }
}

impl ArchOps for X86ArchOps {
    fn irq_disable_save(&self) -> IrqFlags {
        irq::disable_save()
    }

    unsafe fn irq_restore(&self, flags: IrqFlags) {
        unsafe { irq::restore(flags) }
    }

    fn irq_enabled(&self) -> bool {
        x86_64::instructions::interrupts::are_enabled()
    }

    fn read_cycles(&self) -> u64 {
        unsafe { core::arch::x86_64::_rdtsc() }
    }

    fn cycles_to_ns(&self, cycles: u64) -> u64 {
        if self.tsc_hz == 0 {
            return 0;
        }
        ((cycles as u128) * 1_000_000_000 / self.tsc_hz as u128) as u64
    }

    fn current_pcpu(&self) -> PCpu {
        CURRENT_PCPU.load(Ordering::Relaxed)
    }

    unsafe fn raw_copy_in(&self, seg: u16, dst: *mut u8, src: usize, len: usize) {
        unsafe { usercopy::raw_copy_in(usercopy::UserSegment(seg), dst, src, len) }
    }

    unsafe fn raw_copy_out(&self, seg: u16, dst: usize, src: *const u8, len: usize) {
        unsafe { usercopy::raw_copy_out(usercopy::UserSegment(seg), dst, src, len) }
    }
}

/// Set by the (out-of-scope) SMP bring-up path when a PCPU comes online.
/// `vmkernel-core` never writes this; it only reads `current_pcpu()`.
static CURRENT_PCPU: AtomicU32 = AtomicU32::new(0);

/// Record which PCPU the calling core is. Called once per core at bring-up.
pub fn set_current_pcpu(pcpu: PCpu) {
    CURRENT_PCPU.store(pcpu, Ordering::Relaxed);
}
