//! Shared test-only `ArchOps` stub so unit tests touching an `IrqLock`
//! can run without pulling in a real arch backend crate.

#![cfg(test)]

use vmkernel_hal::arch::{ArchOps, IrqFlags};
use vmkernel_hal::cpu::PCpu;

struct NullArch;

impl ArchOps for NullArch {
    fn irq_disable_save(&self) -> IrqFlags {
        IrqFlags(0)
    }
    unsafe fn irq_restore(&self, _flags: IrqFlags) {}
    fn irq_enabled(&self) -> bool {
        true
    }
    fn read_cycles(&self) -> u64 {
        0
    }
    fn cycles_to_ns(&self, _cycles: u64) -> u64 {
        0
    }
    fn current_pcpu(&self) -> PCpu {
        0
    }
    unsafe fn raw_copy_in(&self, _seg: u16, dst: *mut u8, src: usize, len: usize) {
        unsafe { core::ptr::copy_nonoverlapping(src as *const u8, dst, len) }
    }
    unsafe fn raw_copy_out(&self, _seg: u16, dst: usize, src: *const u8, len: usize) {
        unsafe { core::ptr::copy_nonoverlapping(src, dst as *mut u8, len) }
    }
}

static NULL_ARCH: NullArch = NullArch;

/// Register [`NullArch`] as the process-wide backend if none is
/// registered yet. Safe to call repeatedly: `vmkernel_hal::arch::register`
/// is idempotent for a repeated `'static` reference.
pub fn ensure_registered() {
    vmkernel_hal::arch::register(&NULL_ARCH);
}
