//! Architecture registration.
//!
//! `vmkernel-core` needs three primitives it cannot implement itself: IRQ
//! save/restore, a cycle counter, and the current PCPU index. Rather than
//! generic-parameterize every scheduler type over an architecture trait, the
//! concrete backend (e.g. `vmkernel-x86_64`) registers a single `&'static
//! dyn ArchOps` once at boot, the way the teacher's `power_mgmt` module
//! hands back a `PowerManager` trait object instead of threading a type
//! parameter through the whole hypervisor core.

use crate::cpu::PCpu;
use spin::Once;

/// Saved interrupt-enable state, opaque to callers. On x86_64 this is the
/// `RFLAGS.IF` bit as returned by the backend; other architectures would
/// encode their own saved state the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrqFlags(pub usize);

/// Architecture-specific operations the scheduler core relies on.
pub trait ArchOps: Send + Sync {
    /// Disable interrupts on the calling PCPU and return the prior state.
    fn irq_disable_save(&self) -> IrqFlags;

    /// Restore interrupts to a previously saved state.
    ///
    /// # Safety
    /// `flags` must have been returned by a matching `irq_disable_save` on
    /// the same PCPU with no intervening restore.
    unsafe fn irq_restore(&self, flags: IrqFlags);

    /// True if interrupts are currently enabled on the calling PCPU.
    fn irq_enabled(&self) -> bool;

    /// Free-running cycle counter (e.g. TSC), monotonic per PCPU.
    fn read_cycles(&self) -> u64;

    /// Convert a cycle delta to nanoseconds using the calibrated frequency.
    fn cycles_to_ns(&self, cycles: u64) -> u64;

    /// Index of the PCPU executing the call.
    fn current_pcpu(&self) -> PCpu;

    /// Copy `len` bytes from a validated user address into kernel memory
    /// under segment `seg`. `vmkernel_core::boundary` owns validation and
    /// the fault-restart bookkeeping; this performs the raw, already-
    /// validated copy (spec §4.6, §C.7).
    ///
    /// # Safety
    /// `[src, src + len)` must already be known mapped and readable under
    /// `seg`; this performs no checks of its own.
    unsafe fn raw_copy_in(&self, seg: u16, dst: *mut u8, src: usize, len: usize);

    /// Copy `len` bytes from kernel memory to a validated user address.
    ///
    /// # Safety
    /// Same preconditions as [`raw_copy_in`], mirrored for the write
    /// direction.
    unsafe fn raw_copy_out(&self, seg: u16, dst: usize, src: *const u8, len: usize);
}

static ARCH: Once<&'static dyn ArchOps> = Once::new();

/// Register the architecture backend. Called once during `vmkernel::init`.
///
/// Panics if called twice: the backend is a process-wide singleton, the
/// same way the predefined-group table and per-cell queues are (see
/// `vmkernel_core::config`).
pub fn register(ops: &'static dyn ArchOps) {
    let mut already = false;
    ARCH.call_once(|| ops);
    if !core::ptr::eq(*ARCH.get().unwrap(), ops) {
        already = true;
    }
    debug_assert!(!already, "architecture backend already registered");
}

/// Fetch the registered architecture backend.
///
/// Panics if no backend was registered yet; every entry point into the
/// scheduler runs after `vmkernel::init`, so this should never fire outside
/// of a test harness that forgot to call `register`.
pub fn current() -> &'static dyn ArchOps {
    *ARCH.get().expect("vmkernel_hal::arch::register was never called")
}

/// True if a backend has been registered (used by tests to avoid panics).
pub fn is_registered() -> bool {
    ARCH.get().is_some()
}
