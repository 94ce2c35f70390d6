//! Versioned-atomic snapshots and the IRQ-disabling lock discipline
//! (spec §5, §9 "versioned atomics").
//!
//! Generalizes the original's three hand-rolled call sites
//! (`CPUSCHED_VERSIONED_ATOMIC_{UPDATE,READ}_{BEGIN,END}` around
//! `chargeStart`, `chargeCyclesTotal`, and group `vtime`) into one small
//! `VersionedCell<T: Copy>`.

use core::cell::UnsafeCell;
use core::sync::atomic::{fence, AtomicU32, Ordering};
use spin::Mutex;
use vmkernel_hal::arch::{self, IrqFlags};

/// Lamport single-writer/many-reader snapshot cell. One writer updates
/// `value` between two fence-guarded bumps of `version`; readers spin
/// until they observe a stable, even version straddling their read.
///
/// Safety argument: `T: Copy` means a reader's `UnsafeCell` read can never
/// observe a torn multi-word write as anything worse than "stale", since
/// the version check rejects any read that overlapped a write.
pub struct VersionedCell<T: Copy> {
    version: AtomicU32,
    value: UnsafeCell<T>,
}

unsafe impl<T: Copy + Send> Sync for VersionedCell<T> {}

impl<T: Copy> VersionedCell<T> {
    pub const fn new(init: T) -> Self {
        VersionedCell {
            version: AtomicU32::new(0),
            value: UnsafeCell::new(init),
        }
    }

    /// Single-writer update. Callers must serialize calls to `update`
    /// themselves (e.g. under the owning cell's lock); concurrent writers
    /// would race on the version counter.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let v0 = self.version.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        debug_assert!(v0 % 2 == 1, "update entered with an odd version already set");
        fence(Ordering::Release);
        unsafe {
            f(&mut *self.value.get());
        }
        fence(Ordering::Release);
        self.version.store(v0.wrapping_add(1), Ordering::Relaxed);
    }

    /// Lock-free read. The closure may run more than once (spec: "Readers
    /// must be idempotent: their body may execute more than once"), so it
    /// must have no observable side effects beyond its return value.
    pub fn read(&self) -> T {
        loop {
            let t = self.version.load(Ordering::Relaxed);
            if t % 2 != 0 {
                core::hint::spin_loop();
                continue;
            }
            fence(Ordering::Acquire);
            let snapshot = unsafe { *self.value.get() };
            fence(Ordering::Acquire);
            if self.version.load(Ordering::Relaxed) == t {
                return snapshot;
            }
        }
    }
}

/// A `spin::Mutex` paired with the IRQ save/restore discipline every
/// ranked lock in §5 requires ("acquiring the tree lock saves and later
/// restores the prior interrupt-enable state").
pub struct IrqLock<T> {
    inner: Mutex<T>,
}

pub struct IrqLockGuard<'a, T> {
    flags: IrqFlags,
    guard: spin::MutexGuard<'a, T>,
}

impl<T> IrqLock<T> {
    pub const fn new(value: T) -> Self {
        IrqLock {
            inner: Mutex::new(value),
        }
    }

    /// Disable interrupts, acquire the lock, and return a guard that
    /// restores the prior interrupt-enable state on drop.
    pub fn lock(&self) -> IrqLockGuard<'_, T> {
        let flags = arch::current().irq_disable_save();
        let guard = self.inner.lock();
        IrqLockGuard { flags, guard }
    }
}

impl<'a, T> core::ops::Deref for IrqLockGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<'a, T> core::ops::DerefMut for IrqLockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<'a, T> Drop for IrqLockGuard<'a, T> {
    fn drop(&mut self) {
        unsafe {
            arch::current().irq_restore(self.flags);
        }
    }
}
