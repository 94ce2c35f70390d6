//! External-collaborator contracts (spec §6).
//!
//! Device drivers, the module loader, the userworld ELF loader, and the
//! rest of the kernel outside the scheduler are out of scope for this
//! crate. These are the interfaces the scheduler calls through or is
//! called through; only the signatures are specified, never the
//! collaborators' own behavior.

extern crate alloc;

use alloc::string::String;
use crate::cpu::PCpu;

/// Opaque module identifier issued by the (out-of-scope) module loader.
pub type ModuleId = u32;

/// Opaque heap identifier issued by the (out-of-scope) heap allocator.
pub type HeapId = u32;

/// Module registration contract. Use counts gate unload: a module with
/// `use_count > 0` cannot be unloaded.
pub trait ModuleRegistry {
    fn register_module(&self, id: ModuleId, heap: HeapId);
    fn get_module_heap(&self, id: ModuleId) -> Option<HeapId>;
    fn inc_use_count(&self, id: ModuleId);
    fn dec_use_count(&self, id: ModuleId);
}

/// Grow/shrink callbacks handed to a custom heap so it can drive the
/// physical-memory manager. Only the signature is in scope.
pub type HeapGrowCb = fn(requested: usize) -> Option<(usize, usize)>;
pub type HeapShrinkCb = fn(start: usize, len: usize);

/// Heap allocator contract consumed by the module loader and by per-cell
/// bookkeeping that wants architecture-neutral dynamic allocation hooks.
pub trait HeapAllocator {
    fn heap_create_static(&self, name: &str, start: usize, len: usize) -> HeapId;
    fn heap_create_dynamic(&self, name: &str, initial: usize, max: usize) -> HeapId;
    fn heap_create_custom(
        &self,
        name: &str,
        initial: usize,
        max: usize,
        grow: HeapGrowCb,
        shrink: HeapShrinkCb,
    ) -> HeapId;
    fn heap_alloc(&self, heap: HeapId, size: usize) -> Option<*mut u8>;
    fn heap_align(&self, heap: HeapId, size: usize, align: usize) -> Option<*mut u8>;
    /// # Safety
    /// `ptr` must have come from a prior `heap_alloc`/`heap_align` on `heap`.
    unsafe fn heap_free(&self, heap: HeapId, ptr: *mut u8);
    fn heap_destroy(&self, heap: HeapId);
}

/// Address translation hooks used by the memory subsystem's "subtree
/// changed" notification and by `copy_in`/`copy_out` for cross-checks.
pub trait AddressTranslation {
    fn va_to_mpn(&self, va: usize) -> Option<u64>;
    fn ma_to_va(&self, ma: u64) -> Option<usize>;
    fn pshare_page(&self, world: u32, vpn: u64) -> bool;
    fn mark_swap_page(&self, world: u32, req: u64, failed: bool, slot: u64, ppn: u64, mpn: u64);
}

/// Kinds of fire-and-forget events posted to the external management proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    VmkLoad,
    ModuleLoad,
    Network,
    Vmfs,
    Alert,
    UpdateDisks,
    MigrateProgress,
    CommitDone,
    RequestVmmCoredump,
    RequestTclCmd,
    Exit,
    Panic,
    RequestVmxCoredump,
}

/// Fire-and-forget event bus. `post_event` never blocks and never fails
/// observably to the caller.
pub trait EventBus {
    fn post_event(&self, kind: EventKind, payload: &[u8]);
}

/// Debugger transport: a byte-stream connection (serial, net, proc node,
/// file). Packet grammar is the debugger module's concern; the core only
/// supplies and consumes bytes.
pub trait DebuggerTransport {
    fn start(&mut self) -> bool;
    fn stop(&mut self);
    fn get_char(&mut self) -> Option<u8>;
    fn put_char(&mut self, byte: u8);
    fn poll_char(&mut self) -> bool;
    fn flush(&mut self);
    fn listening_on(&self) -> String;
    fn cleanup(&mut self);
}

/// A coarse periodic tick plus one-shot timers; the scheduler is only a
/// consumer of this, never the implementer.
pub trait KernelTimer {
    fn now_cycles(&self) -> u64;
    fn tick_hz(&self) -> u32;
    fn schedule_oneshot(&self, deadline_cycles: u64, pcpu: PCpu);
}
