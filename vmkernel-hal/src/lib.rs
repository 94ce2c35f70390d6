#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

//! Hardware abstraction layer consumed by `vmkernel-core`.
//!
//! The scheduler core depends on a handful of primitives it does not own:
//! per-PCPU identity and affinity masks, IRQ save/restore, a cycle counter,
//! and the external-collaborator contracts the core only calls through
//! (module loader, heap allocator, event bus, debugger transport — see
//! `collab`). Concrete per-architecture implementations live in sibling
//! crates such as `vmkernel-x86_64` and register themselves through `arch`.

extern crate alloc;

pub mod arch;
pub mod collab;
pub mod cpu;

pub use arch::{ArchOps, IrqFlags};
pub use cpu::{CpuMask, PCpu, MAX_PCPUS};

/// HAL-specific error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalError {
    UnsupportedArchitecture,
    HardwareNotSupported,
    AlreadyInitialized,
}
