#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

//! The proportional-share hierarchical CPU scheduler for `vmkernel`.
//!
//! This crate is architecture-neutral: it depends only on
//! `vmkernel-hal`'s `ArchOps` registration for IRQ save/restore, a
//! cycle counter, the current PCPU index, and segment-limited raw user
//! copies. A concrete backend (e.g. `vmkernel-x86_64`) registers itself
//! once at boot via `vmkernel_hal::arch::register`, the same way the
//! teacher's `power_mgmt` module hands back a `PowerManager` trait
//! object instead of threading a type parameter through the whole
//! hypervisor core.
//!
//! Module map:
//! - [`error`], [`klog`], [`config`], [`sync`], [`ids`] — ambient stack.
//! - [`tree`] — C1: the group/world admission tree.
//! - [`alloc_model`] — C2: shares, min/max reservations, admission.
//! - [`vcpu`], [`vsmp`] — C3: per-vCPU run state and VSMP co-scheduling.
//! - [`cell`] — C4: the per-cell dispatcher and stride scheduler.
//! - [`wait`] — C5: the blocking/wakeup engine.
//! - [`semaphore`], [`barrier`] — locking primitives the scheduler uses
//!   internally (ranked semaphores, RW-semaphores, a spin barrier).
//! - [`world`] — cartels, worlds, and exit-code bookkeeping.
//! - [`boundary`] — C6: fault-restart user copies and exception
//!   dispatch priority.

extern crate alloc;

pub mod alloc_model;
pub mod barrier;
pub mod boundary;
pub mod cell;
pub mod config;
pub mod error;
pub mod ids;
pub mod klog;
pub mod semaphore;
pub mod sync;
#[cfg(test)]
mod testutil;
pub mod tree;
pub mod vcpu;
pub mod vsmp;
pub mod wait;
pub mod world;

pub use error::{SchedError, SchedResult};

use alloc_model::{AllocBlock, Bound, SharesSpec, Units};
use config::SchedConfig;
use tree::Tree;

/// The scheduler's process-wide state: the admission tree plus the
/// tunables it and the cell dispatchers were built from.
///
/// Per-cell [`cell::Cell`] instances are owned by whoever brings up
/// each cell (one per NUMA/scheduling domain); this struct only holds
/// what every cell shares.
pub struct SchedCore {
    pub tree: Tree,
    pub config: SchedConfig,
}

impl SchedCore {
    /// Bring up the scheduler core: build the predefined group tree
    /// (spec §C.1 "Predefined groups") under the given tunables.
    ///
    /// Callers must have already registered an `ArchOps` backend via
    /// `vmkernel_hal::arch::register` — every subsequent call into this
    /// crate assumes IRQ save/restore and the cycle counter are live.
    pub fn init(config: SchedConfig) -> Result<SchedCore, SchedError> {
        let tree = Tree::new();
        let root_alloc = AllocBlock::normalize(
            Bound::Absolute(0),
            None,
            SharesSpec::Explicit(config.tunables.shares_normal),
            0,
            None,
            Units::Percent,
            100,
            1,
        );
        tree.init_predefined(root_alloc)?;
        Ok(SchedCore { tree, config })
    }
}
