//! World/Cartel lifecycle (spec §3 "World", §4.6 "Cartel shutdown").
//! Grounded on `examples/original_source/sched/sched.h` (`World_Handle`,
//! `World_InitArgs`) and spec.md §4.6.

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;

use bitflags::bitflags;

use crate::ids::{GroupId, NodeIdx, WorldId};
use crate::tree::GroupPath;

bitflags! {
    /// World type flags (spec §3 "type flags (host/system/vmm/user/clone/
    /// post/idle)").
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct WorldTypeFlags: u8 {
        const HOST = 1 << 0;
        const SYSTEM = 1 << 1;
        const VMM = 1 << 2;
        const USER = 1 << 3;
        const CLONE = 1 << 4;
        const POST = 1 << 5;
        const IDLE = 1 << 6;
    }
}

/// A schedulable kernel thread (spec §3 "World").
pub struct World {
    pub id: WorldId,
    pub name: String,
    pub type_flags: WorldTypeFlags,
    pub group_leader: Option<WorldId>,
    pub group: Option<GroupId>,
    pub group_node: Option<NodeIdx>,
    pub path: GroupPath,
    pub cartel: CartelId,
    pub limbo: bool,
    pub death_pending: bool,
}

pub type CartelId = WorldId;

impl World {
    pub fn new(id: WorldId, name: String, cartel: CartelId, type_flags: WorldTypeFlags) -> World {
        World {
            id,
            name,
            type_flags,
            group_leader: None,
            group: None,
            group_node: None,
            path: GroupPath::empty(),
            cartel,
            limbo: false,
            death_pending: false,
        }
    }
}

/// Reason a cartel-wide shutdown was requested (spec §4.6 "Cartel
/// shutdown"; §6 "Boundary exit codes").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Clean,
    User(i32),
    Fault { syserr_base: i32, signal: i32 },
}

impl ExitCode {
    pub fn encode(self) -> i32 {
        match self {
            ExitCode::Clean => 0,
            ExitCode::User(v) => v,
            ExitCode::Fault { syserr_base, signal } => syserr_base + signal,
        }
    }
}

/// Per-cartel bookkeeping for a coordinated shutdown (spec §4.6: "one
/// world requesting shutdown posts a `PreExit` status message ... then
/// sets `deathPending` on every peer world in the cartel"; §9 "vicious
/// cartel kill ... a bounded grace period").
pub struct Cartel {
    pub id: CartelId,
    pub members: Vec<WorldId>,
    pub exit_code: Option<ExitCode>,
    pub vicious_deadline_cycles: Option<u64>,
}

impl Cartel {
    pub fn new(id: CartelId) -> Cartel {
        Cartel {
            id,
            members: alloc::vec![id],
            exit_code: None,
            vicious_deadline_cycles: None,
        }
    }

    /// Begin cartel-wide termination (spec §4.6 "Cartel shutdown").
    /// `vicious_grace_cycles` is the design-parameter grace period noted
    /// in spec §9 ("the spec leaves the grace period as a design
    /// parameter rather than guessing"); `None` means a non-vicious kill
    /// with no forced-termination deadline.
    pub fn begin_shutdown(
        &mut self,
        exit_code: ExitCode,
        now_cycles: u64,
        vicious_grace_cycles: Option<u64>,
    ) -> &[WorldId] {
        self.exit_code = Some(exit_code);
        self.vicious_deadline_cycles = vicious_grace_cycles.map(|grace| now_cycles + grace);
        &self.members
    }

    /// Whether survivors past the vicious deadline should be force-
    /// terminated without further grace (spec §4.6 "a coarse deadline is
    /// started ... after which survivors are terminated without further
    /// grace").
    pub fn vicious_deadline_elapsed(&self, now_cycles: u64) -> bool {
        matches!(self.vicious_deadline_cycles, Some(d) if now_cycles >= d)
    }
}
