//! Arena-keyed identity types (spec §9 "manual memory management").
//!
//! The original's fixed-capacity group/node tables and reincarnation
//! counters are replaced here with index newtypes plus a small
//! `Reincarnation` counter type, matching the design note's prescription:
//! "replace with arenas keyed by `GroupIdx`/`NodeIdx`/`WorldIdx`".

/// Max resident groups (spec §4.1 "groups ≤ 512").
pub const MAX_GROUPS: usize = 512;
/// Max resident tree nodes (spec §4.1 "nodes ≤ 1024").
pub const MAX_NODES: usize = 1024;
/// Root-to-leaf path length including the root slot (spec §3 "Node").
pub const PATH_LEN: usize = 8;
/// Vcpus per vsmp (spec §3 "VSMP: vcpu array (≤ MAX_VCPUS)").
pub const MAX_VCPUS: usize = 32;

/// A slot index paired with the reincarnation count it was issued at,
/// giving ABA-safe identity without a global free-standing counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reincarnated {
    pub slot: u32,
    pub reinc: u32,
}

/// Stable identity of a [`crate::tree::Group`], unique across the process
/// lifetime (spec §3 "Group: ... a monotonic reincarnation counter used to
/// recycle ID slots without ABA").
pub type GroupId = Reincarnated;

/// Index of a [`crate::tree::Node`] in the fixed node table.
pub type NodeIdx = Reincarnated;

/// Stable identity of a [`crate::world::World`].
pub type WorldId = Reincarnated;

/// Index of a vcpu within its vsmp's vcpu array.
pub type VcpuIdx = u8;

static_assertions::const_assert!(PATH_LEN >= 2);
static_assertions::const_assert!(MAX_VCPUS <= u8::MAX as usize + 1);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reincarnated_ids_with_same_slot_differ_by_reinc() {
        let a = GroupId { slot: 4, reinc: 0 };
        let b = GroupId { slot: 4, reinc: 1 };
        assert_ne!(a, b);
        assert_eq!(a.slot, b.slot);
    }
}
