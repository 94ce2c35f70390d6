//! C1 Tree: hierarchical scheduler groups, nodes, and paths.
//! Grounded on `examples/original_source/sched/sched.c` (`Sched_TreeLock`,
//! `SchedGroupAdd`/`SchedTreeMoveGroup`) and spec.md §4.1, §9 ("replace
//! with arenas keyed by GroupIdx/NodeIdx/WorldIdx").

extern crate alloc;

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use bitflags::bitflags;

use crate::alloc_model::AllocBlock;
use crate::error::{SchedError, SchedResult};
use crate::ids::{GroupId, NodeIdx, Reincarnated, WorldId, MAX_GROUPS, MAX_NODES, PATH_LEN};
use crate::sync::IrqLock;

bitflags! {
    /// Flags carried by a [`Group`] (spec §3 "flag-set {predefined, leaf,
    /// self-destruct, is-vm, memsched-client, system}").
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct GroupFlags: u8 {
        const PREDEFINED = 1 << 0;
        const LEAF = 1 << 1;
        const SELF_DESTRUCT = 1 << 2;
        const IS_VM = 1 << 3;
        const MEMSCHED_CLIENT = 1 << 4;
        const SYSTEM = 1 << 5;
    }
}

/// An administrative scheduler-tree group (spec §3 "Group").
#[derive(Debug, Clone)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub node: NodeIdx,
    pub cpu: AllocBlock,
    pub mem: AllocBlock,
    pub removed: bool,
    pub ref_count: u32,
    pub flags: GroupFlags,
}

/// A tagged tree element (spec §9 "`Sched_Node` is a tagged enum {
/// Invalid, Group(GroupIdx), Vm(WorldId) }").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Invalid,
    Group(GroupId),
    Vm(WorldId),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeIdx>,
    pub members: Vec<NodeIdx>,
    pub depth: u8,
    pub live: bool,
}

impl Node {
    fn invalid() -> Node {
        Node {
            kind: NodeKind::Invalid,
            parent: None,
            members: Vec::new(),
            depth: 0,
            live: false,
        }
    }
}

/// Root-to-leaf sequence of group IDs, terminated by `None` in unused
/// trailing slots (spec §3 "GroupPath").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupPath {
    pub ids: [Option<GroupId>; PATH_LEN],
}

impl GroupPath {
    pub fn empty() -> GroupPath {
        GroupPath {
            ids: [None; PATH_LEN],
        }
    }

    pub fn len(&self) -> usize {
        self.ids.iter().take_while(|x| x.is_some()).count()
    }
}

const ANON_PREFIX: &str = "anon.";

/// Table-backed slot storage with linear-scan allocation preferring the
/// smallest reincarnation counter (spec §4.1 "Add").
struct Slots<T> {
    slots: Vec<Option<T>>,
    reinc: Vec<u32>,
}

impl<T> Slots<T> {
    fn new(capacity: usize) -> Slots<T> {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Slots {
            slots,
            reinc: alloc::vec![0u32; capacity],
        }
    }

    fn alloc(&mut self, value: T) -> Option<Reincarnated> {
        let mut best: Option<usize> = None;
        for (i, slot) in self.slots.iter().enumerate() {
            if slot.is_none() && (best.is_none() || self.reinc[i] < self.reinc[best.unwrap()]) {
                best = Some(i);
            }
        }
        let idx = best?;
        self.slots[idx] = Some(value);
        Some(Reincarnated {
            slot: idx as u32,
            reinc: self.reinc[idx],
        })
    }

    fn get(&self, id: Reincarnated) -> Option<&T> {
        if self.reinc[id.slot as usize] != id.reinc {
            return None;
        }
        self.slots[id.slot as usize].as_ref()
    }

    fn get_mut(&mut self, id: Reincarnated) -> Option<&mut T> {
        if self.reinc[id.slot as usize] != id.reinc {
            return None;
        }
        self.slots[id.slot as usize].as_mut()
    }

    fn free(&mut self, id: Reincarnated) {
        if self.reinc[id.slot as usize] == id.reinc {
            self.slots[id.slot as usize] = None;
            self.reinc[id.slot as usize] = self.reinc[id.slot as usize].wrapping_add(1);
        }
    }
}

/// Well-known startup groups (spec §4.1 "Predefined groups").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predefined {
    Root,
    Idle,
    System,
    Local,
    Cluster,
    UwNursery,
    Helper,
    Drivers,
}

impl Predefined {
    pub fn name(self) -> &'static str {
        match self {
            Predefined::Root => "root",
            Predefined::Idle => "idle",
            Predefined::System => "system",
            Predefined::Local => "local",
            Predefined::Cluster => "cluster",
            Predefined::UwNursery => "uwnursery",
            Predefined::Helper => "helper",
            Predefined::Drivers => "drivers",
        }
    }

    const ALL: [Predefined; 8] = [
        Predefined::Root,
        Predefined::Idle,
        Predefined::System,
        Predefined::Local,
        Predefined::Cluster,
        Predefined::UwNursery,
        Predefined::Helper,
        Predefined::Drivers,
    ];
}

struct TreeState {
    groups: Slots<Group>,
    nodes: Slots<Node>,
    predefined: [Option<GroupId>; 8],
}

impl TreeState {
    fn new() -> TreeState {
        TreeState {
            groups: Slots::new(MAX_GROUPS),
            nodes: Slots::new(MAX_NODES),
            predefined: [None; 8],
        }
    }

    fn node_of(&self, id: GroupId) -> SchedResult<NodeIdx> {
        let g = self.groups.get(id).ok_or(SchedError::NotFound)?;
        Ok(g.node)
    }

    fn depth_of(&self, node: NodeIdx) -> SchedResult<u8> {
        Ok(self.nodes.get(node).ok_or(SchedError::NotFound)?.depth)
    }

    fn name_collision(&self, name: &str) -> bool {
        self.groups
            .slots
            .iter()
            .flatten()
            .any(|g| !g.removed && g.name == name)
    }

    fn is_descendant(&self, candidate: NodeIdx, maybe_ancestor: NodeIdx) -> bool {
        let mut cur = Some(candidate);
        while let Some(idx) = cur {
            if idx == maybe_ancestor {
                return true;
            }
            cur = self.nodes.get(idx).and_then(|n| n.parent);
        }
        false
    }
}

/// The scheduler tree: one IRQ lock guards all structural changes and
/// lookups (spec §4.1 "Synchronization").
pub struct Tree {
    state: IrqLock<TreeState>,
}

impl Tree {
    pub fn new() -> Tree {
        Tree {
            state: IrqLock::new(TreeState::new()),
        }
    }

    /// Seed the predefined group table at boot (spec §4.1 "Predefined
    /// groups. Initialized at startup from a table"). `resolve_bound`
    /// turns a table entry's possibly-negative bound into a concrete one
    /// once resource totals are known, per spec "resolved at init after
    /// the resource totals ... are known".
    pub fn init_predefined(&self, default_alloc: AllocBlock) -> SchedResult<()> {
        let mut st = self.state.lock();
        let root_node = st.nodes.alloc(Node {
            kind: NodeKind::Invalid,
            parent: None,
            members: Vec::new(),
            depth: 0,
            live: true,
        }).ok_or(SchedError::LimitExceeded)?;
        let root_group = st.groups.alloc(Group {
            id: Reincarnated { slot: 0, reinc: 0 },
            name: Predefined::Root.name().to_string(),
            node: root_node,
            cpu: default_alloc,
            mem: default_alloc,
            removed: false,
            ref_count: 1,
            flags: GroupFlags::PREDEFINED | GroupFlags::SYSTEM,
        }).ok_or(SchedError::LimitExceeded)?;
        if let Some(n) = st.nodes.get_mut(root_node) {
            n.kind = NodeKind::Group(root_group);
        }
        st.predefined[Predefined::Root as usize] = Some(root_group);

        for p in Predefined::ALL.iter().skip(1) {
            let node = st.nodes.alloc(Node {
                kind: NodeKind::Invalid,
                parent: Some(root_node),
                members: Vec::new(),
                depth: 1,
                live: true,
            }).ok_or(SchedError::LimitExceeded)?;
            let group = st.groups.alloc(Group {
                id: Reincarnated { slot: 0, reinc: 0 },
                name: p.name().to_string(),
                node,
                cpu: default_alloc,
                mem: default_alloc,
                removed: false,
                ref_count: 1,
                flags: GroupFlags::PREDEFINED,
            }).ok_or(SchedError::LimitExceeded)?;
            if let Some(n) = st.nodes.get_mut(node) {
                n.kind = NodeKind::Group(group);
            }
            if let Some(root) = st.nodes.get_mut(root_node) {
                root.members.push(node);
            }
            st.predefined[*p as usize] = Some(group);
        }
        Ok(())
    }

    pub fn predefined_id(&self, p: Predefined) -> Option<GroupId> {
        self.state.lock().predefined[p as usize]
    }

    /// Add a child group under `parent` (spec §4.1 "Add").
    pub fn add_group(&self, name: Option<&str>, parent: GroupId, default_alloc: AllocBlock) -> SchedResult<GroupId> {
        let mut st = self.state.lock();
        let parent_node = st.node_of(parent)?;
        let parent_depth = st.depth_of(parent_node)?;
        if parent_depth as usize + 1 > PATH_LEN - 1 {
            return Err(SchedError::LimitExceeded);
        }
        {
            let parent_group = st.groups.get(parent).ok_or(SchedError::NotFound)?;
            if parent_group.flags.contains(GroupFlags::LEAF) {
                return Err(SchedError::BadParam);
            }
        }
        let name = match name {
            Some(n) if n.starts_with(ANON_PREFIX) || Predefined::ALL.iter().any(|p| p.name() == n) => {
                return Err(SchedError::BadParam);
            }
            Some(n) => n.to_string(),
            None => {
                // Synthesized below once the node id is known.
                String::new()
            }
        };
        if !name.is_empty() && st.name_collision(&name) {
            return Err(SchedError::Exists);
        }
        let node = st.nodes.alloc(Node {
            kind: NodeKind::Invalid,
            parent: Some(parent_node),
            members: Vec::new(),
            depth: parent_depth + 1,
            live: true,
        }).ok_or(SchedError::LimitExceeded)?;
        let group_id = st.groups.alloc(Group {
            id: Reincarnated { slot: 0, reinc: 0 },
            name: String::new(),
            node,
            cpu: default_alloc,
            mem: default_alloc,
            removed: false,
            ref_count: 1,
            flags: GroupFlags::default(),
        }).ok_or_else(|| {
            st.nodes.free(node);
            SchedError::LimitExceeded
        })?;
        let final_name = if name.is_empty() {
            alloc::format!("{}{}", ANON_PREFIX, group_id.slot)
        } else {
            name
        };
        if let Some(g) = st.groups.get_mut(group_id) {
            g.id = group_id;
            g.name = final_name;
        }
        if let Some(n) = st.nodes.get_mut(node) {
            n.kind = NodeKind::Group(group_id);
        }
        if let Some(pg) = st.nodes.get_mut(parent_node) {
            pg.members.push(node);
        }
        Ok(group_id)
    }

    /// Remove an empty, non-predefined group (spec §4.1 "Remove").
    pub fn remove_group(&self, id: GroupId) -> SchedResult<()> {
        let mut st = self.state.lock();
        let node_idx = st.node_of(id)?;
        {
            let group = st.groups.get(id).ok_or(SchedError::NotFound)?;
            if group.flags.contains(GroupFlags::PREDEFINED) {
                return Err(SchedError::BadParam);
            }
        }
        let has_members = st.nodes.get(node_idx).ok_or(SchedError::NotFound)?.members.len() > 0;
        if has_members {
            return Err(SchedError::Busy);
        }
        let parent = st.nodes.get(node_idx).and_then(|n| n.parent);
        if let Some(parent_idx) = parent {
            if let Some(pn) = st.nodes.get_mut(parent_idx) {
                pn.members.retain(|&m| m != node_idx);
            }
        }
        st.nodes.free(node_idx);
        let reap = {
            let g = st.groups.get_mut(id).ok_or(SchedError::NotFound)?;
            g.removed = true;
            g.ref_count == 0
        };
        if reap {
            st.groups.free(id);
        }
        Ok(())
    }

    /// Drop a reference; reap if this was the last one on a removed
    /// group (spec §3 "A removed group with nonzero refcount remains
    /// allocated but invisible; the last Release reaps it").
    pub fn release_reference(&self, id: GroupId) {
        let mut st = self.state.lock();
        let reap = match st.groups.get_mut(id) {
            Some(g) => {
                g.ref_count = g.ref_count.saturating_sub(1);
                g.removed && g.ref_count == 0
            }
            None => false,
        };
        if reap {
            st.groups.free(id);
        }
    }

    /// Rename a non-predefined group, atomically under the tree lock
    /// (spec §4.1 "Rename").
    pub fn rename_group(&self, id: GroupId, new_name: &str) -> SchedResult<()> {
        let mut st = self.state.lock();
        {
            let group = st.groups.get(id).ok_or(SchedError::NotFound)?;
            if group.flags.contains(GroupFlags::PREDEFINED) {
                return Err(SchedError::BadParam);
            }
        }
        if st.name_collision(new_name) {
            return Err(SchedError::Exists);
        }
        let g = st.groups.get_mut(id).ok_or(SchedError::NotFound)?;
        g.name = new_name.to_string();
        Ok(())
    }

    pub fn lookup_by_id(&self, id: GroupId) -> Option<Group> {
        self.state.lock().groups.get(id).cloned()
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<Group> {
        self.state
            .lock()
            .groups
            .slots
            .iter()
            .flatten()
            .find(|g| !g.removed && g.name == name)
            .cloned()
    }

    /// Move `id` under `new_parent`, subject to depth/cycle/leaf checks
    /// and the caller-supplied admission closure (spec §4.1 "Move"). The
    /// closure receives `(subject_min, sibling_mins_sum, parent_capacity)`
    /// equivalents pre-computed by the caller since admission spans both
    /// CPU and memory sub-models, which this module does not own.
    pub fn move_group(
        &self,
        id: GroupId,
        new_parent: GroupId,
        admission: impl FnOnce(&Group, &Group) -> SchedResult<()>,
    ) -> SchedResult<Vec<WorldId>> {
        let mut st = self.state.lock();
        let node_idx = st.node_of(id)?;
        let new_parent_node = st.node_of(new_parent)?;
        {
            let group = st.groups.get(id).ok_or(SchedError::NotFound)?;
            if group.flags.contains(GroupFlags::PREDEFINED) {
                return Err(SchedError::BadParam);
            }
        }
        {
            let parent_group = st.groups.get(new_parent).ok_or(SchedError::NotFound)?;
            if parent_group.flags.contains(GroupFlags::LEAF) {
                return Err(SchedError::BadParam);
            }
        }
        if let Some(uw) = st.predefined[Predefined::UwNursery as usize] {
            if uw == new_parent {
                return Err(SchedError::BadParam);
            }
        }
        if st.is_descendant(new_parent_node, node_idx) {
            return Err(SchedError::BadParam);
        }
        let new_depth = st.depth_of(new_parent_node)? + 1;
        if new_depth as usize > PATH_LEN - 1 {
            return Err(SchedError::LimitExceeded);
        }

        let old_parent_node = st.nodes.get(node_idx).ok_or(SchedError::NotFound)?.parent;

        // Detach.
        if let Some(op) = old_parent_node {
            if let Some(pn) = st.nodes.get_mut(op) {
                pn.members.retain(|&m| m != node_idx);
            }
        }

        let admission_result = {
            let subject = st.groups.get(id).ok_or(SchedError::NotFound)?.clone();
            let parent = st.groups.get(new_parent).ok_or(SchedError::NotFound)?.clone();
            admission(&subject, &parent)
        };

        if let Err(e) = admission_result {
            // Revert: reattach to the original parent exactly.
            if let Some(op) = old_parent_node {
                if let Some(pn) = st.nodes.get_mut(op) {
                    pn.members.push(node_idx);
                }
            }
            return Err(e);
        }

        if let Some(n) = st.nodes.get_mut(node_idx) {
            n.parent = Some(new_parent_node);
            n.depth = new_depth;
        }
        if let Some(pn) = st.nodes.get_mut(new_parent_node) {
            pn.members.push(node_idx);
        }
        Ok(self.recompute_descendant_paths(&mut st, node_idx))
    }

    /// Recompute the `GroupPath` of every VM descendant after a move
    /// (spec §4.1 "Path recomputation"). Returns the affected world ids so
    /// callers can notify both resource schedulers.
    fn recompute_descendant_paths(&self, st: &mut TreeState, subtree_root: NodeIdx) -> Vec<WorldId> {
        let mut affected = Vec::new();
        let mut stack = alloc::vec![subtree_root];
        while let Some(idx) = stack.pop() {
            let (kind, members) = match st.nodes.get(idx) {
                Some(n) => (n.kind, n.members.clone()),
                None => continue,
            };
            if let NodeKind::Vm(world) = kind {
                affected.push(world);
            }
            stack.extend(members);
        }
        affected
    }

    /// Compute a node's root-to-leaf `GroupPath` by walking parent links
    /// (spec §4.1 "Path recomputation").
    pub fn path_of(&self, node: NodeIdx) -> GroupPath {
        let st = self.state.lock();
        let mut chain = Vec::new();
        let mut cur = Some(node);
        while let Some(idx) = cur {
            if let Some(n) = st.nodes.get(idx) {
                if let NodeKind::Group(gid) = n.kind {
                    chain.push(gid);
                }
                cur = n.parent;
            } else {
                break;
            }
        }
        chain.reverse();
        let mut path = GroupPath::empty();
        for (slot, gid) in path.ids.iter_mut().zip(chain.into_iter()) {
            *slot = Some(gid);
        }
        path
    }

    /// Attach a freshly allocated VM node to `group`'s member list (spec
    /// §4.1 "Join/Leave").
    pub fn join_group(&self, world: WorldId, group: GroupId) -> SchedResult<NodeIdx> {
        let mut st = self.state.lock();
        let parent_node = st.node_of(group)?;
        let depth = st.depth_of(parent_node)? + 1;
        if depth as usize > PATH_LEN - 1 {
            return Err(SchedError::LimitExceeded);
        }
        let node = st.nodes.alloc(Node {
            kind: NodeKind::Vm(world),
            parent: Some(parent_node),
            members: Vec::new(),
            depth,
            live: true,
        }).ok_or(SchedError::LimitExceeded)?;
        if let Some(pn) = st.nodes.get_mut(parent_node) {
            pn.members.push(node);
        }
        if let Some(g) = st.groups.get_mut(group) {
            g.ref_count += 1;
        }
        Ok(node)
    }

    /// Detach a VM node from its group, transitively removing the parent
    /// if it is self-destructing and now empty (spec §4.1 "Join/Leave").
    pub fn leave_group(&self, node: NodeIdx) -> SchedResult<()> {
        let mut st = self.state.lock();
        let parent_node = st.nodes.get(node).ok_or(SchedError::NotFound)?.parent;
        if let Some(pidx) = parent_node {
            if let Some(pn) = st.nodes.get_mut(pidx) {
                pn.members.retain(|&m| m != node);
            }
            let (group_id, now_empty) = match st.nodes.get(pidx) {
                Some(pn) => {
                    let gid = match pn.kind {
                        NodeKind::Group(g) => Some(g),
                        _ => None,
                    };
                    (gid, pn.members.is_empty())
                }
                None => (None, false),
            };
            if let Some(gid) = group_id {
                if let Some(g) = st.groups.get_mut(gid) {
                    g.ref_count = g.ref_count.saturating_sub(1);
                }
                let self_destruct = st.groups.get(gid).map(|g| g.flags.contains(GroupFlags::SELF_DESTRUCT)).unwrap_or(false);
                if self_destruct && now_empty {
                    drop(st);
                    let _ = self.remove_group(gid);
                    return Ok(());
                }
            }
        }
        st.nodes.free(node);
        Ok(())
    }

    /// Reparent a VM group without losing its reservation (spec §4.1
    /// "ChangeGroup"). An anonymous temp group under `new_parent` stands
    /// in for `vm` while admission is evaluated, so `vm`'s own
    /// reservation is never double-counted against its incoming parent;
    /// once admission passes the temp group is dropped and `vm` itself
    /// is moved. Any failure reverts everything, leaving `vm` under its
    /// original parent with its original path. Returns the recomputed path
    /// together with the world ids whose group changed, so callers can
    /// notify both resource schedulers as spec §4.1 "Move" requires.
    pub fn change_group(
        &self,
        vm: GroupId,
        new_parent: GroupId,
        admission: impl FnOnce(&Group, &Group) -> SchedResult<()>,
    ) -> SchedResult<(GroupPath, Vec<WorldId>)> {
        let vm_cpu_alloc = self.lookup_by_id(vm).ok_or(SchedError::NotFound)?.cpu;
        let temp = self.add_group(None, new_parent, vm_cpu_alloc)?;
        let admission_result = {
            let temp_group = self.lookup_by_id(temp).ok_or(SchedError::NotFound)?;
            let parent_group = self.lookup_by_id(new_parent).ok_or(SchedError::NotFound)?;
            admission(&temp_group, &parent_group)
        };
        if let Err(e) = admission_result {
            let _ = self.remove_group(temp);
            return Err(e);
        }
        let move_result = self.move_group(vm, new_parent, |_subject, _parent| Ok(()));
        let _ = self.remove_group(temp);
        let affected = move_result?;
        let node = self.state.lock().node_of(vm)?;
        Ok((self.path_of(node), affected))
    }
}

impl Default for Tree {
    fn default() -> Tree {
        Tree::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc_model::{AllocBlock, Bound, SharesSpec, Units};

    fn default_alloc() -> AllocBlock {
        crate::testutil::ensure_registered();
        AllocBlock::normalize(
            Bound::Absolute(0),
            None,
            SharesSpec::Normal,
            0,
            None,
            Units::Percent,
            100,
            1,
        )
    }

    #[test]
    fn add_and_lookup_group() {
        let tree = Tree::new();
        tree.init_predefined(default_alloc()).unwrap();
        let root = tree.predefined_id(Predefined::Root).unwrap();
        let a = tree.add_group(Some("a"), root, default_alloc()).unwrap();
        let fetched = tree.lookup_by_name("a").unwrap();
        assert_eq!(fetched.id, a);
    }

    #[test]
    fn add_rejects_name_collision() {
        let tree = Tree::new();
        tree.init_predefined(default_alloc()).unwrap();
        let root = tree.predefined_id(Predefined::Root).unwrap();
        tree.add_group(Some("dup"), root, default_alloc()).unwrap();
        let err = tree.add_group(Some("dup"), root, default_alloc()).unwrap_err();
        assert_eq!(err, SchedError::Exists);
    }

    #[test]
    fn anon_name_is_synthesized_when_none_given() {
        let tree = Tree::new();
        tree.init_predefined(default_alloc()).unwrap();
        let root = tree.predefined_id(Predefined::Root).unwrap();
        let g = tree.add_group(None, root, default_alloc()).unwrap();
        let fetched = tree.lookup_by_id(g).unwrap();
        assert!(fetched.name.starts_with("anon."));
    }

    #[test]
    fn remove_rejects_predefined_and_nonempty() {
        let tree = Tree::new();
        tree.init_predefined(default_alloc()).unwrap();
        let root = tree.predefined_id(Predefined::Root).unwrap();
        assert_eq!(tree.remove_group(root).unwrap_err(), SchedError::BadParam);

        let a = tree.add_group(Some("a"), root, default_alloc()).unwrap();
        let _b = tree.add_group(Some("b"), a, default_alloc()).unwrap();
        assert_eq!(tree.remove_group(a).unwrap_err(), SchedError::Busy);
    }

    #[test]
    fn add_remove_round_trip_restores_tree_modulo_reincarnation() {
        let tree = Tree::new();
        tree.init_predefined(default_alloc()).unwrap();
        let root = tree.predefined_id(Predefined::Root).unwrap();
        let a = tree.add_group(Some("a"), root, default_alloc()).unwrap();
        tree.remove_group(a).unwrap();
        assert!(tree.lookup_by_name("a").is_none());
        let a2 = tree.add_group(Some("a"), root, default_alloc()).unwrap();
        assert_eq!(a2.slot, a.slot);
        assert_eq!(a2.reinc, a.reinc + 1);
    }

    #[test]
    fn move_group_rejects_cycles() {
        let tree = Tree::new();
        tree.init_predefined(default_alloc()).unwrap();
        let root = tree.predefined_id(Predefined::Root).unwrap();
        let a = tree.add_group(Some("a"), root, default_alloc()).unwrap();
        let b = tree.add_group(Some("b"), a, default_alloc()).unwrap();
        let err = tree
            .move_group(a, b, |_subject, _parent| Ok(()))
            .unwrap_err();
        assert_eq!(err, SchedError::BadParam);
    }

    #[test]
    fn move_group_reverts_on_admission_failure() {
        let tree = Tree::new();
        tree.init_predefined(default_alloc()).unwrap();
        let root = tree.predefined_id(Predefined::Root).unwrap();
        let a = tree.add_group(Some("a"), root, default_alloc()).unwrap();
        let b = tree.add_group(Some("b"), root, default_alloc()).unwrap();
        let v = tree.add_group(Some("v"), a, default_alloc()).unwrap();
        let err = tree
            .move_group(v, b, |_subject, _parent| Err(SchedError::LimitExceeded))
            .unwrap_err();
        assert_eq!(err, SchedError::LimitExceeded);
        // v must still be findable and still a child of a.
        let v_node = tree.state.lock().node_of(v).unwrap();
        let root_a_node = tree.state.lock().node_of(a).unwrap();
        assert_eq!(tree.state.lock().nodes.get(v_node).unwrap().parent, Some(root_a_node));
    }

    #[test]
    fn join_leave_round_trip_restores_membership() {
        let tree = Tree::new();
        tree.init_predefined(default_alloc()).unwrap();
        let root = tree.predefined_id(Predefined::Root).unwrap();
        let a = tree.add_group(Some("a"), root, default_alloc()).unwrap();
        let world = WorldId { slot: 1, reinc: 0 };
        let node = tree.join_group(world, a).unwrap();
        tree.leave_group(node).unwrap();
        let node2 = tree.join_group(world, a).unwrap();
        let path = tree.path_of(node2);
        assert_eq!(path.ids[0], Some(tree.predefined_id(Predefined::Root).unwrap()));
        assert_eq!(path.ids[1], Some(a));
    }

    #[test]
    fn depth_limit_is_enforced() {
        let tree = Tree::new();
        tree.init_predefined(default_alloc()).unwrap();
        let mut cur = tree.predefined_id(Predefined::Root).unwrap();
        // Root is depth 0; predefined children are depth 1. PATH_LEN=8 so
        // max depth is 7.
        for i in 0..7 {
            cur = tree.add_group(Some(&alloc::format!("d{}", i)), cur, default_alloc()).unwrap();
        }
        let err = tree.add_group(Some("toodeep"), cur, default_alloc());
        assert_eq!(err.unwrap_err(), SchedError::LimitExceeded);
    }

    #[test]
    fn change_group_reparents_preserving_path() {
        let tree = Tree::new();
        tree.init_predefined(default_alloc()).unwrap();
        let root = tree.predefined_id(Predefined::Root).unwrap();
        let a = tree.add_group(Some("a"), root, default_alloc()).unwrap();
        let b = tree.add_group(Some("b"), root, default_alloc()).unwrap();
        let v = tree.add_group(Some("v"), a, default_alloc()).unwrap();

        let (path, _affected) = tree
            .change_group(v, b, |_subject, _parent| Ok(()))
            .unwrap();
        assert_eq!(path.ids[0], Some(root));
        assert_eq!(path.ids[1], Some(b));
        assert_eq!(path.len(), 2);

        let a_node = tree.state.lock().node_of(a).unwrap();
        assert!(tree.state.lock().nodes.get(a_node).unwrap().members.is_empty());
        let b_node = tree.state.lock().node_of(b).unwrap();
        assert_eq!(tree.state.lock().nodes.get(b_node).unwrap().members.len(), 1);
    }

    #[test]
    fn change_group_reports_exactly_the_moved_vms() {
        let tree = Tree::new();
        tree.init_predefined(default_alloc()).unwrap();
        let root = tree.predefined_id(Predefined::Root).unwrap();
        let a = tree.add_group(Some("a"), root, default_alloc()).unwrap();
        let b = tree.add_group(Some("b"), root, default_alloc()).unwrap();
        let sub = tree.add_group(Some("sub"), a, default_alloc()).unwrap();
        let world = WorldId { slot: 7, reinc: 0 };
        tree.join_group(world, sub).unwrap();

        let (_path, affected) = tree
            .change_group(sub, b, |_subject, _parent| Ok(()))
            .unwrap();
        assert_eq!(affected, alloc::vec![world]);
    }

    #[test]
    fn change_group_reverts_on_admission_failure() {
        let tree = Tree::new();
        tree.init_predefined(default_alloc()).unwrap();
        let root = tree.predefined_id(Predefined::Root).unwrap();
        let a = tree.add_group(Some("a"), root, default_alloc()).unwrap();
        let b = tree.add_group(Some("b"), root, default_alloc()).unwrap();
        let v = tree.add_group(Some("v"), a, default_alloc()).unwrap();
        let v_node_before = tree.state.lock().node_of(v).unwrap();
        let a_node = tree.state.lock().node_of(a).unwrap();

        let err = tree
            .change_group(v, b, |_subject, _parent| Err(SchedError::LimitExceeded))
            .unwrap_err();
        assert_eq!(err, SchedError::LimitExceeded);

        // v is unchanged: still a child of a, same node.
        let v_node_after = tree.state.lock().node_of(v).unwrap();
        assert_eq!(v_node_after, v_node_before);
        assert_eq!(tree.state.lock().nodes.get(v_node_after).unwrap().parent, Some(a_node));
        // b gained no members; the temp stand-in group was cleaned up.
        let b_node = tree.state.lock().node_of(b).unwrap();
        assert!(tree.state.lock().nodes.get(b_node).unwrap().members.is_empty());
    }
}
