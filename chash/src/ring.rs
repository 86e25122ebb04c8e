//! The ring store: sorted virtual-node positions plus the owner of each.

use std::{collections::BTreeMap, fmt, sync::Arc};

use fnv::FnvHashMap;
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::{
    error::{Result, RingError},
    hasher::{vnode_position, Crc32, RingHasher},
    membership::{Allocation, Membership},
};

/// Owners returned by [`Ring::lookup_n`]. Replica groups are small, so they
/// stay on the stack.
pub type Owners = SmallVec<[String; 4]>;

/// An unsynchronized consistent-hash ring.
///
/// Every mutation rebuilds the ring from the membership table, so the sorted
/// positions and the owner map always agree once a call returns.
/// [`ConsistentHash`](crate::ConsistentHash) puts one of these behind a lock.
#[derive(Clone)]
pub struct Ring {
    hasher: Arc<dyn RingHasher>,
    allocation: Allocation,
    membership: Membership,
    /// Virtual-node positions, ascending, each present once.
    positions: Vec<u32>,
    /// Position -> owning node.
    owners: FnvHashMap<u32, Arc<str>>,
    /// Replicas allotted to each member by the last rebuild.
    replicas: BTreeMap<Arc<str>, u32>,
}

impl Ring {
    pub fn new() -> Self {
        Self::with_parts(Arc::new(Crc32), Allocation::Fixed)
    }

    pub fn with_hasher(hasher: impl RingHasher + 'static) -> Self {
        Self::with_parts(Arc::new(hasher), Allocation::Fixed)
    }

    pub fn with_parts(hasher: Arc<dyn RingHasher>, allocation: Allocation) -> Self {
        Self {
            hasher,
            allocation,
            membership: Membership::new(),
            positions: Vec::new(),
            owners: FnvHashMap::default(),
            replicas: BTreeMap::new(),
        }
    }

    pub fn allocation(&self) -> Allocation {
        self.allocation
    }

    /// Insert or replace `name` with `capacity`, then rebuild.
    ///
    /// In fixed mode a capacity of 0 counts as 1. In weighted mode a weight
    /// of 0 keeps the node as a member that owns no virtual nodes.
    pub fn add(&mut self, name: &str, capacity: u32) {
        let previous = self.membership.upsert(name, capacity, self.allocation);
        self.rebuild();
        debug!(
            node = name,
            capacity,
            ?previous,
            replicas = self.replicas_of(name).unwrap_or(0),
            "added node to ring"
        );
    }

    /// Remove `name` and rebuild. Returns whether it was a member.
    pub fn remove(&mut self, name: &str) -> bool {
        if self.membership.remove(name).is_none() {
            return false;
        }
        self.rebuild();
        debug!(node = name, "removed node from ring");
        true
    }

    /// The node owning the first position at or after `hash(key)`, wrapping
    /// to the lowest position when the hash is past the end.
    pub fn lookup(&self, key: &str) -> Result<String> {
        let start = self.start_index(key)?;
        Ok(self.owner_at(start).to_owned())
    }

    /// Up to `n` distinct nodes met walking clockwise from `key`, primary
    /// owner first. Fewer are returned when fewer nodes own positions.
    pub fn lookup_n(&self, key: &str, n: usize) -> Result<Owners> {
        let start = self.start_index(key)?;
        let mut owners = Owners::new();
        if n == 0 {
            return Ok(owners);
        }

        let (before, after) = self.positions.split_at(start);
        for pos in after.iter().chain(before) {
            let owner = &*self.owners[pos];
            if !owners.iter().any(|o| o == owner) {
                owners.push(owner.to_owned());
                if owners.len() == n {
                    break;
                }
            }
        }

        Ok(owners)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.membership.contains(name)
    }

    /// The capacity as stored (after fixed-mode coercion).
    pub fn capacity_of(&self, name: &str) -> Option<u32> {
        self.membership.capacity(name)
    }

    /// Virtual nodes allotted to `name` by the current allocation.
    pub fn replicas_of(&self, name: &str) -> Option<u32> {
        self.replicas.get(name).copied()
    }

    /// Member names in ascending order.
    pub fn nodes(&self) -> Vec<String> {
        self.membership.names().map(str::to_owned).collect()
    }

    pub fn node_count(&self) -> usize {
        self.membership.len()
    }

    /// Distinct positions on the ring.
    pub fn vnode_count(&self) -> usize {
        self.positions.len()
    }

    /// True when no key can be routed.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    fn start_index(&self, key: &str) -> Result<usize> {
        if self.positions.is_empty() {
            return Err(RingError::Empty);
        }
        let hash = self.hasher.hash32(key.as_bytes());
        let index = self.positions.partition_point(|&pos| pos < hash);
        Ok(if index == self.positions.len() { 0 } else { index })
    }

    fn owner_at(&self, index: usize) -> &str {
        &self.owners[&self.positions[index]]
    }

    /// Recompute every virtual node from scratch.
    ///
    /// Members are visited in name order, so when two virtual-node keys hash
    /// to the same position the later one in that order owns it, whatever
    /// order the nodes were added in.
    fn rebuild(&mut self) {
        let counts = self.membership.replica_counts(self.allocation);
        let total: usize = counts.iter().map(|&(_, r)| r as usize).sum();

        let mut owners = FnvHashMap::with_capacity_and_hasher(total, Default::default());
        let mut replicas = BTreeMap::new();
        for (name, count) in counts {
            let owner: Arc<str> = Arc::from(name);
            for i in 0..count {
                owners.insert(vnode_position(&*self.hasher, name, i), Arc::clone(&owner));
            }
            replicas.insert(owner, count);
        }

        let mut positions: Vec<u32> = owners.keys().copied().collect();
        positions.sort_unstable();

        trace!(
            nodes = replicas.len(),
            requested = total,
            positions = positions.len(),
            "rebuilt ring"
        );
        self.positions = positions;
        self.owners = owners;
        self.replicas = replicas;
    }
}

impl Default for Ring {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Ring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ring")
            .field("allocation", &self.allocation)
            .field("replicas", &self.replicas)
            .field("positions", &self.positions.len())
            .finish_non_exhaustive()
    }
}
