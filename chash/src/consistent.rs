use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    hasher::{Crc32, HasherKind, RingHasher},
    membership::Allocation,
    ring::{Owners, Ring},
};

/// How to build a [`ConsistentHash`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingConfig {
    pub allocation: Allocation,
    pub hasher: HasherKind,
}

/// A [`Ring`] shared between threads.
///
/// Adds and removes hold the write lock across the whole rebuild; lookups
/// share the read lock. Wrap in an `Arc` to hand out to workers.
#[derive(Debug, Default)]
pub struct ConsistentHash {
    ring: RwLock<Ring>,
}

impl ConsistentHash {
    /// Empty ring with CRC-32 and fixed replica counts.
    pub fn new() -> Self {
        Self::from_ring(Ring::new())
    }

    pub fn with_hasher(hasher: impl RingHasher + 'static) -> Self {
        Self::from_ring(Ring::with_hasher(hasher))
    }

    pub fn with_allocation(allocation: Allocation) -> Self {
        Self::from_ring(Ring::with_parts(Arc::new(Crc32), allocation))
    }

    /// Weighted ring with global replica multiplier `multiplier`.
    pub fn weighted(multiplier: u32) -> Self {
        Self::with_allocation(Allocation::Weighted { multiplier })
    }

    pub fn from_config(config: &RingConfig) -> Self {
        let hasher: Arc<dyn RingHasher> = Arc::from(config.hasher.build());
        Self::from_ring(Ring::with_parts(hasher, config.allocation))
    }

    pub fn from_ring(ring: Ring) -> Self {
        Self {
            ring: RwLock::new(ring),
        }
    }

    pub fn add(&self, name: &str, capacity: u32) {
        self.write().add(name, capacity);
    }

    /// Returns whether `name` was a member.
    pub fn remove(&self, name: &str) -> bool {
        self.write().remove(name)
    }

    pub fn lookup(&self, key: &str) -> Result<String> {
        self.read().lookup(key)
    }

    pub fn lookup_n(&self, key: &str, n: usize) -> Result<Owners> {
        self.read().lookup_n(key, n)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains(name)
    }

    pub fn capacity_of(&self, name: &str) -> Option<u32> {
        self.read().capacity_of(name)
    }

    pub fn replicas_of(&self, name: &str) -> Option<u32> {
        self.read().replicas_of(name)
    }

    pub fn nodes(&self) -> Vec<String> {
        self.read().nodes()
    }

    pub fn node_count(&self) -> usize {
        self.read().node_count()
    }

    pub fn vnode_count(&self) -> usize {
        self.read().vnode_count()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// An owned copy of the ring as of now.
    pub fn snapshot(&self) -> Ring {
        self.read().clone()
    }

    // A panicking writer never leaves a half-built ring behind (rebuild
    // swaps in finished structures), so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, Ring> {
        self.ring.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Ring> {
        self.ring.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RingError;
    use std::thread;

    #[test]
    fn sample_nodes_route_consistently() {
        let ch = ConsistentHash::new();
        for name in ["a", "b", "c", "d", "e"] {
            ch.add(name, 1);
        }
        for key in ["a", "b", "c", "d"] {
            let node = ch.lookup(key).expect("lookup");
            assert!(ch.contains(&node));
            assert_eq!(ch.lookup(key).expect("lookup"), node);
        }
    }

    #[test]
    fn separate_instances_agree() {
        let one = ConsistentHash::weighted(40);
        let two = ConsistentHash::weighted(40);
        for (name, w) in [("A", 10), ("B", 10), ("C", 20)] {
            one.add(name, w);
        }
        for (name, w) in [("C", 20), ("B", 10), ("A", 10)] {
            two.add(name, w);
        }
        for i in 0..1_000 {
            let key = format!("user:{i}");
            assert_eq!(one.lookup(&key), two.lookup(&key));
        }
    }

    #[test]
    fn snapshot_is_detached() {
        let ch = ConsistentHash::new();
        ch.add("a", 4);
        let snap = ch.snapshot();
        ch.remove("a");
        assert!(ch.is_empty());
        assert_eq!(ch.lookup("k"), Err(RingError::Empty));
        assert_eq!(snap.lookup("k").expect("lookup"), "a");
    }

    #[test]
    fn config_selects_policy_and_hasher() {
        let config: RingConfig = serde_json::from_str(
            r#"{"allocation":{"mode":"weighted","multiplier":3},"hasher":"fnv1a"}"#,
        )
        .expect("Couldn't parse config");
        assert_eq!(config.hasher, HasherKind::Fnv1a);

        let ch = ConsistentHash::from_config(&config);
        ch.add("x", 1);
        ch.add("y", 2);
        // W = 3, R * N = 6.
        assert_eq!(ch.replicas_of("x"), Some(2));
        assert_eq!(ch.replicas_of("y"), Some(4));

        let defaults: RingConfig = serde_json::from_str("{}").expect("empty config");
        assert_eq!(defaults, RingConfig::default());
    }

    #[test]
    fn concurrent_lookups_during_membership_churn() {
        let ch = Arc::new(ConsistentHash::new());
        for name in ["stable-1", "stable-2"] {
            ch.add(name, 16);
        }

        thread::scope(|s| {
            let writer = Arc::clone(&ch);
            s.spawn(move || {
                for round in 0..50 {
                    let name = format!("churn-{}", round % 3);
                    writer.add(&name, 8);
                    writer.remove(&name);
                }
            });

            for t in 0..4 {
                let reader = Arc::clone(&ch);
                s.spawn(move || {
                    for i in 0..500 {
                        let node = reader
                            .lookup(&format!("{t}-{i}"))
                            .expect("stable nodes keep the ring non-empty");
                        assert!(node.starts_with("stable-") || node.starts_with("churn-"));
                    }
                });
            }
        });

        assert_eq!(ch.nodes(), vec!["stable-1", "stable-2"]);
        assert_eq!(ch.vnode_count(), 32);
    }
}
