//! The membership table and the policies that turn capacities into replica counts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// How a node's configured capacity becomes a number of virtual nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Allocation {
    /// Capacity is the replica count itself (coerced to at least 1).
    #[default]
    Fixed,
    /// Capacity is a relative weight. A node gets
    /// `floor(weight * multiplier * nodes / total_weight)` virtual nodes, so
    /// light nodes may round down to none.
    Weighted { multiplier: u32 },
}

/// Node name to configured capacity. Ordered by name so that rebuilds are
/// independent of insertion order.
#[derive(Debug, Clone, Default)]
pub struct Membership {
    nodes: BTreeMap<String, u32>,
}

impl Membership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `name`. Returns the previous capacity, if any.
    pub fn upsert(&mut self, name: &str, capacity: u32, allocation: Allocation) -> Option<u32> {
        let capacity = match allocation {
            Allocation::Fixed => capacity.max(1),
            Allocation::Weighted { .. } => capacity,
        };
        self.nodes.insert(name.to_owned(), capacity)
    }

    pub fn remove(&mut self, name: &str) -> Option<u32> {
        self.nodes.remove(name)
    }

    pub fn capacity(&self, name: &str) -> Option<u32> {
        self.nodes.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node names in ascending order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Replica count of every member under `allocation`, in name order.
    pub fn replica_counts(&self, allocation: Allocation) -> Vec<(&str, u32)> {
        match allocation {
            Allocation::Fixed => self
                .nodes
                .iter()
                .map(|(name, &cap)| (name.as_str(), cap.max(1)))
                .collect(),
            Allocation::Weighted { multiplier } => {
                let active = self.nodes.values().filter(|&&w| w > 0).count() as u64;
                let total: u64 = self.nodes.values().map(|&w| u64::from(w)).sum();

                self.nodes
                    .iter()
                    .map(|(name, &weight)| {
                        let replicas =
                            weighted_share(u64::from(weight), total, multiplier, active);
                        if replicas == 0 && weight > 0 {
                            warn!(node = %name, weight, multiplier, "node rounded down to zero virtual nodes");
                        }
                        (name.as_str(), replicas)
                    })
                    .collect()
            }
        }
    }
}

/// `floor(weight / total * multiplier * nodes)` in exact integer arithmetic.
fn weighted_share(weight: u64, total: u64, multiplier: u32, nodes: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    // weight <= u32::MAX and multiplier <= u32::MAX, so go wide for the node factor.
    let numer = u128::from(weight) * u128::from(multiplier) * u128::from(nodes);
    let share = numer / u128::from(total);
    u32::try_from(share).unwrap_or(u32::MAX)
}
