use std::{fs, path::Path, str::FromStr};

use anyhow::{bail, Context};
use chash::RingConfig;
use serde::Deserialize;

/// A node and its capacity (replica count or weight, depending on the ring).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    #[serde(default = "default_capacity")]
    pub capacity: u32,
}

fn default_capacity() -> u32 {
    1
}

impl FromStr for NodeSpec {
    type Err = anyhow::Error;

    /// `NAME` or `NAME=CAPACITY`.
    fn from_str(s: &str) -> anyhow::Result<Self> {
        let (name, capacity) = match s.split_once('=') {
            Some((name, cap)) => {
                let cap = cap
                    .trim()
                    .parse()
                    .with_context(|| format!("invalid capacity in '{s}'"))?;
                (name.trim(), cap)
            }
            None => (s.trim(), default_capacity()),
        };
        if name.is_empty() {
            bail!("node name is empty in '{s}'");
        }
        Ok(Self {
            name: name.to_owned(),
            capacity,
        })
    }
}

/// Contents of a `--config` file.
///
/// ```json
/// {
///   "allocation": { "mode": "weighted", "multiplier": 160 },
///   "hasher": "crc32",
///   "nodes": [ { "name": "a", "capacity": 10 } ]
/// }
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProbeFile {
    #[serde(flatten)]
    pub ring: RingConfig,
    pub nodes: Vec<NodeSpec>,
}

impl ProbeFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("couldn't read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("couldn't parse {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chash::{Allocation, HasherKind};

    #[test]
    fn node_spec_forms() {
        let bare: NodeSpec = "alpha".parse().expect("bare name");
        assert_eq!(bare, NodeSpec { name: "alpha".into(), capacity: 1 });

        let sized: NodeSpec = "beta=30".parse().expect("name=capacity");
        assert_eq!(sized, NodeSpec { name: "beta".into(), capacity: 30 });

        assert!("=3".parse::<NodeSpec>().is_err());
        assert!("gamma=lots".parse::<NodeSpec>().is_err());
        assert!("delta=-1".parse::<NodeSpec>().is_err());
    }

    #[test]
    fn file_with_ring_settings() {
        let file: ProbeFile = serde_json::from_str(
            r#"{
                "allocation": {"mode": "weighted", "multiplier": 160},
                "hasher": "sha1",
                "nodes": [{"name": "a", "capacity": 10}, {"name": "b"}]
            }"#,
        )
        .expect("Couldn't parse probe file");

        assert_eq!(file.ring.allocation, Allocation::Weighted { multiplier: 160 });
        assert_eq!(file.ring.hasher, HasherKind::Sha1);
        assert_eq!(file.nodes[1].capacity, 1);
    }

    #[test]
    fn empty_file_is_defaults() {
        let file: ProbeFile = serde_json::from_str("{}").expect("empty object");
        assert_eq!(file.ring, RingConfig::default());
        assert!(file.nodes.is_empty());
    }
}
