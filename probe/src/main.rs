use anyhow::Result;
use chash::{Allocation, ConsistentHash, HasherKind, RingError};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::{debug, info};

mod config;

use config::{NodeSpec, ProbeFile};

/// Used when neither the command line nor a config file names any node.
const SAMPLE_NODES: [&str; 5] = ["a", "b", "c", "d", "e"];
const SAMPLE_KEYS: [&str; 4] = ["a", "b", "c", "d"];

#[derive(Parser, Debug)]
#[command(version, about = "Show which node each key routes to", long_about = None)]
struct ProbeArgs {
    /// Node to add, as NAME or NAME=CAPACITY. May be repeated.
    #[arg(short, long = "node")]
    nodes: Vec<NodeSpec>,
    /// Treat capacities as weights, with this many virtual nodes per node on average.
    #[arg(short, long)]
    weighted: Option<u32>,
    /// Hash function placing nodes and keys.
    #[arg(long, value_enum)]
    hasher: Option<HasherArg>,
    /// Number of distinct owners to print per key.
    #[arg(short, long, default_value_t = 1)]
    replicas: usize,
    /// JSON file with ring settings and nodes. Command-line nodes are added after it.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Log filter when RUST_LOG is unset.
    #[arg(long, default_value = "warn")]
    log_level: String,
    /// Keys to look up.
    keys: Vec<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum HasherArg {
    Crc32,
    Sha1,
    Fnv1a,
}

impl From<HasherArg> for HasherKind {
    fn from(value: HasherArg) -> Self {
        match value {
            HasherArg::Crc32 => Self::Crc32,
            HasherArg::Sha1 => Self::Sha1,
            HasherArg::Fnv1a => Self::Fnv1a,
        }
    }
}

/// Initialize the `tracing` subscriber. `RUST_LOG` wins over `level`.
fn setup_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_ring(args: &ProbeArgs) -> Result<ConsistentHash> {
    let mut file = match &args.config {
        Some(path) => ProbeFile::load(path)?,
        None => ProbeFile::default(),
    };
    if let Some(multiplier) = args.weighted {
        file.ring.allocation = Allocation::Weighted { multiplier };
    }
    if let Some(hasher) = args.hasher {
        file.ring.hasher = hasher.into();
    }

    let ring = ConsistentHash::from_config(&file.ring);
    let mut nodes: Vec<NodeSpec> = file.nodes;
    nodes.extend(args.nodes.iter().cloned());
    if nodes.is_empty() {
        debug!("no nodes given, using the sample set");
        nodes = SAMPLE_NODES
            .iter()
            .map(|name| NodeSpec {
                name: (*name).to_owned(),
                capacity: 1,
            })
            .collect();
    }

    for node in &nodes {
        ring.add(&node.name, node.capacity);
    }
    info!(
        nodes = ring.node_count(),
        vnodes = ring.vnode_count(),
        allocation = ?file.ring.allocation,
        "ring ready"
    );

    Ok(ring)
}

fn route(ring: &ConsistentHash, key: &str, replicas: usize) -> String {
    let owners = if replicas <= 1 {
        ring.lookup(key)
    } else {
        ring.lookup_n(key, replicas).map(|group| group.join(", "))
    };
    match owners {
        Ok(owners) => format!("{key} -> {owners}"),
        Err(e @ RingError::Empty) => format!("{key} -> ({e})"),
    }
}

fn main() -> Result<()> {
    let args = ProbeArgs::parse();
    setup_tracing(&args.log_level);

    let ring = build_ring(&args)?;

    let keys: Vec<&str> = if args.keys.is_empty() {
        SAMPLE_KEYS.to_vec()
    } else {
        args.keys.iter().map(String::as_str).collect()
    };
    for key in keys {
        println!("{}", route(&ring, key, args.replicas));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(argv: &[&str]) -> ProbeArgs {
        ProbeArgs::try_parse_from(std::iter::once("probe").chain(argv.iter().copied()))
            .expect("Couldn't parse args")
    }

    #[test]
    fn defaults_to_sample_nodes() {
        let ring = build_ring(&args(&[])).expect("sample ring");
        assert_eq!(ring.nodes(), SAMPLE_NODES.to_vec());
        for key in SAMPLE_KEYS {
            let node = ring.lookup(key).expect("lookup");
            assert!(SAMPLE_NODES.contains(&node.as_str()));
        }
    }

    #[test]
    fn weighted_from_flags() {
        let ring = build_ring(&args(&[
            "--weighted", "10", "-n", "big=3", "-n", "small=1", "--hasher", "sha1",
        ]))
        .expect("weighted ring");
        // W = 4, R * N = 20.
        assert_eq!(ring.replicas_of("big"), Some(15));
        assert_eq!(ring.replicas_of("small"), Some(5));
    }

    #[test]
    fn route_lines() {
        let ring = ConsistentHash::new();
        assert_eq!(route(&ring, "k", 1), "k -> (no nodes available)");

        ring.add("only", 2);
        assert_eq!(route(&ring, "k", 1), "k -> only");
        assert_eq!(route(&ring, "k", 3), "k -> only");
    }

    #[test]
    fn rejects_bad_node() {
        let parsed = ProbeArgs::try_parse_from(["probe", "-n", "x=nope"]);
        assert!(parsed.is_err());
    }
}
