//! Consistent hashing of string keys onto a dynamic set of named nodes.
//!
//! Each node owns a number of virtual nodes, placed on a 32-bit ring at
//! `hash("<name>:<index>")`. A key belongs to the node owning the first
//! position at or after `hash(key)`, wrapping around past the top of the
//! ring. Adding or removing a node therefore only moves the keys that land
//! on that node's positions.
//!
//! Replica counts are either given directly per node or derived from
//! relative weights, see [`Allocation`].
//!
//! ```
//! use chash::ConsistentHash;
//!
//! let ring = ConsistentHash::new();
//! ring.add("cache-a", 64);
//! ring.add("cache-b", 64);
//!
//! let node = ring.lookup("user:42").unwrap();
//! assert!(node == "cache-a" || node == "cache-b");
//! ```

mod consistent;
mod error;
mod hasher;
mod membership;
mod ring;

pub use consistent::{ConsistentHash, RingConfig};
pub use error::{Result, RingError};
pub use hasher::{Crc32, Fnv1a, HasherKind, RingHasher, Sha1Hasher};
pub use membership::{Allocation, Membership};
pub use ring::{Owners, Ring};
