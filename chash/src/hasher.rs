//! 32-bit hash primitives used to place virtual nodes and keys on the ring.
//!
//! Every implementation builds a fresh digest state per call, so a single
//! hasher can be shared by all readers and writers of a ring without any
//! scratch state leaking from one call into the next.

use std::hash::Hasher;

use fnv::FnvHasher;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// A stateless, deterministic 32-bit hash.
pub trait RingHasher: Send + Sync {
    fn hash32(&self, bytes: &[u8]) -> u32;
}

impl<F> RingHasher for F
where
    F: Fn(&[u8]) -> u32 + Send + Sync,
{
    fn hash32(&self, bytes: &[u8]) -> u32 {
        self(bytes)
    }
}

/// CRC-32 (IEEE polynomial). The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct Crc32;

impl RingHasher for Crc32 {
    fn hash32(&self, bytes: &[u8]) -> u32 {
        crc32fast::hash(bytes)
    }
}

/// First four bytes of the SHA-1 digest, big-endian.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha1Hasher;

impl RingHasher for Sha1Hasher {
    fn hash32(&self, bytes: &[u8]) -> u32 {
        let digest = Sha1::digest(bytes);
        u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
    }
}

/// 64-bit FNV-1a folded down to 32 bits.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fnv1a;

impl RingHasher for Fnv1a {
    fn hash32(&self, bytes: &[u8]) -> u32 {
        let mut hasher = FnvHasher::default();
        hasher.write(bytes);
        let h = hasher.finish();
        ((h >> 32) ^ h) as u32
    }
}

/// Selects one of the built-in hashers from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HasherKind {
    #[default]
    Crc32,
    Sha1,
    Fnv1a,
}

impl HasherKind {
    pub fn build(self) -> Box<dyn RingHasher> {
        match self {
            Self::Crc32 => Box::new(Crc32),
            Self::Sha1 => Box::new(Sha1Hasher),
            Self::Fnv1a => Box::new(Fnv1a),
        }
    }
}

/// Position of the `index`th virtual node of `name`: `hash("<name>:<index>")`.
pub(crate) fn vnode_position(hasher: &dyn RingHasher, name: &str, index: u32) -> u32 {
    hasher.hash32(format!("{name}:{index}").as_bytes())
}
