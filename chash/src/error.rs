//! Error types for ring lookups.

/// Errors returned by ring operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RingError {
    /// The ring holds no virtual nodes, so no key can be routed.
    #[error("no nodes available")]
    Empty,
}

pub type Result<T> = std::result::Result<T, RingError>;
