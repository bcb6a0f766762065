//! Error types for the clustering engine.

use storyline_core::{ArticleId, ClusterId};
use storyline_store::StoreError;
use thiserror::Error;

/// Result type alias for clustering operations.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Errors surfaced by assignment and the administrative operations.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The referenced article does not exist.
    #[error("article not found: {0}")]
    ArticleNotFound(ArticleId),

    /// The referenced cluster does not exist.
    #[error("cluster not found: {0}")]
    ClusterNotFound(ClusterId),

    /// Malformed or empty arguments, rejected before any mutation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A persistence call failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The operation exceeded its deadline. Nothing was applied.
    #[error("operation timed out after {0} ms")]
    Timeout(u64),

    /// The LSH index was configured inconsistently.
    #[error("index error: {0}")]
    Lsh(#[from] LshError),

    /// A configuration value was rejected.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl ClusterError {
    /// Whether the error reports a missing article or cluster.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::ArticleNotFound(_) | Self::ClusterNotFound(_) => true,
            Self::Store(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// Whether retrying the whole operation later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Store(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// A persisted signature could not be parsed.
///
/// Never fatal: callers treat a corrupt signature as missing and regenerate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// A MinHash slot was not a non-negative integer.
    #[error("invalid minhash slot {index}: {value:?}")]
    InvalidSlot { index: usize, value: String },

    /// A MinHash signature had the wrong number of slots.
    #[error("expected {expected} minhash slots, found {found}")]
    SlotCount { expected: usize, found: usize },

    /// A TF-IDF entry was not a `term:weight` pair.
    #[error("invalid tf-idf entry: {0:?}")]
    InvalidTerm(String),
}

/// Invalid LSH banding parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LshError {
    #[error("number of bands must be positive")]
    ZeroBands,

    #[error("{num_hashes} hashes cannot be split evenly into {num_bands} bands")]
    UnevenBands { num_hashes: usize, num_bands: usize },

    #[error("signature has {found} slots, index expects {expected}")]
    SignatureLength { expected: usize, found: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_covers_store_errors() {
        let err = ClusterError::from(StoreError::ClusterNotFound(ClusterId::new()));
        assert!(err.is_not_found());
        assert!(!err.is_transient());
    }

    #[test]
    fn transient_covers_timeouts_and_outages() {
        assert!(ClusterError::Timeout(50).is_transient());
        let err = ClusterError::from(StoreError::Unavailable("down".into()));
        assert!(err.is_transient());
        assert!(!ClusterError::InvalidInput("empty".into()).is_transient());
    }
}
