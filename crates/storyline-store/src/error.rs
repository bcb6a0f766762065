//! Error types for the storage layer.

use storyline_core::{ArticleId, ClusterId};
use thiserror::Error;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Article not found.
    #[error("article not found: {0}")]
    ArticleNotFound(ArticleId),

    /// Cluster not found.
    #[error("cluster not found: {0}")]
    ClusterNotFound(ClusterId),

    /// Duplicate article - an article with this ID already exists.
    #[error("duplicate article: {0}")]
    DuplicateArticle(ArticleId),

    /// Duplicate cluster - a cluster with this ID already exists.
    #[error("duplicate cluster: {0}")]
    DuplicateCluster(ClusterId),

    /// A write batch referenced entities inconsistently.
    #[error("invalid write batch: {0}")]
    InvalidBatch(String),

    /// The backing store could not serve the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The operation did not complete in time.
    #[error("store operation timed out")]
    Timeout,

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Snapshot file I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether retrying the whole operation later may succeed.
    ///
    /// A transient failure never leaves a partially applied batch behind.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout | Self::Io(_))
    }

    /// Whether the error reports a missing article or cluster.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ArticleNotFound(_) | Self::ClusterNotFound(_))
    }
}
