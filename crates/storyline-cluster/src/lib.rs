//! storyline-cluster: Near-duplicate detection and story clustering
//!
//! This crate groups news articles reporting the same story. Each article
//! gets a MinHash signature over character n-grams of its normalized title
//! and lead, plus a TF-IDF vector. A banded LSH index retrieves candidate
//! near-duplicates, which are verified exactly before the article joins an
//! existing cluster or seeds a new one.
//!
//! # Modules
//!
//! - [`normalize`]: text normalization, lead extraction, n-grams
//! - [`minhash`], [`tfidf`]: similarity signatures and their wire formats
//! - [`lsh`]: banded candidate retrieval
//! - [`index`]: the windowed index object and its load/teardown lifecycle
//! - [`service`]: assignment, merge, split, rebuild and digest queries
//! - [`ranking`]: newsletter scoring and digest helpers
//!
//! # Example
//!
//! ```no_run
//! use storyline_cluster::{ClusterService, ClusteringConfig, RankingConfig};
//! use storyline_store::MemoryStore;
//!
//! # async fn example(article_id: storyline_core::ArticleId) -> storyline_cluster::ClusterResult<()> {
//! let service = ClusterService::new(
//!     MemoryStore::new(),
//!     ClusteringConfig::from_env()?,
//!     RankingConfig::from_env()?,
//! )?;
//!
//! if let Some(cluster_id) = service.assign_to_cluster(article_id).await {
//!     println!("assigned to {cluster_id}");
//! }
//! let top = service.top_clusters_for_newsletter(10, None).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod index;
pub mod lsh;
pub mod minhash;
pub mod normalize;
pub mod ranking;
pub mod service;
pub mod signature;
pub mod tfidf;

pub use config::{ClusteringConfig, ConfigError, RankingConfig, TieBreak};
pub use error::{ClusterError, ClusterResult, LshError, SignatureError};
pub use index::{ClusterIndex, LoadSummary};
pub use lsh::LshIndex;
pub use minhash::MinHash;
pub use ranking::{
    ClusterRanker, ClusterStats, RankedCluster, cluster_stats, format_summary, format_title,
};
pub use service::{Assignment, AssignmentKind, ClusterService, RebuildSummary};
pub use signature::{ArticleText, Fingerprint};
pub use tfidf::{CorpusStats, TfIdfVector};
