//! storyline-core: Core types for the Storyline news clustering engine
//!
//! This crate provides the entities shared by the store, the clustering
//! engine and the admin CLI: articles, clusters, timeline events and their
//! identifiers.

pub mod types;

pub use types::{
    Article, ArticleBuilder, ArticleId, Cluster, ClusterEvent, ClusterId, ClusterQuality,
    EntityBag, EventId, EventKind, Signatures,
};
