//! The storage seam used by the clustering core.
//!
//! The core needs only a handful of operations over two collections
//! (articles, clusters) and the cluster event log:
//!
//! - find-by-id and find-by-filter reads
//! - `commit`, which applies a [`WriteBatch`] of field-level updates
//!
//! Every write goes through `commit`. Implementations must validate the
//! whole batch before applying any of it, so a failed commit leaves the
//! store exactly as it was. Individual operations are field updates
//! (push, increment, set, union) applied by the store itself; the core never
//! writes back a cluster it read earlier.

use std::future::Future;

use chrono::{DateTime, Utc};
use storyline_core::{
    Article, ArticleId, Cluster, ClusterEvent, ClusterId, EntityBag, Signatures,
};

use crate::error::StoreResult;

/// Filter for article queries. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArticleFilter {
    /// Only articles fetched at or after this instant.
    pub fetched_since: Option<DateTime<Utc>>,
    /// `Some(true)` for clustered articles, `Some(false)` for unclustered.
    pub clustered: Option<bool>,
    /// `Some(true)` for articles carrying persisted signatures.
    pub has_signatures: Option<bool>,
}

impl ArticleFilter {
    /// Matches articles fetched at or after `since`.
    pub fn fetched_since(since: DateTime<Utc>) -> Self {
        Self {
            fetched_since: Some(since),
            ..Self::default()
        }
    }

    /// Restricts the filter to clustered or unclustered articles.
    pub fn clustered(mut self, clustered: bool) -> Self {
        self.clustered = Some(clustered);
        self
    }

    /// Restricts the filter to articles with or without signatures.
    pub fn with_signatures(mut self, present: bool) -> Self {
        self.has_signatures = Some(present);
        self
    }

    /// Checks whether an article satisfies the filter.
    pub fn matches(&self, article: &Article) -> bool {
        if let Some(since) = self.fetched_since {
            if article.fetched_at < since {
                return false;
            }
        }
        if let Some(clustered) = self.clustered {
            if article.cluster_id.is_some() != clustered {
                return false;
            }
        }
        if let Some(present) = self.has_signatures {
            if article.signatures.is_some() != present {
                return false;
            }
        }
        true
    }
}

/// Filter for cluster queries. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterFilter {
    /// Only clusters updated at or after this instant.
    pub updated_since: Option<DateTime<Utc>>,
    /// Only clusters with at least this many articles.
    pub min_size: Option<u32>,
}

impl ClusterFilter {
    /// Checks whether a cluster satisfies the filter.
    pub fn matches(&self, cluster: &Cluster) -> bool {
        if let Some(since) = self.updated_since {
            if cluster.last_updated < since {
                return false;
            }
        }
        if let Some(min_size) = self.min_size {
            if cluster.quality.size < min_size {
                return false;
            }
        }
        true
    }
}

/// A single field-level write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Insert a new cluster document.
    InsertCluster(Cluster),

    /// Push an article onto a cluster: append its ID, increment its
    /// source's tally, union its entities, bump size, fold `similarity`
    /// into the running coherence and set `last_updated`.
    AppendArticle {
        cluster_id: ClusterId,
        article_id: ArticleId,
        source: String,
        entities: EntityBag,
        similarity: f64,
        at: DateTime<Utc>,
    },

    /// Absorb `source` into `target` and delete `source`.
    ///
    /// Article IDs are appended, source tallies summed, entity bags unioned,
    /// coherence size-weighted and `first_seen` set to the earlier value.
    AbsorbCluster {
        source: ClusterId,
        target: ClusterId,
        at: DateTime<Utc>,
    },

    /// Pull articles out of a cluster, decrementing their sources' tallies
    /// and recomputing size. `at` updates `last_updated` when present.
    DetachArticles {
        cluster_id: ClusterId,
        articles: Vec<(ArticleId, String)>,
        at: Option<DateTime<Utc>>,
    },

    /// Delete a cluster document.
    DeleteCluster(ClusterId),

    /// Point every listed article at `cluster_id`.
    SetArticleCluster {
        article_ids: Vec<ArticleId>,
        cluster_id: ClusterId,
    },

    /// Unset `cluster_id` on every article matching the filter.
    ClearClusterIds(ArticleFilter),

    /// Persist freshly generated signatures for an article.
    SetSignatures {
        article_id: ArticleId,
        signatures: Signatures,
        normalized_title: String,
        normalized_lead: String,
    },

    /// Append a timeline event.
    InsertEvent(ClusterEvent),

    /// Move events from one cluster to another, optionally only those of
    /// the listed articles.
    RepointEvents {
        from: ClusterId,
        to: ClusterId,
        article_ids: Option<Vec<ArticleId>>,
    },

    /// Delete every event recorded for the listed articles.
    DeleteEvents { article_ids: Vec<ArticleId> },
}

/// An ordered group of writes applied all-or-nothing by [`Store::commit`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an operation.
    pub fn push(&mut self, op: WriteOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    /// Returns the number of operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if the batch holds no operations.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Iterates over the operations in order.
    pub fn iter(&self) -> impl Iterator<Item = &WriteOp> {
        self.ops.iter()
    }

    /// Consumes the batch, yielding its operations.
    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

impl From<Vec<WriteOp>> for WriteBatch {
    fn from(ops: Vec<WriteOp>) -> Self {
        Self { ops }
    }
}

/// Persistence operations required by the clustering core.
///
/// Each call is atomic at document granularity; `commit` is atomic for
/// the whole batch.
pub trait Store: Send + Sync {
    /// Find an article by ID.
    fn get_article(
        &self,
        id: ArticleId,
    ) -> impl Future<Output = StoreResult<Option<Article>>> + Send;

    /// Find all articles matching a filter, ordered by `fetched_at` then ID.
    fn find_articles(
        &self,
        filter: &ArticleFilter,
    ) -> impl Future<Output = StoreResult<Vec<Article>>> + Send;

    /// Find a cluster by ID.
    fn get_cluster(
        &self,
        id: ClusterId,
    ) -> impl Future<Output = StoreResult<Option<Cluster>>> + Send;

    /// Find all clusters matching a filter.
    fn find_clusters(
        &self,
        filter: &ClusterFilter,
    ) -> impl Future<Output = StoreResult<Vec<Cluster>>> + Send;

    /// All events of a cluster, newest first.
    fn cluster_events(
        &self,
        cluster_id: ClusterId,
    ) -> impl Future<Output = StoreResult<Vec<ClusterEvent>>> + Send;

    /// Delete every cluster without articles, returning how many were removed.
    fn delete_empty_clusters(&self) -> impl Future<Output = StoreResult<u64>> + Send;

    /// Apply a batch of writes atomically.
    fn commit(&self, batch: WriteBatch) -> impl Future<Output = StoreResult<()>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn article_at(fetched_at: DateTime<Utc>) -> Article {
        Article::builder()
            .title("t")
            .source("s")
            .fetched_at(fetched_at)
            .build()
    }

    #[test]
    fn article_filter_default_matches_everything() {
        let article = article_at(Utc::now());
        assert!(ArticleFilter::default().matches(&article));
    }

    #[test]
    fn article_filter_by_window() {
        let now = Utc::now();
        let filter = ArticleFilter::fetched_since(now - Duration::days(1));

        assert!(filter.matches(&article_at(now)));
        assert!(!filter.matches(&article_at(now - Duration::days(2))));
    }

    #[test]
    fn article_filter_by_cluster_state() {
        let mut article = article_at(Utc::now());
        let unclustered = ArticleFilter::default().clustered(false);
        assert!(unclustered.matches(&article));

        article.cluster_id = Some(ClusterId::new());
        assert!(!unclustered.matches(&article));
        assert!(ArticleFilter::default().clustered(true).matches(&article));
    }

    #[test]
    fn cluster_filter_by_size_and_age() {
        let now = Utc::now();
        let cluster = Cluster::seed(&article_at(now), now);

        let filter = ClusterFilter {
            updated_since: Some(now - Duration::hours(1)),
            min_size: Some(2),
        };
        assert!(!filter.matches(&cluster));

        let filter = ClusterFilter {
            updated_since: Some(now - Duration::hours(1)),
            min_size: Some(1),
        };
        assert!(filter.matches(&cluster));
    }

    #[test]
    fn write_batch_collects_ops_in_order() {
        let mut batch = WriteBatch::new();
        assert!(batch.is_empty());

        let cluster_id = ClusterId::new();
        batch
            .push(WriteOp::DeleteCluster(cluster_id))
            .push(WriteOp::DeleteEvents { article_ids: vec![] });

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.iter().next(), Some(&WriteOp::DeleteCluster(cluster_id)));
    }
}
