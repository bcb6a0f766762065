//! Cluster assignment and the administrative operations.
//!
//! ## Assignment
//!
//! 1. Load the index on first use, then evict entries older than the window
//! 2. Reuse the article's persisted signatures, or generate and persist them
//! 3. Verify up to `max_candidates` LSH candidates: a MinHash similarity at
//!    or above `minhash_threshold` is a strong match; one in
//!    `[ambiguous_floor, minhash_threshold)` is accepted when the TF-IDF
//!    cosine reaches `tfidf_threshold`
//! 4. Tally, per cluster, the best accepting similarity and the number of
//!    accepting candidates
//! 5. Join the best-supported cluster, or seed a new one
//! 6. Commit the whole decision as one batch, then index the article
//!
//! ## Exclusion
//!
//! A single writer lock guards the index. Assignment, merge, split and
//! rebuild all hold it while they read and write, so a rebuild runs to
//! completion before live ingestion resumes.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use storyline_core::{Article, ArticleId, Cluster, ClusterEvent, ClusterId, ClusterQuality, EventKind};
use storyline_store::{ArticleFilter, ClusterFilter, Store, WriteBatch, WriteOp};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::{ClusteringConfig, RankingConfig, TieBreak};
use crate::error::{ClusterError, ClusterResult};
use crate::index::{ClusterIndex, LoadSummary};
use crate::ranking::{ClusterRanker, RankedCluster};
use crate::signature::{ArticleText, Fingerprint};
use crate::tfidf::TfIdfVector;

/// How an assignment resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentKind {
    /// The article seeded a new cluster.
    Created,
    /// The article joined an existing cluster.
    Joined,
    /// The article already belonged to a cluster; nothing changed.
    Existing,
}

/// Outcome of assigning one article.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignment {
    pub article_id: ArticleId,
    pub cluster_id: ClusterId,
    pub kind: AssignmentKind,
    /// Best supporting similarity when the article joined a cluster.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
}

/// Counts reported by [`ClusterService::rebuild_clusters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RebuildSummary {
    pub window_days: u32,
    /// Window articles reassigned.
    pub articles: usize,
    /// Clusters deleted after the window was detached.
    pub clusters_deleted: u64,
    pub clusters_created: usize,
    pub assigned: usize,
    pub failed: usize,
}

/// Accepted candidates backing one cluster.
#[derive(Debug, Clone, Copy, Default)]
struct Support {
    best: f64,
    count: usize,
}

impl Support {
    fn record(&mut self, score: f64) {
        self.best = self.best.max(score);
        self.count += 1;
    }
}

/// The clustering engine over a [`Store`].
pub struct ClusterService<S> {
    store: S,
    config: ClusteringConfig,
    ranker: ClusterRanker,
    writer: Mutex<ClusterIndex>,
}

impl<S: Store> ClusterService<S> {
    /// Creates a service with an unloaded index.
    ///
    /// The index loads lazily on the first assignment, or eagerly through
    /// [`initialize`](Self::initialize).
    pub fn new(store: S, config: ClusteringConfig, ranking: RankingConfig) -> ClusterResult<Self> {
        config.validate()?;
        ranking.validate()?;
        let index = ClusterIndex::new(&config)?;
        Ok(Self {
            store,
            config,
            ranker: ClusterRanker::new(ranking),
            writer: Mutex::new(index),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ClusteringConfig {
        &self.config
    }

    pub fn ranker(&self) -> &ClusterRanker {
        &self.ranker
    }

    // ========================================================================
    // Index lifecycle
    // ========================================================================

    /// Loads the index from the persisted signatures of window articles.
    pub async fn initialize(&self) -> ClusterResult<LoadSummary> {
        let mut index = self.writer.lock().await;
        index
            .load(&self.store, &self.config, self.window_start(Utc::now()))
            .await
    }

    /// Discards the index. The next assignment reloads it.
    pub async fn teardown(&self) {
        self.writer.lock().await.reset();
        debug!("Clustering index torn down");
    }

    /// Number of articles currently indexed.
    pub async fn indexed_articles(&self) -> usize {
        self.writer.lock().await.len()
    }

    /// Number of documents counted in the TF-IDF corpus statistics.
    pub async fn corpus_documents(&self) -> usize {
        self.writer.lock().await.corpus().document_count
    }

    // ========================================================================
    // Assignment
    // ========================================================================

    /// Assigns an article to a cluster, creating one if needed.
    ///
    /// Failures are logged and reported as `None`; nothing is applied for
    /// the failed article and other assignments are unaffected.
    pub async fn assign_to_cluster(&self, article_id: ArticleId) -> Option<ClusterId> {
        match self.try_assign_to_cluster(article_id).await {
            Ok(assignment) => Some(assignment.cluster_id),
            Err(e) => {
                error!("Failed to assign article {} to a cluster: {}", article_id, e);
                None
            }
        }
    }

    /// Assigns an article to a cluster, reporting failures to the caller.
    pub async fn try_assign_to_cluster(&self, article_id: ArticleId) -> ClusterResult<Assignment> {
        let work = async {
            let mut index = self.writer.lock().await;
            let now = Utc::now();
            self.assign_locked(&mut index, article_id, now, self.window_start(now))
                .await
        };

        match self.config.assignment_timeout_ms {
            Some(ms) => tokio::time::timeout(std::time::Duration::from_millis(ms), work)
                .await
                .map_err(|_| ClusterError::Timeout(ms))?,
            None => work.await,
        }
    }

    /// Assigns one article with the writer lock held. Index entries fetched
    /// before `horizon` are evicted first.
    async fn assign_locked(
        &self,
        index: &mut ClusterIndex,
        article_id: ArticleId,
        now: DateTime<Utc>,
        horizon: DateTime<Utc>,
    ) -> ClusterResult<Assignment> {
        let article = self
            .store
            .get_article(article_id)
            .await?
            .ok_or(ClusterError::ArticleNotFound(article_id))?;

        if let Some(cluster_id) = article.cluster_id {
            debug!("Article {} already in cluster {}", article_id, cluster_id);
            return Ok(Assignment {
                article_id,
                cluster_id,
                kind: AssignmentKind::Existing,
                similarity: None,
            });
        }

        if !index.is_loaded() {
            index.load(&self.store, &self.config, horizon).await?;
        }
        index.evict_before(horizon)?;

        // Corpus statistics only count the article once the batch commits.
        let text = ArticleText::of(&article, &self.config);
        let mut batch = WriteBatch::new();
        let fingerprint = match Fingerprint::parse(&article, &self.config) {
            Ok(Some(fingerprint)) => fingerprint,
            parsed => {
                if let Err(e) = parsed {
                    warn!("Corrupt signature on article {}, regenerating: {}", article.id, e);
                }
                let fingerprint = if index.is_observed(&article.id) {
                    text.sign(&self.config, index.corpus())
                } else {
                    text.sign_unobserved(&self.config, index.corpus())
                };
                batch.push(text.persist(&article, &fingerprint));
                fingerprint
            }
        };

        let support = self
            .gather_support(index, &article, &fingerprint, &mut batch)
            .await?;
        let winner = self.select_winner(support).await?;

        let assignment = match winner {
            Some((cluster, support)) => {
                batch
                    .push(WriteOp::AppendArticle {
                        cluster_id: cluster.id,
                        article_id: article.id,
                        source: article.source.clone(),
                        entities: article.seed_entities(),
                        similarity: support.best,
                        at: now,
                    })
                    .push(WriteOp::SetArticleCluster {
                        article_ids: vec![article.id],
                        cluster_id: cluster.id,
                    })
                    .push(WriteOp::InsertEvent(ClusterEvent::new(
                        cluster.id,
                        article.id,
                        EventKind::Update,
                        article.fetched_at,
                    )));
                Assignment {
                    article_id,
                    cluster_id: cluster.id,
                    kind: AssignmentKind::Joined,
                    similarity: Some(support.best),
                }
            }
            None => {
                let cluster = Cluster::seed(&article, now);
                let cluster_id = cluster.id;
                batch
                    .push(WriteOp::InsertCluster(cluster))
                    .push(WriteOp::SetArticleCluster {
                        article_ids: vec![article.id],
                        cluster_id,
                    })
                    .push(WriteOp::InsertEvent(ClusterEvent::new(
                        cluster_id,
                        article.id,
                        EventKind::FirstReport,
                        article.fetched_at,
                    )));
                Assignment {
                    article_id,
                    cluster_id,
                    kind: AssignmentKind::Created,
                    similarity: None,
                }
            }
        };

        self.store.commit(batch).await?;

        index.observe(article.id, &text.tokens);
        if let Err(e) = index.insert(&article, fingerprint.minhash) {
            warn!("Article {} assigned but not indexed: {}", article.id, e);
        }

        match assignment.kind {
            AssignmentKind::Joined => info!(
                "Article {} joined cluster {} (similarity {:.3})",
                article.id,
                assignment.cluster_id,
                assignment.similarity.unwrap_or_default()
            ),
            _ => info!(
                "Article {} created cluster {}",
                article.id, assignment.cluster_id
            ),
        }
        Ok(assignment)
    }

    /// Verifies LSH candidates and tallies support per cluster.
    ///
    /// Candidate signatures that need regeneration are repaired through
    /// `batch`.
    async fn gather_support(
        &self,
        index: &ClusterIndex,
        article: &Article,
        fingerprint: &Fingerprint,
        batch: &mut WriteBatch,
    ) -> ClusterResult<BTreeMap<ClusterId, Support>> {
        let mut support: BTreeMap<ClusterId, Support> = BTreeMap::new();
        if fingerprint.minhash.is_empty() {
            debug!("Article {} has no n-grams, skipping candidate search", article.id);
            return Ok(support);
        }

        let candidates =
            index.candidates(&fingerprint.minhash, article.id, self.config.max_candidates)?;
        debug!("Article {}: {} LSH candidates", article.id, candidates.len());

        for candidate_id in candidates {
            let Some(candidate_hash) = index.minhash(&candidate_id) else {
                continue;
            };
            let minhash_similarity = fingerprint.minhash.similarity(candidate_hash);
            if minhash_similarity < self.config.ambiguous_floor {
                continue;
            }

            let Some(candidate) = self.store.get_article(candidate_id).await? else {
                warn!("Indexed article {} is missing from the store", candidate_id);
                continue;
            };

            let score = if minhash_similarity >= self.config.minhash_threshold {
                minhash_similarity
            } else {
                let candidate_tfidf = self.candidate_tfidf(index, &candidate, batch);
                let cosine = fingerprint.tfidf.cosine_similarity(&candidate_tfidf);
                debug!(
                    "Candidate {}: minhash {:.3} ambiguous, tf-idf {:.3}",
                    candidate_id, minhash_similarity, cosine
                );
                if cosine < self.config.tfidf_threshold {
                    continue;
                }
                cosine
            };

            match candidate.cluster_id {
                Some(cluster_id) => support.entry(cluster_id).or_default().record(score),
                None => debug!("Candidate {} accepted but unclustered", candidate_id),
            }
        }
        Ok(support)
    }

    /// The candidate's TF-IDF vector, regenerated when missing or corrupt.
    fn candidate_tfidf(
        &self,
        index: &ClusterIndex,
        candidate: &Article,
        batch: &mut WriteBatch,
    ) -> TfIdfVector {
        match Fingerprint::parse(candidate, &self.config) {
            Ok(Some(fingerprint)) => return fingerprint.tfidf,
            Ok(None) => {}
            Err(e) => warn!(
                "Corrupt signature on candidate {}, regenerating: {}",
                candidate.id, e
            ),
        }
        let text = ArticleText::of(candidate, &self.config);
        let fingerprint = text.sign(&self.config, index.corpus());
        batch.push(text.persist(candidate, &fingerprint));
        fingerprint.tfidf
    }

    /// Picks the cluster with the highest best support, breaking ties per
    /// the configured policy and then by lowest cluster id.
    async fn select_winner(
        &self,
        support: BTreeMap<ClusterId, Support>,
    ) -> ClusterResult<Option<(Cluster, Support)>> {
        let mut winner: Option<(Cluster, Support)> = None;
        for (cluster_id, backing) in support {
            let Some(cluster) = self.store.get_cluster(cluster_id).await? else {
                warn!("Supporting cluster {} no longer exists", cluster_id);
                continue;
            };
            let better = match &winner {
                None => true,
                Some((current, current_backing)) => {
                    self.compare(&cluster, &backing, current, current_backing) == Ordering::Greater
                }
            };
            if better {
                winner = Some((cluster, backing));
            }
        }
        Ok(winner)
    }

    fn compare(&self, a: &Cluster, a_support: &Support, b: &Cluster, b_support: &Support) -> Ordering {
        a_support
            .best
            .total_cmp(&b_support.best)
            .then_with(|| match self.config.tie_break {
                TieBreak::SupportCount => a_support.count.cmp(&b_support.count),
                TieBreak::OldestCluster => b.first_seen.cmp(&a.first_seen),
                TieBreak::LargestCluster => a.quality.size.cmp(&b.quality.size),
            })
    }

    // ========================================================================
    // Administrative operations
    // ========================================================================

    /// Moves every article and event of `source` into `target` and deletes
    /// `source`. Returns the merged cluster.
    ///
    /// Missing clusters are reported before a merge into itself is rejected.
    pub async fn merge_clusters(&self, source: ClusterId, target: ClusterId) -> ClusterResult<Cluster> {
        let _index = self.writer.lock().await;
        let absorbed = self.require_cluster(source).await?;
        if source == target {
            return Err(ClusterError::InvalidInput(format!(
                "cannot merge cluster {source} into itself"
            )));
        }
        self.require_cluster(target).await?;

        let mut batch = WriteBatch::new();
        batch
            .push(WriteOp::AbsorbCluster {
                source,
                target,
                at: Utc::now(),
            })
            .push(WriteOp::SetArticleCluster {
                article_ids: absorbed.article_ids.clone(),
                cluster_id: target,
            })
            .push(WriteOp::RepointEvents {
                from: source,
                to: target,
                article_ids: None,
            });
        self.store.commit(batch).await?;

        let merged = self.require_cluster(target).await?;
        info!(
            "Merged cluster {} into {} ({} articles)",
            source,
            target,
            merged.size()
        );
        Ok(merged)
    }

    /// Moves `article_ids` out of `cluster_id` into a new cluster.
    ///
    /// Ids that do not belong to the cluster are ignored. Fails with
    /// `InvalidInput` when none belong, or when every member would move.
    pub async fn split_cluster(
        &self,
        cluster_id: ClusterId,
        article_ids: &[ArticleId],
    ) -> ClusterResult<ClusterId> {
        if article_ids.is_empty() {
            return Err(ClusterError::InvalidInput(
                "split requires at least one article id".into(),
            ));
        }

        let _index = self.writer.lock().await;
        let cluster = self.require_cluster(cluster_id).await?;

        let mut seen = HashSet::new();
        let mut moved: Vec<Article> = Vec::new();
        for id in article_ids.iter().copied().filter(|id| seen.insert(*id)) {
            if !cluster.contains(&id) {
                debug!("Article {} is not in cluster {}, ignoring", id, cluster_id);
                continue;
            }
            match self.store.get_article(id).await? {
                Some(article) if article.cluster_id == Some(cluster_id) => moved.push(article),
                Some(_) => warn!("Article {} listed in cluster {} points elsewhere", id, cluster_id),
                None => warn!("Article {} listed in cluster {} is missing", id, cluster_id),
            }
        }

        let Some(first) = moved.first() else {
            return Err(ClusterError::InvalidInput(format!(
                "none of the given articles belong to cluster {cluster_id}"
            )));
        };
        if moved.len() == cluster.size() {
            return Err(ClusterError::InvalidInput(format!(
                "cannot split every article out of cluster {cluster_id}"
            )));
        }

        let now = Utc::now();
        let mut split = Cluster::seed(first, now);
        for article in &moved[1..] {
            split.article_ids.push(article.id);
            *split.source_counts.entry(article.source.clone()).or_insert(0) += 1;
            split.entity_bag.absorb(&article.seed_entities());
            split.first_seen = split.first_seen.min(article.fetched_at);
        }
        split.quality = ClusterQuality {
            coherence: 1.0,
            size: u32::try_from(moved.len()).unwrap_or(u32::MAX),
        };
        let split_id = split.id;
        let moved_ids: Vec<ArticleId> = moved.iter().map(|a| a.id).collect();

        let mut batch = WriteBatch::new();
        batch
            .push(WriteOp::DetachArticles {
                cluster_id,
                articles: moved.iter().map(|a| (a.id, a.source.clone())).collect(),
                at: Some(now),
            })
            .push(WriteOp::InsertCluster(split))
            .push(WriteOp::SetArticleCluster {
                article_ids: moved_ids.clone(),
                cluster_id: split_id,
            })
            .push(WriteOp::RepointEvents {
                from: cluster_id,
                to: split_id,
                article_ids: Some(moved_ids),
            });
        self.store.commit(batch).await?;

        info!(
            "Split {} articles out of cluster {} into {}",
            moved.len(),
            cluster_id,
            split_id
        );
        Ok(split_id)
    }

    /// Re-clusters every article fetched in the last `window_days` days.
    ///
    /// Window articles are detached from their clusters, their events are
    /// deleted, emptied clusters are removed and the index is rebuilt over
    /// the wider of the rebuild window and the clustering window. The
    /// articles are then reassigned oldest first against that index.
    /// Per-article failures are logged and counted.
    pub async fn rebuild_clusters(&self, window_days: u32) -> ClusterResult<RebuildSummary> {
        if window_days == 0 {
            return Err(ClusterError::InvalidInput(
                "rebuild window must be at least one day".into(),
            ));
        }

        let mut index = self.writer.lock().await;
        let now = Utc::now();
        let rebuild_start = now - Duration::days(i64::from(window_days));
        let horizon = rebuild_start.min(self.window_start(now));
        let filter = ArticleFilter::fetched_since(rebuild_start);
        let articles = self.store.find_articles(&filter).await?;
        info!(
            "Rebuilding clusters over {} articles from the last {} days",
            articles.len(),
            window_days
        );

        let mut members: BTreeMap<ClusterId, Vec<(ArticleId, String)>> = BTreeMap::new();
        for article in &articles {
            if let Some(cluster_id) = article.cluster_id {
                members
                    .entry(cluster_id)
                    .or_default()
                    .push((article.id, article.source.clone()));
            }
        }

        let mut batch = WriteBatch::new();
        for (cluster_id, detached) in members {
            if self.store.get_cluster(cluster_id).await?.is_none() {
                warn!("Cluster {} referenced by window articles is missing", cluster_id);
                continue;
            }
            batch.push(WriteOp::DetachArticles {
                cluster_id,
                articles: detached,
                at: None,
            });
        }
        batch
            .push(WriteOp::ClearClusterIds(filter))
            .push(WriteOp::DeleteEvents {
                article_ids: articles.iter().map(|a| a.id).collect(),
            });
        self.store.commit(batch).await?;

        let clusters_deleted = self.store.delete_empty_clusters().await?;
        index.load(&self.store, &self.config, horizon).await?;

        let mut summary = RebuildSummary {
            window_days,
            articles: articles.len(),
            clusters_deleted,
            ..RebuildSummary::default()
        };
        for article in &articles {
            match self
                .assign_locked(&mut index, article.id, Utc::now(), horizon)
                .await
            {
                Ok(assignment) => {
                    summary.assigned += 1;
                    if assignment.kind == AssignmentKind::Created {
                        summary.clusters_created += 1;
                    }
                }
                Err(e) => {
                    error!("Rebuild failed to reassign article {}: {}", article.id, e);
                    summary.failed += 1;
                }
            }
        }

        info!(
            "Rebuild complete: {} assigned, {} failed, {} clusters deleted, {} created",
            summary.assigned, summary.failed, summary.clusters_deleted, summary.clusters_created
        );
        Ok(summary)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn get_cluster(&self, cluster_id: ClusterId) -> ClusterResult<Cluster> {
        self.require_cluster(cluster_id).await
    }

    /// Timeline of a cluster, newest first.
    pub async fn cluster_timeline(&self, cluster_id: ClusterId) -> ClusterResult<Vec<ClusterEvent>> {
        self.require_cluster(cluster_id).await?;
        Ok(self.store.cluster_events(cluster_id).await?)
    }

    /// Scored newsletter candidates updated since `since`.
    ///
    /// `since` defaults to `max_age_hours` ago.
    pub async fn ranked_clusters(
        &self,
        limit: usize,
        since: Option<DateTime<Utc>>,
    ) -> ClusterResult<Vec<RankedCluster>> {
        let config = self.ranker.config();
        let now = Utc::now();
        let since = since.unwrap_or_else(|| {
            now - Duration::milliseconds((config.max_age_hours * 3_600_000.0) as i64)
        });
        let filter = ClusterFilter {
            updated_since: Some(since),
            min_size: Some(config.min_cluster_size),
        };

        let clusters = self.store.find_clusters(&filter).await?;
        let considered = clusters.len();
        let ranked = self.ranker.rank(clusters, now, limit);
        info!(
            "Ranked {} of {} clusters for the newsletter",
            ranked.len(),
            considered
        );
        Ok(ranked)
    }

    /// The `limit` best clusters for a newsletter, best first.
    pub async fn top_clusters_for_newsletter(
        &self,
        limit: usize,
        since: Option<DateTime<Utc>>,
    ) -> ClusterResult<Vec<Cluster>> {
        Ok(self
            .ranked_clusters(limit, since)
            .await?
            .into_iter()
            .map(|ranked| ranked.cluster)
            .collect())
    }

    async fn require_cluster(&self, cluster_id: ClusterId) -> ClusterResult<Cluster> {
        self.store
            .get_cluster(cluster_id)
            .await?
            .ok_or(ClusterError::ClusterNotFound(cluster_id))
    }

    fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(i64::from(self.config.window_days))
    }
}
