//! In-memory store with JSON snapshot persistence.
//!
//! `MemoryStore` keeps articles and clusters in ordered maps behind a single
//! `RwLock`. A commit validates the whole batch against the current state
//! before touching anything, then applies every operation under one write
//! guard, so readers never observe a half-applied batch.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use storyline_core::{Article, ArticleId, Cluster, ClusterEvent, ClusterId, EntityBag};

use crate::error::{StoreError, StoreResult};
use crate::store::{ArticleFilter, ClusterFilter, Store, WriteBatch, WriteOp};

/// Serialized form of a [`MemoryStore`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub articles: Vec<Article>,
    #[serde(default)]
    pub clusters: Vec<Cluster>,
    #[serde(default)]
    pub events: Vec<ClusterEvent>,
}

#[derive(Debug, Default)]
struct MemoryState {
    articles: BTreeMap<ArticleId, Article>,
    clusters: BTreeMap<ClusterId, Cluster>,
    events: Vec<ClusterEvent>,
}

/// Thread-safe in-memory implementation of [`Store`].
///
/// Cloning is cheap and clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from a snapshot.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let state = MemoryState {
            articles: snapshot.articles.into_iter().map(|a| (a.id, a)).collect(),
            clusters: snapshot.clusters.into_iter().map(|c| (c.id, c)).collect(),
            events: snapshot.events,
        };
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Loads a store from a JSON snapshot file.
    ///
    /// A missing file yields an empty store.
    pub fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("No snapshot at {}, starting empty", path.display());
            return Ok(Self::new());
        }

        let raw = fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&raw)?;
        tracing::info!(
            "Loaded snapshot from {}: {} articles, {} clusters, {} events",
            path.display(),
            snapshot.articles.len(),
            snapshot.clusters.len(),
            snapshot.events.len()
        );
        Ok(Self::from_snapshot(snapshot))
    }

    /// Writes the current state to a JSON snapshot file.
    ///
    /// The file is written next to its destination and renamed into place.
    pub fn save(&self, path: impl AsRef<Path>) -> StoreResult<()> {
        let path = path.as_ref();
        let snapshot = self.snapshot()?;
        let json = serde_json::to_string_pretty(&snapshot)?;

        let staging = path.with_extension("json.tmp");
        fs::write(&staging, json)?;
        fs::rename(&staging, path)?;

        tracing::debug!("Saved snapshot to {}", path.display());
        Ok(())
    }

    /// Copies the current state into a snapshot.
    pub fn snapshot(&self) -> StoreResult<Snapshot> {
        let state = self.read()?;
        Ok(Snapshot {
            articles: state.articles.values().cloned().collect(),
            clusters: state.clusters.values().cloned().collect(),
            events: state.events.clone(),
        })
    }

    /// Inserts a new article. Ingestion owns articles; the clustering core
    /// only updates them through [`Store::commit`].
    pub fn insert_article(&self, article: Article) -> StoreResult<()> {
        let mut state = self.write()?;
        if state.articles.contains_key(&article.id) {
            return Err(StoreError::DuplicateArticle(article.id));
        }
        state.articles.insert(article.id, article);
        Ok(())
    }

    /// Number of stored articles.
    pub fn article_count(&self) -> StoreResult<usize> {
        Ok(self.read()?.articles.len())
    }

    /// Number of stored clusters.
    pub fn cluster_count(&self) -> StoreResult<usize> {
        Ok(self.read()?.clusters.len())
    }

    /// Number of stored events.
    pub fn event_count(&self) -> StoreResult<usize> {
        Ok(self.read()?.events.len())
    }

    /// Describes every broken membership or tally invariant.
    ///
    /// An empty result means that every cluster's size matches its member
    /// list and source tallies, every member points back at its cluster, and
    /// every clustered article is listed by exactly that cluster.
    pub fn invariant_violations(&self) -> StoreResult<Vec<String>> {
        let state = self.read()?;
        let mut violations = Vec::new();
        let mut owners: HashMap<ArticleId, ClusterId> = HashMap::new();

        for cluster in state.clusters.values() {
            if !cluster.is_consistent() {
                violations.push(format!(
                    "cluster {}: size {} with {} members and tally {}",
                    cluster.id,
                    cluster.quality.size,
                    cluster.article_ids.len(),
                    cluster.source_counts.values().sum::<u32>()
                ));
            }
            for article_id in &cluster.article_ids {
                if let Some(other) = owners.insert(*article_id, cluster.id) {
                    violations.push(format!(
                        "article {article_id} listed by clusters {other} and {}",
                        cluster.id
                    ));
                }
                match state.articles.get(article_id) {
                    Some(article) if article.cluster_id == Some(cluster.id) => {}
                    Some(article) => violations.push(format!(
                        "article {article_id} listed by cluster {} but points at {:?}",
                        cluster.id, article.cluster_id
                    )),
                    None => violations.push(format!(
                        "cluster {} lists missing article {article_id}",
                        cluster.id
                    )),
                }
            }
        }

        for article in state.articles.values() {
            if let Some(cluster_id) = article.cluster_id {
                match state.clusters.get(&cluster_id) {
                    Some(cluster) if cluster.contains(&article.id) => {}
                    Some(_) => violations.push(format!(
                        "article {} points at cluster {cluster_id} which does not list it",
                        article.id
                    )),
                    None => violations.push(format!(
                        "article {} points at missing cluster {cluster_id}",
                        article.id
                    )),
                }
            }
        }

        Ok(violations)
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))
    }
}

// ============================================================================
// Batch validation and application
// ============================================================================

/// Tracks cluster creation and deletion across a batch during validation.
struct Preflight<'a> {
    state: &'a MemoryState,
    overrides: HashMap<ClusterId, bool>,
}

impl<'a> Preflight<'a> {
    fn new(state: &'a MemoryState) -> Self {
        Self {
            state,
            overrides: HashMap::new(),
        }
    }

    fn cluster_exists(&self, id: ClusterId) -> bool {
        self.overrides
            .get(&id)
            .copied()
            .unwrap_or_else(|| self.state.clusters.contains_key(&id))
    }

    fn require_cluster(&self, id: ClusterId) -> StoreResult<()> {
        if self.cluster_exists(id) {
            Ok(())
        } else {
            Err(StoreError::ClusterNotFound(id))
        }
    }

    fn require_article(&self, id: ArticleId) -> StoreResult<()> {
        if self.state.articles.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::ArticleNotFound(id))
        }
    }

    fn check(&mut self, op: &WriteOp) -> StoreResult<()> {
        match op {
            WriteOp::InsertCluster(cluster) => {
                if self.cluster_exists(cluster.id) {
                    return Err(StoreError::DuplicateCluster(cluster.id));
                }
                self.overrides.insert(cluster.id, true);
            }
            WriteOp::AppendArticle {
                cluster_id,
                article_id,
                ..
            } => {
                self.require_cluster(*cluster_id)?;
                self.require_article(*article_id)?;
            }
            WriteOp::AbsorbCluster { source, target, .. } => {
                if source == target {
                    return Err(StoreError::InvalidBatch(format!(
                        "cluster {source} cannot absorb itself"
                    )));
                }
                self.require_cluster(*source)?;
                self.require_cluster(*target)?;
                self.overrides.insert(*source, false);
            }
            WriteOp::DetachArticles { cluster_id, .. } => {
                self.require_cluster(*cluster_id)?;
            }
            WriteOp::DeleteCluster(id) => {
                self.require_cluster(*id)?;
                self.overrides.insert(*id, false);
            }
            WriteOp::SetArticleCluster {
                article_ids,
                cluster_id,
            } => {
                self.require_cluster(*cluster_id)?;
                for id in article_ids {
                    self.require_article(*id)?;
                }
            }
            WriteOp::ClearClusterIds(_) => {}
            WriteOp::SetSignatures { article_id, .. } => {
                self.require_article(*article_id)?;
            }
            WriteOp::InsertEvent(event) => {
                self.require_cluster(event.cluster_id)?;
                self.require_article(event.article_id)?;
            }
            WriteOp::RepointEvents { to, .. } => {
                self.require_cluster(*to)?;
            }
            WriteOp::DeleteEvents { .. } => {}
        }
        Ok(())
    }
}

impl MemoryState {
    fn apply(&mut self, op: WriteOp) {
        match op {
            WriteOp::InsertCluster(cluster) => {
                self.clusters.insert(cluster.id, cluster);
            }
            WriteOp::AppendArticle {
                cluster_id,
                article_id,
                source,
                entities,
                similarity,
                at,
            } => {
                if let Some(cluster) = self.clusters.get_mut(&cluster_id) {
                    append_article(cluster, article_id, source, &entities, similarity, at);
                }
            }
            WriteOp::AbsorbCluster { source, target, at } => {
                if let Some(absorbed) = self.clusters.remove(&source) {
                    if let Some(cluster) = self.clusters.get_mut(&target) {
                        absorb_cluster(cluster, absorbed, at);
                    }
                }
            }
            WriteOp::DetachArticles {
                cluster_id,
                articles,
                at,
            } => {
                if let Some(cluster) = self.clusters.get_mut(&cluster_id) {
                    detach_articles(cluster, &articles, at);
                }
            }
            WriteOp::DeleteCluster(id) => {
                self.clusters.remove(&id);
            }
            WriteOp::SetArticleCluster {
                article_ids,
                cluster_id,
            } => {
                for id in article_ids {
                    if let Some(article) = self.articles.get_mut(&id) {
                        article.cluster_id = Some(cluster_id);
                    }
                }
            }
            WriteOp::ClearClusterIds(filter) => {
                for article in self.articles.values_mut() {
                    if filter.matches(article) {
                        article.cluster_id = None;
                    }
                }
            }
            WriteOp::SetSignatures {
                article_id,
                signatures,
                normalized_title,
                normalized_lead,
            } => {
                if let Some(article) = self.articles.get_mut(&article_id) {
                    article.signatures = Some(signatures);
                    article.normalized_title = Some(normalized_title);
                    article.normalized_lead = Some(normalized_lead);
                }
            }
            WriteOp::InsertEvent(event) => self.events.push(event),
            WriteOp::RepointEvents {
                from,
                to,
                article_ids,
            } => {
                for event in self.events.iter_mut().filter(|e| e.cluster_id == from) {
                    let selected = article_ids
                        .as_ref()
                        .is_none_or(|ids| ids.contains(&event.article_id));
                    if selected {
                        event.cluster_id = to;
                    }
                }
            }
            WriteOp::DeleteEvents { article_ids } => {
                self.events.retain(|e| !article_ids.contains(&e.article_id));
            }
        }
    }
}

fn append_article(
    cluster: &mut Cluster,
    article_id: ArticleId,
    source: String,
    entities: &EntityBag,
    similarity: f64,
    at: DateTime<Utc>,
) {
    cluster.last_updated = at;
    if cluster.contains(&article_id) {
        return;
    }

    let previous = f64::from(cluster.quality.size);
    cluster.quality.coherence =
        (cluster.quality.coherence * previous + similarity) / (previous + 1.0);

    cluster.article_ids.push(article_id);
    *cluster.source_counts.entry(source).or_insert(0) += 1;
    cluster.entity_bag.absorb(entities);
    cluster.quality.size = member_count(cluster);
}

fn absorb_cluster(cluster: &mut Cluster, absorbed: Cluster, at: DateTime<Utc>) {
    let kept = f64::from(cluster.quality.size);
    let taken = f64::from(absorbed.quality.size);
    if kept + taken > 0.0 {
        cluster.quality.coherence = (cluster.quality.coherence * kept
            + absorbed.quality.coherence * taken)
            / (kept + taken);
    }

    for id in absorbed.article_ids {
        if !cluster.contains(&id) {
            cluster.article_ids.push(id);
        }
    }
    for (source, count) in absorbed.source_counts {
        *cluster.source_counts.entry(source).or_insert(0) += count;
    }
    cluster.entity_bag.absorb(&absorbed.entity_bag);
    cluster.first_seen = cluster.first_seen.min(absorbed.first_seen);
    cluster.last_updated = at;
    cluster.quality.size = member_count(cluster);
}

fn detach_articles(
    cluster: &mut Cluster,
    articles: &[(ArticleId, String)],
    at: Option<DateTime<Utc>>,
) {
    for (id, source) in articles {
        let Some(position) = cluster.article_ids.iter().position(|a| a == id) else {
            continue;
        };
        cluster.article_ids.remove(position);

        if let Some(count) = cluster.source_counts.get_mut(source) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                cluster.source_counts.remove(source);
            }
        }
    }
    cluster.quality.size = member_count(cluster);
    if let Some(at) = at {
        cluster.last_updated = at;
    }
}

fn member_count(cluster: &Cluster) -> u32 {
    u32::try_from(cluster.article_ids.len()).unwrap_or(u32::MAX)
}

// ============================================================================
// Store implementation
// ============================================================================

impl Store for MemoryStore {
    async fn get_article(&self, id: ArticleId) -> StoreResult<Option<Article>> {
        Ok(self.read()?.articles.get(&id).cloned())
    }

    async fn find_articles(&self, filter: &ArticleFilter) -> StoreResult<Vec<Article>> {
        let state = self.read()?;
        let mut articles: Vec<Article> = state
            .articles
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        articles.sort_by(|a, b| a.fetched_at.cmp(&b.fetched_at).then(a.id.cmp(&b.id)));
        Ok(articles)
    }

    async fn get_cluster(&self, id: ClusterId) -> StoreResult<Option<Cluster>> {
        Ok(self.read()?.clusters.get(&id).cloned())
    }

    async fn find_clusters(&self, filter: &ClusterFilter) -> StoreResult<Vec<Cluster>> {
        let state = self.read()?;
        Ok(state
            .clusters
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect())
    }

    async fn cluster_events(&self, cluster_id: ClusterId) -> StoreResult<Vec<ClusterEvent>> {
        let state = self.read()?;
        // Latest insertion first among equal timestamps.
        let mut events: Vec<ClusterEvent> = state
            .events
            .iter()
            .rev()
            .filter(|e| e.cluster_id == cluster_id)
            .cloned()
            .collect();
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(events)
    }

    async fn delete_empty_clusters(&self) -> StoreResult<u64> {
        let mut state = self.write()?;
        let before = state.clusters.len();
        state.clusters.retain(|_, c| !c.article_ids.is_empty());
        let removed = (before - state.clusters.len()) as u64;
        if removed > 0 {
            tracing::debug!("Deleted {} empty clusters", removed);
        }
        Ok(removed)
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        let mut state = self.write()?;

        let mut preflight = Preflight::new(&state);
        for op in batch.iter() {
            preflight.check(op)?;
        }

        let ops = batch.into_ops();
        tracing::debug!("Committing batch of {} operations", ops.len());
        for op in ops {
            state.apply(op);
        }
        Ok(())
    }
}
