//! The in-memory candidate index and its lifecycle.
//!
//! `ClusterIndex` owns the LSH buckets, the cached MinHash of every indexed
//! article and the corpus statistics used for TF-IDF. It only covers
//! articles fetched inside the rolling window: entries are evicted as the
//! window moves, and a rebuild discards everything.
//!
//! The index starts unloaded. [`ClusterIndex::load`] populates it from the
//! persisted signatures of window articles; [`ClusterIndex::reset`] tears it
//! down again.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use storyline_core::{Article, ArticleId};
use storyline_store::{ArticleFilter, Store};

use crate::config::ClusteringConfig;
use crate::error::{ClusterResult, LshError};
use crate::lsh::LshIndex;
use crate::minhash::MinHash;
use crate::signature::{ArticleText, Fingerprint};
use crate::tfidf::CorpusStats;

/// Counts reported by [`ClusterIndex::load`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Window articles seen.
    pub articles: usize,
    /// Articles added to the LSH index.
    pub indexed: usize,
    /// Persisted signatures that failed to parse and were regenerated.
    pub regenerated: usize,
}

/// LSH buckets, cached signatures and corpus statistics for one window.
#[derive(Debug)]
pub struct ClusterIndex {
    lsh: LshIndex<ArticleId>,
    corpus: CorpusStats,
    observed: HashSet<ArticleId>,
    by_time: BTreeMap<(DateTime<Utc>, ArticleId), MinHash>,
    fetched_at: HashMap<ArticleId, DateTime<Utc>>,
    loaded: bool,
}

impl ClusterIndex {
    /// Creates an empty, unloaded index.
    pub fn new(config: &ClusteringConfig) -> Result<Self, LshError> {
        Ok(Self {
            lsh: LshIndex::new(config.num_hashes, config.num_bands)?,
            corpus: CorpusStats::new(),
            observed: HashSet::new(),
            by_time: BTreeMap::new(),
            fetched_at: HashMap::new(),
            loaded: false,
        })
    }

    /// Whether the index reflects the store.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Populates the index from every article fetched since `window_start`.
    ///
    /// All window articles feed the corpus statistics; those carrying
    /// signatures are indexed. Corrupt signatures are regenerated in memory.
    pub async fn load<S: Store>(
        &mut self,
        store: &S,
        config: &ClusteringConfig,
        window_start: DateTime<Utc>,
    ) -> ClusterResult<LoadSummary> {
        self.reset();

        let articles = store
            .find_articles(&ArticleFilter::fetched_since(window_start))
            .await?;
        let mut summary = LoadSummary {
            articles: articles.len(),
            ..LoadSummary::default()
        };

        let mut texts = Vec::with_capacity(articles.len());
        for article in &articles {
            let text = ArticleText::of(article, config);
            self.observe(article.id, &text.tokens);
            texts.push(text);
        }

        for (article, text) in articles.iter().zip(&texts) {
            let minhash = match Fingerprint::parse(article, config) {
                Ok(Some(fingerprint)) => fingerprint.minhash,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(
                        "Corrupt signature on article {}, regenerating: {}",
                        article.id,
                        e
                    );
                    summary.regenerated += 1;
                    text.sign(config, &self.corpus).minhash
                }
            };
            if self.insert(article, minhash)? {
                summary.indexed += 1;
            }
        }

        self.loaded = true;
        tracing::info!(
            "Loaded clustering index: {} window articles, {} indexed, {} regenerated",
            summary.articles,
            summary.indexed,
            summary.regenerated
        );
        Ok(summary)
    }

    /// Discards all state and marks the index unloaded.
    pub fn reset(&mut self) {
        self.lsh.clear();
        self.corpus.clear();
        self.observed.clear();
        self.by_time.clear();
        self.fetched_at.clear();
        self.loaded = false;
    }

    /// Counts an article's tokens in the corpus, once per article.
    pub fn observe(&mut self, id: ArticleId, tokens: &[String]) {
        if self.observed.insert(id) {
            self.corpus.add_document(tokens);
        }
    }

    /// Whether the article's tokens are already counted in the corpus.
    pub fn is_observed(&self, id: &ArticleId) -> bool {
        self.observed.contains(id)
    }

    /// Corpus statistics for TF-IDF.
    pub fn corpus(&self) -> &CorpusStats {
        &self.corpus
    }

    /// Indexes an article's MinHash, replacing any earlier entry.
    ///
    /// Empty signatures (no n-grams) are not indexed; returns whether the
    /// article was added.
    pub fn insert(&mut self, article: &Article, minhash: MinHash) -> Result<bool, LshError> {
        self.remove(article.id)?;
        if minhash.is_empty() {
            return Ok(false);
        }
        self.lsh.add(article.id, &minhash)?;
        self.fetched_at.insert(article.id, article.fetched_at);
        self.by_time.insert((article.fetched_at, article.id), minhash);
        Ok(true)
    }

    /// Removes an article from the LSH index.
    pub fn remove(&mut self, id: ArticleId) -> Result<(), LshError> {
        if let Some(fetched_at) = self.fetched_at.remove(&id) {
            if let Some(minhash) = self.by_time.remove(&(fetched_at, id)) {
                self.lsh.remove(id, &minhash)?;
            }
        }
        Ok(())
    }

    /// Evicts every entry fetched before `cutoff`, returning how many left.
    pub fn evict_before(&mut self, cutoff: DateTime<Utc>) -> Result<usize, LshError> {
        let expired: Vec<(DateTime<Utc>, ArticleId)> = self
            .by_time
            .keys()
            .take_while(|(fetched_at, _)| *fetched_at < cutoff)
            .copied()
            .collect();

        for key in &expired {
            if let Some(minhash) = self.by_time.remove(key) {
                self.lsh.remove(key.1, &minhash)?;
            }
            self.fetched_at.remove(&key.1);
        }
        if !expired.is_empty() {
            tracing::debug!("Evicted {} articles fetched before {}", expired.len(), cutoff);
        }
        Ok(expired.len())
    }

    /// Candidate articles for `minhash`, best band agreement first.
    pub fn candidates(
        &self,
        minhash: &MinHash,
        exclude: ArticleId,
        limit: usize,
    ) -> Result<Vec<ArticleId>, LshError> {
        Ok(self
            .lsh
            .candidates(minhash)?
            .into_iter()
            .filter(|id| *id != exclude)
            .take(limit)
            .collect())
    }

    /// Cached MinHash of an indexed article.
    pub fn minhash(&self, id: &ArticleId) -> Option<&MinHash> {
        let fetched_at = self.fetched_at.get(id)?;
        self.by_time.get(&(*fetched_at, *id))
    }

    /// Number of indexed articles.
    pub fn len(&self) -> usize {
        self.lsh.len()
    }

    /// Returns true if no article is indexed.
    pub fn is_empty(&self) -> bool {
        self.lsh.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use storyline_store::{MemoryStore, WriteBatch, WriteOp};

    fn article(title: &str, fetched_at: DateTime<Utc>) -> Article {
        Article::builder()
            .title(title)
            .content("Officials confirmed the details on Monday. More follows.")
            .source("wire")
            .fetched_at(fetched_at)
            .build()
    }

    fn minhash_of(article: &Article, config: &ClusteringConfig) -> MinHash {
        ArticleText::of(article, config)
            .sign(config, &CorpusStats::new())
            .minhash
    }

    #[test]
    fn insert_and_query() {
        let config = ClusteringConfig::default();
        let mut index = ClusterIndex::new(&config).unwrap();
        let a = article("Bridge closes for repairs", Utc::now());
        let h = minhash_of(&a, &config);

        assert!(index.insert(&a, h.clone()).unwrap());
        assert_eq!(index.len(), 1);
        assert_eq!(index.minhash(&a.id), Some(&h));
        assert!(index.candidates(&h, a.id, 10).unwrap().is_empty());
        assert_eq!(index.candidates(&h, ArticleId::new(), 10).unwrap(), vec![a.id]);
    }

    #[test]
    fn empty_minhash_is_not_indexed() {
        let config = ClusteringConfig::default();
        let mut index = ClusterIndex::new(&config).unwrap();
        let a = article("", Utc::now());

        assert!(!index.insert(&a, MinHash::new(config.num_hashes)).unwrap());
        assert!(index.is_empty());
    }

    #[test]
    fn reinsert_replaces_entry() {
        let config = ClusteringConfig::default();
        let mut index = ClusterIndex::new(&config).unwrap();
        let a = article("Bridge closes for repairs", Utc::now());
        let old = minhash_of(&a, &config);
        let new = minhash_of(&article("Entirely different story text", Utc::now()), &config);

        index.insert(&a, old.clone()).unwrap();
        index.insert(&a, new.clone()).unwrap();

        assert_eq!(index.len(), 1);
        assert!(index.candidates(&old, ArticleId::new(), 10).unwrap().is_empty());
        assert_eq!(index.candidates(&new, ArticleId::new(), 10).unwrap(), vec![a.id]);
    }

    #[test]
    fn eviction_drops_old_entries() {
        let config = ClusteringConfig::default();
        let mut index = ClusterIndex::new(&config).unwrap();
        let now = Utc::now();
        let old = article("Bridge closes for repairs", now - Duration::days(20));
        let fresh = article("Bridge closes for repairs", now);
        let h = minhash_of(&old, &config);

        index.insert(&old, h.clone()).unwrap();
        index.insert(&fresh, h.clone()).unwrap();

        assert_eq!(index.evict_before(now - Duration::days(14)).unwrap(), 1);
        assert_eq!(index.candidates(&h, ArticleId::new(), 10).unwrap(), vec![fresh.id]);
        assert!(index.minhash(&old.id).is_none());
    }

    #[test]
    fn observe_counts_each_article_once() {
        let config = ClusteringConfig::default();
        let mut index = ClusterIndex::new(&config).unwrap();
        let id = ArticleId::new();
        let tokens = vec!["bridge".to_string()];

        assert!(!index.is_observed(&id));
        index.observe(id, &tokens);
        index.observe(id, &tokens);
        assert!(index.is_observed(&id));
        assert_eq!(index.corpus().document_count, 1);
    }

    #[tokio::test]
    async fn load_indexes_signed_window_articles() {
        let config = ClusteringConfig::default();
        let store = MemoryStore::new();
        let now = Utc::now();

        let signed = article("Bridge closes for repairs", now - Duration::hours(1));
        let unsigned = article("Council approves budget", now - Duration::hours(2));
        let stale = article("Bridge closes for repairs", now - Duration::days(30));
        let corrupt = article("Flood warnings issued downstream", now);
        for a in [&signed, &unsigned, &stale, &corrupt] {
            store.insert_article((*a).clone()).unwrap();
        }

        let mut batch = WriteBatch::new();
        for a in [&signed, &stale] {
            let text = ArticleText::of(a, &config);
            let fingerprint = text.sign(&config, &CorpusStats::new());
            batch.push(text.persist(a, &fingerprint));
        }
        batch.push(WriteOp::SetSignatures {
            article_id: corrupt.id,
            signatures: storyline_core::Signatures {
                minhash: "not,a,signature".into(),
                tfidf: String::new(),
            },
            normalized_title: String::new(),
            normalized_lead: String::new(),
        });
        store.commit(batch).await.unwrap();

        let mut index = ClusterIndex::new(&config).unwrap();
        let summary = index
            .load(&store, &config, now - Duration::days(14))
            .await
            .unwrap();

        assert!(index.is_loaded());
        assert_eq!(summary.articles, 3);
        assert_eq!(summary.indexed, 2);
        assert_eq!(summary.regenerated, 1);
        assert_eq!(index.corpus().document_count, 3);
        assert!(index.minhash(&signed.id).is_some());
        assert!(index.minhash(&stale.id).is_none());

        index.reset();
        assert!(!index.is_loaded());
        assert!(index.is_empty());
        assert_eq!(index.corpus().document_count, 0);
    }
}
