//! Core data types for the Storyline clustering engine.
//!
//! This module defines the entities the clustering core reads and writes:
//!
//! - `Article`: an ingested news report (owned by the ingestion pipeline,
//!   except for `cluster_id` and `signatures`, which the core manages)
//! - `Cluster`: a set of articles believed to report the same story
//! - `ClusterEvent`: an append-only timeline entry for a cluster
//!
//! Set-like and map-like fields use `BTreeSet`/`BTreeMap` so that membership
//! is unique and serialization order is stable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Creates a new random identifier using UUID v4.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for an ingested article.
    ArticleId
);

uuid_id!(
    /// Unique identifier for a story cluster.
    ClusterId
);

uuid_id!(
    /// Unique identifier for a cluster timeline event.
    EventId
);

// ============================================================================
// Entities and Signatures
// ============================================================================

/// Named entities grouped by category.
///
/// Used both for an article's extracted entities and for a cluster's
/// accumulated entity bag. Each category is a set: duplicates collapse and
/// order carries no meaning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityBag {
    pub persons: BTreeSet<String>,
    pub orgs: BTreeSet<String>,
    pub places: BTreeSet<String>,
    pub topics: BTreeSet<String>,
}

impl EntityBag {
    /// Creates an empty entity bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if no category holds any entity.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.persons.is_empty()
            && self.orgs.is_empty()
            && self.places.is_empty()
            && self.topics.is_empty()
    }

    /// Total number of entities across all categories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.persons.len() + self.orgs.len() + self.places.len() + self.topics.len()
    }

    /// Unions every category of `other` into this bag.
    pub fn absorb(&mut self, other: &EntityBag) {
        self.persons.extend(other.persons.iter().cloned());
        self.orgs.extend(other.orgs.iter().cloned());
        self.places.extend(other.places.iter().cloned());
        self.topics.extend(other.topics.iter().cloned());
    }
}

/// Persisted similarity fingerprints of an article.
///
/// Both strings use the stable wire formats produced by the clustering
/// crate; changing either format requires a migration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signatures {
    /// Comma-joined MinHash slot values.
    pub minhash: String,
    /// Comma-joined `term:weight` pairs, sorted by term.
    #[serde(default)]
    pub tfidf: String,
}

// ============================================================================
// Article
// ============================================================================

/// An ingested news article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    /// Unique identifier for this article.
    pub id: ArticleId,

    /// Headline as published.
    pub title: String,

    /// Full body text.
    #[serde(default)]
    pub content: String,

    /// Optional summary supplied by the ingestion pipeline.
    #[serde(default)]
    pub summary: Option<String>,

    /// Publishing source (outlet name).
    pub source: String,

    /// Canonical URL, if known.
    #[serde(default)]
    pub url: Option<String>,

    /// When the article was fetched.
    pub fetched_at: DateTime<Utc>,

    /// Free-form topic labels.
    #[serde(default)]
    pub topics: Vec<String>,

    /// Entities extracted by the entity/topic collaborator.
    #[serde(default)]
    pub entities: EntityBag,

    /// Similarity signatures, once computed.
    #[serde(default)]
    pub signatures: Option<Signatures>,

    /// Normalized title used for signature generation.
    #[serde(default)]
    pub normalized_title: Option<String>,

    /// Normalized lead used for signature generation.
    #[serde(default)]
    pub normalized_lead: Option<String>,

    /// The cluster this article belongs to. Owned by the clustering core.
    #[serde(default)]
    pub cluster_id: Option<ClusterId>,
}

impl Article {
    /// Creates a builder for constructing an Article.
    #[must_use]
    pub fn builder() -> ArticleBuilder {
        ArticleBuilder::default()
    }

    /// Entities used to seed a new cluster.
    ///
    /// Topics fall back to the article's free-form topic labels when the
    /// extractor produced none.
    #[must_use]
    pub fn seed_entities(&self) -> EntityBag {
        let mut bag = self.entities.clone();
        if bag.topics.is_empty() {
            bag.topics = self.topics.iter().cloned().collect();
        }
        bag
    }

    /// Summary if present and non-empty, otherwise the title.
    #[must_use]
    pub fn summary_or_title(&self) -> &str {
        match self.summary.as_deref() {
            Some(summary) if !summary.trim().is_empty() => summary,
            _ => &self.title,
        }
    }
}

/// Builder for constructing Article instances.
#[derive(Debug, Default)]
pub struct ArticleBuilder {
    id: Option<ArticleId>,
    title: String,
    content: String,
    summary: Option<String>,
    source: String,
    url: Option<String>,
    fetched_at: Option<DateTime<Utc>>,
    topics: Vec<String>,
    entities: EntityBag,
}

impl ArticleBuilder {
    /// Sets the article ID (generates a new one if not set).
    #[must_use]
    pub fn id(mut self, id: ArticleId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    #[must_use]
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    #[must_use]
    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    #[must_use]
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the fetch timestamp (defaults to now).
    #[must_use]
    pub fn fetched_at(mut self, fetched_at: DateTime<Utc>) -> Self {
        self.fetched_at = Some(fetched_at);
        self
    }

    #[must_use]
    pub fn topics(mut self, topics: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.topics = topics.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn entities(mut self, entities: EntityBag) -> Self {
        self.entities = entities;
        self
    }

    /// Builds the Article, using defaults for unset fields.
    #[must_use]
    pub fn build(self) -> Article {
        Article {
            id: self.id.unwrap_or_default(),
            title: self.title,
            content: self.content,
            summary: self.summary,
            source: self.source,
            url: self.url,
            fetched_at: self.fetched_at.unwrap_or_else(Utc::now),
            topics: self.topics,
            entities: self.entities,
            signatures: None,
            normalized_title: None,
            normalized_lead: None,
            cluster_id: None,
        }
    }
}

// ============================================================================
// Cluster
// ============================================================================

/// Quality metrics of a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterQuality {
    /// How tightly related the members are (0.0 to 1.0).
    pub coherence: f64,

    /// Number of member articles. Always equals `article_ids.len()`.
    pub size: u32,
}

impl ClusterQuality {
    /// Quality of a freshly seeded single-article cluster.
    #[must_use]
    pub const fn singleton() -> Self {
        Self {
            coherence: 1.0,
            size: 1,
        }
    }
}

/// A set of articles believed to report the same underlying story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// Unique identifier for this cluster.
    pub id: ClusterId,

    /// Representative headline, fixed at creation time.
    pub canonical_title: String,

    /// Representative summary.
    pub summary: String,

    /// Union of the members' entities.
    pub entity_bag: EntityBag,

    /// Member article IDs in insertion order.
    pub article_ids: Vec<ArticleId>,

    /// Number of member articles per source.
    pub source_counts: BTreeMap<String, u32>,

    /// When the earliest member was fetched.
    pub first_seen: DateTime<Utc>,

    /// When the cluster last changed.
    pub last_updated: DateTime<Utc>,

    /// Coherence and size.
    pub quality: ClusterQuality,
}

impl Cluster {
    /// Seeds a new single-article cluster from `article`.
    #[must_use]
    pub fn seed(article: &Article, now: DateTime<Utc>) -> Self {
        let mut source_counts = BTreeMap::new();
        source_counts.insert(article.source.clone(), 1);

        Self {
            id: ClusterId::new(),
            canonical_title: article.title.clone(),
            summary: article.summary_or_title().to_string(),
            entity_bag: article.seed_entities(),
            article_ids: vec![article.id],
            source_counts,
            first_seen: article.fetched_at,
            last_updated: now,
            quality: ClusterQuality::singleton(),
        }
    }

    /// Returns the number of member articles.
    #[must_use]
    pub fn size(&self) -> usize {
        self.article_ids.len()
    }

    /// Checks if the cluster contains a specific article.
    #[must_use]
    pub fn contains(&self, article_id: &ArticleId) -> bool {
        self.article_ids.contains(article_id)
    }

    /// Number of distinct sources reporting this story.
    #[must_use]
    pub fn distinct_sources(&self) -> usize {
        self.source_counts.values().filter(|count| **count > 0).count()
    }

    /// Checks the size and source-tally invariants.
    ///
    /// `quality.size` must equal the member count, and the source tallies
    /// must sum to the same value.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let tally: u64 = self.source_counts.values().map(|c| u64::from(*c)).sum();
        self.quality.size as usize == self.article_ids.len() && tally == u64::from(self.quality.size)
    }
}

// ============================================================================
// Cluster Events
// ============================================================================

/// Kind of a cluster timeline entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// The article that founded the cluster.
    FirstReport,
    /// A later report joining the cluster.
    Update,
    /// An official statement.
    Official,
    /// Commentary or analysis.
    Analysis,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::FirstReport => "first_report",
            Self::Update => "update",
            Self::Official => "official",
            Self::Analysis => "analysis",
        };
        f.write_str(label)
    }
}

/// Append-only timeline entry recording how an article affected a cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterEvent {
    pub id: EventId,
    pub cluster_id: ClusterId,
    pub article_id: ArticleId,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ClusterEvent {
    /// Creates a new event without a note.
    #[must_use]
    pub fn new(
        cluster_id: ClusterId,
        article_id: ArticleId,
        kind: EventKind,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EventId::new(),
            cluster_id,
            article_id,
            timestamp,
            kind,
            note: None,
        }
    }

    /// Attaches a free-form note.
    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_article() -> Article {
        Article::builder()
            .title("Storm hits coast")
            .content("A powerful storm made landfall overnight.")
            .source("wire")
            .topics(["weather"])
            .build()
    }

    #[test]
    fn id_roundtrip_through_string() {
        let id = ArticleId::new();
        let parsed: ArticleId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn id_serializes_transparently() {
        let id = ClusterId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.0));
    }

    #[test]
    fn entity_bag_absorb_deduplicates() {
        let mut a = EntityBag::new();
        a.persons.insert("Ada".into());
        a.places.insert("Paris".into());

        let mut b = EntityBag::new();
        b.persons.insert("Ada".into());
        b.persons.insert("Grace".into());

        a.absorb(&b);

        assert_eq!(a.persons.len(), 2);
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn seed_entities_falls_back_to_topics() {
        let article = sample_article();
        let bag = article.seed_entities();
        assert!(bag.topics.contains("weather"));
    }

    #[test]
    fn seed_entities_prefers_extracted_topics() {
        let mut entities = EntityBag::new();
        entities.topics.insert("climate".into());
        let article = Article::builder()
            .title("t")
            .source("s")
            .topics(["weather"])
            .entities(entities)
            .build();

        let bag = article.seed_entities();
        assert!(bag.topics.contains("climate"));
        assert!(!bag.topics.contains("weather"));
    }

    #[test]
    fn summary_falls_back_to_title() {
        let mut article = sample_article();
        assert_eq!(article.summary_or_title(), "Storm hits coast");

        article.summary = Some("   ".into());
        assert_eq!(article.summary_or_title(), "Storm hits coast");

        article.summary = Some("Landfall overnight".into());
        assert_eq!(article.summary_or_title(), "Landfall overnight");
    }

    #[test]
    fn seeded_cluster_is_consistent() {
        let article = sample_article();
        let cluster = Cluster::seed(&article, Utc::now());

        assert_eq!(cluster.article_ids, vec![article.id]);
        assert_eq!(cluster.source_counts["wire"], 1);
        assert_eq!(cluster.quality, ClusterQuality::singleton());
        assert_eq!(cluster.first_seen, article.fetched_at);
        assert!(cluster.is_consistent());
    }

    #[test]
    fn inconsistent_tally_detected() {
        let article = sample_article();
        let mut cluster = Cluster::seed(&article, Utc::now());
        cluster.source_counts.insert("other".into(), 1);
        assert!(!cluster.is_consistent());
    }

    #[test]
    fn event_kind_serializes_snake_case() {
        let json = serde_json::to_string(&EventKind::FirstReport).unwrap();
        assert_eq!(json, "\"first_report\"");
        assert_eq!(EventKind::Update.to_string(), "update");
    }

    #[test]
    fn article_deserializes_with_defaults() {
        let json = r#"{
            "id": "6f1c1f2e-8d7a-4c4b-9a53-0c2f1b7a9d10",
            "title": "Headline",
            "source": "wire",
            "fetched_at": "2024-05-01T12:00:00Z"
        }"#;
        let article: Article = serde_json::from_str(json).unwrap();
        assert!(article.cluster_id.is_none());
        assert!(article.signatures.is_none());
        assert!(article.content.is_empty());
    }
}
