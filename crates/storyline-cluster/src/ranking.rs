//! Newsletter ranking of clusters.
//!
//! A cluster's score is a weighted average of four components, each in
//! `[0, 1]`:
//!
//! - recency: `exp(-age / recency_decay_hours)` with age measured from
//!   `last_updated`
//! - size: `sqrt(min(size / size_saturation, 1))`
//! - diversity: `min(distinct_sources / source_saturation, 1)`
//! - coherence: `quality.coherence`, or `default_coherence` when unset
//!
//! Clusters older than `max_age_hours` or smaller than `min_cluster_size`
//! score zero and are never selected.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::Serialize;
use storyline_core::Cluster;

use crate::config::RankingConfig;

const TITLE_MAX_CHARS: usize = 100;
const SUMMARY_MAX_CHARS: usize = 300;
const ELLIPSIS: &str = "...";

const TOP_SOURCES: usize = 3;

/// A cluster selected for a digest together with its score.
#[derive(Debug, Clone, Serialize)]
pub struct RankedCluster {
    pub score: f64,
    pub cluster: Cluster,
}

/// Scores and orders clusters for digests.
#[derive(Debug, Clone, Default)]
pub struct ClusterRanker {
    config: RankingConfig,
}

impl ClusterRanker {
    pub fn new(config: RankingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    /// Scores `cluster` as of `now`. Returns 0.0 for excluded clusters.
    pub fn score(&self, cluster: &Cluster, now: DateTime<Utc>) -> f64 {
        let c = &self.config;

        let age_hours = hours_between(cluster.last_updated, now);
        if age_hours > c.max_age_hours {
            return 0.0;
        }
        if cluster.quality.size < c.min_cluster_size {
            return 0.0;
        }

        // Clock skew can put last_updated slightly in the future.
        let recency = (-age_hours.max(0.0) / c.recency_decay_hours).exp();
        let size = (f64::from(cluster.quality.size) / c.size_saturation)
            .min(1.0)
            .sqrt();
        let diversity = (cluster.distinct_sources() as f64 / c.source_saturation).min(1.0);
        let coherence = match cluster.quality.coherence {
            value if value.is_finite() && value > 0.0 && value <= 1.0 => value,
            _ => c.default_coherence,
        };

        recency * c.recency_weight
            + size * c.size_weight
            + diversity * c.diversity_weight
            + coherence * c.coherence_weight
    }

    /// Scores every cluster, drops zero scores and returns the best `limit`
    /// in non-increasing score order. Equal scores are ordered by id.
    pub fn rank(
        &self,
        clusters: impl IntoIterator<Item = Cluster>,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Vec<RankedCluster> {
        let mut ranked: Vec<RankedCluster> = clusters
            .into_iter()
            .map(|cluster| RankedCluster {
                score: self.score(&cluster, now),
                cluster,
            })
            .filter(|r| r.score > 0.0)
            .collect();

        ranked.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.cluster.id.cmp(&b.cluster.id))
        });
        ranked.truncate(limit);
        ranked
    }
}

// ============================================================================
// Digest helpers
// ============================================================================

/// Summary statistics of a cluster for digest rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterStats {
    pub total_articles: usize,
    pub distinct_sources: usize,
    /// Up to three sources with the most articles.
    pub top_sources: Vec<String>,
    /// `Breaking`, `Today`, `Yesterday` or `N days`.
    pub time_span: String,
}

/// Computes digest statistics for `cluster`.
///
/// The time span covers `first_seen` to `last_updated`.
pub fn cluster_stats(cluster: &Cluster) -> ClusterStats {
    let mut sources: Vec<(&String, &u32)> = cluster
        .source_counts
        .iter()
        .filter(|(_, count)| **count > 0)
        .collect();
    sources.sort_by(|a, b| match b.1.cmp(a.1) {
        Ordering::Equal => a.0.cmp(b.0),
        other => other,
    });

    let total_articles = match cluster.quality.size {
        0 => cluster.article_ids.len(),
        size => size as usize,
    };

    ClusterStats {
        total_articles,
        distinct_sources: sources.len(),
        top_sources: sources
            .iter()
            .take(TOP_SOURCES)
            .map(|(source, _)| (*source).clone())
            .collect(),
        time_span: time_span_label(hours_between(cluster.first_seen, cluster.last_updated)),
    }
}

fn time_span_label(hours: f64) -> String {
    if hours < 2.0 {
        "Breaking".to_string()
    } else if hours < 24.0 {
        "Today".to_string()
    } else if hours < 48.0 {
        "Yesterday".to_string()
    } else {
        format!("{} days", (hours / 24.0).floor() as u64)
    }
}

/// Canonical title, truncated to 100 characters.
pub fn format_title(cluster: &Cluster) -> String {
    truncate_chars(&cluster.canonical_title, TITLE_MAX_CHARS)
}

/// Summary, truncated to 300 characters.
pub fn format_summary(cluster: &Cluster) -> String {
    truncate_chars(&cluster.summary, SUMMARY_MAX_CHARS)
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars - ELLIPSIS.len();
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 3_600_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use storyline_core::{Article, ClusterQuality};

    fn cluster(size: u32, sources: &[&str], age: Duration, now: DateTime<Utc>) -> Cluster {
        let seed = Article::builder()
            .title("Port strike enters second week")
            .source(sources[0])
            .fetched_at(now - age)
            .build();
        let mut cluster = Cluster::seed(&seed, now - age);
        cluster.source_counts.clear();
        cluster.article_ids.clear();
        for i in 0..size as usize {
            let source = sources[i % sources.len()];
            *cluster.source_counts.entry(source.to_string()).or_insert(0) += 1;
            cluster.article_ids.push(storyline_core::ArticleId::new());
        }
        cluster.quality = ClusterQuality {
            coherence: 0.9,
            size,
        };
        cluster
    }

    #[test]
    fn too_old_or_too_small_scores_zero() {
        let ranker = ClusterRanker::default();
        let now = Utc::now();

        assert_eq!(ranker.score(&cluster(5, &["a"], Duration::hours(73), now), now), 0.0);
        assert_eq!(ranker.score(&cluster(1, &["a"], Duration::hours(1), now), now), 0.0);
        assert!(ranker.score(&cluster(2, &["a"], Duration::hours(71), now), now) > 0.0);
    }

    #[test]
    fn fresh_saturated_cluster_scores_near_one() {
        let ranker = ClusterRanker::default();
        let now = Utc::now();
        let c = cluster(10, &["a", "b", "c", "d", "e"], Duration::zero(), now);

        // 0.4 + 0.3 + 0.2 + 0.1 * 0.9
        assert!((ranker.score(&c, now) - 0.99).abs() < 1e-9);
    }

    #[test]
    fn components_follow_formula() {
        let ranker = ClusterRanker::default();
        let now = Utc::now();
        let c = cluster(4, &["a", "b"], Duration::hours(24), now);

        let expected = (-1.0f64).exp() * 0.4 + (0.4f64).sqrt() * 0.3 + 0.4 * 0.2 + 0.9 * 0.1;
        assert!((ranker.score(&c, now) - expected).abs() < 1e-9);
    }

    #[test]
    fn unset_coherence_uses_default() {
        let ranker = ClusterRanker::default();
        let now = Utc::now();
        let mut with_default = cluster(3, &["a"], Duration::hours(2), now);
        with_default.quality.coherence = 0.5;
        let mut unset = with_default.clone();
        unset.quality.coherence = 0.0;

        assert_eq!(ranker.score(&unset, now), ranker.score(&with_default, now));
        unset.quality.coherence = f64::NAN;
        assert_eq!(ranker.score(&unset, now), ranker.score(&with_default, now));
    }

    #[test]
    fn rank_orders_and_truncates() {
        let ranker = ClusterRanker::default();
        let now = Utc::now();
        let clusters = vec![
            cluster(2, &["a"], Duration::hours(30), now),
            cluster(8, &["a", "b", "c"], Duration::hours(1), now),
            cluster(1, &["a"], Duration::hours(1), now),
            cluster(4, &["a", "b"], Duration::hours(5), now),
        ];

        let ranked = ranker.rank(clusters, now, 2);
        assert_eq!(ranked.len(), 2);
        assert!(ranked[0].score >= ranked[1].score);
        assert_eq!(ranked[0].cluster.quality.size, 8);
        assert_eq!(ranked[1].cluster.quality.size, 4);

        let all = ranker.rank(Vec::new(), now, 10);
        assert!(all.is_empty());
    }

    #[test]
    fn stats_report_top_sources_and_span() {
        let now = Utc::now();
        let mut c = cluster(6, &["wire", "wire", "daily", "herald", "wire", "post"], Duration::zero(), now);
        c.first_seen = now - Duration::hours(30);
        c.last_updated = now;

        let stats = cluster_stats(&c);
        assert_eq!(stats.total_articles, 6);
        assert_eq!(stats.distinct_sources, 4);
        assert_eq!(stats.top_sources, vec!["wire", "daily", "herald"]);
        assert_eq!(stats.time_span, "Yesterday");
    }

    #[test]
    fn time_span_labels() {
        assert_eq!(time_span_label(0.5), "Breaking");
        assert_eq!(time_span_label(5.0), "Today");
        assert_eq!(time_span_label(47.9), "Yesterday");
        assert_eq!(time_span_label(80.0), "3 days");
    }

    #[test]
    fn long_text_is_truncated() {
        let now = Utc::now();
        let mut c = cluster(2, &["a"], Duration::zero(), now);
        c.canonical_title = "é".repeat(120);
        c.summary = "short".into();

        let title = format_title(&c);
        assert_eq!(title.chars().count(), 100);
        assert!(title.ends_with("..."));
        assert_eq!(format_summary(&c), "short");

        c.canonical_title = "x".repeat(100);
        assert_eq!(format_title(&c), "x".repeat(100));
    }
}
