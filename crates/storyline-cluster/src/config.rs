//! Engine configuration from environment variables.
//!
//! Every threshold the assignment and ranking algorithms use is tunable.
//! Defaults reproduce the production constants.

use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::lsh::DEFAULT_NUM_BANDS;
use crate::minhash::DEFAULT_NUM_HASHES;
use crate::normalize::{DEFAULT_LEAD_MAX_CHARS, DEFAULT_NGRAM_SIZE};

/// Prefix of every environment variable read by this module.
pub const ENV_PREFIX: &str = "STORYLINE_";

/// How to choose between clusters whose best supporting similarity is equal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// The cluster backed by more accepted candidates.
    #[default]
    SupportCount,
    /// The cluster first seen earliest.
    OldestCluster,
    /// The cluster with the most articles.
    LargestCluster,
}

impl FromStr for TieBreak {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "support_count" => Ok(Self::SupportCount),
            "oldest_cluster" => Ok(Self::OldestCluster),
            "largest_cluster" => Ok(Self::LargestCluster),
            other => Err(format!(
                "unknown tie-break {other:?}, expected support_count, oldest_cluster or largest_cluster"
            )),
        }
    }
}

/// Parameters of signature generation and cluster assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// MinHash slots per signature.
    pub num_hashes: usize,
    /// LSH bands; must divide `num_hashes`.
    pub num_bands: usize,
    /// Character n-gram width.
    pub ngram_size: usize,
    /// Maximum lead length taken from article content.
    pub lead_max_chars: usize,
    /// MinHash similarity accepted without further checks.
    pub minhash_threshold: f64,
    /// Lowest MinHash similarity adjudicated by TF-IDF.
    pub ambiguous_floor: f64,
    /// TF-IDF cosine needed to accept an ambiguous candidate.
    pub tfidf_threshold: f64,
    /// Candidates verified per assignment.
    pub max_candidates: usize,
    /// Rolling window of articles kept in the index.
    pub window_days: u32,
    /// Winner selection among equally supported clusters.
    pub tie_break: TieBreak,
    /// Per-article assignment deadline.
    pub assignment_timeout_ms: Option<u64>,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            num_hashes: DEFAULT_NUM_HASHES,
            num_bands: DEFAULT_NUM_BANDS,
            ngram_size: DEFAULT_NGRAM_SIZE,
            lead_max_chars: DEFAULT_LEAD_MAX_CHARS,
            minhash_threshold: 0.8,
            ambiguous_floor: 0.4,
            tfidf_threshold: 0.6,
            max_candidates: 50,
            window_days: 14,
            tie_break: TieBreak::SupportCount,
            assignment_timeout_ms: None,
        }
    }
}

impl ClusteringConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional, each falling back to its default:
    /// - `STORYLINE_NUM_HASHES`, `STORYLINE_NUM_BANDS`, `STORYLINE_NGRAM_SIZE`
    /// - `STORYLINE_LEAD_MAX_CHARS`
    /// - `STORYLINE_MINHASH_THRESHOLD`, `STORYLINE_AMBIGUOUS_FLOOR`,
    ///   `STORYLINE_TFIDF_THRESHOLD`
    /// - `STORYLINE_MAX_CANDIDATES`, `STORYLINE_WINDOW_DAYS`
    /// - `STORYLINE_TIE_BREAK` (`support_count`, `oldest_cluster`, `largest_cluster`)
    /// - `STORYLINE_ASSIGNMENT_TIMEOUT_MS`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            num_hashes: parse_var(&lookup, "NUM_HASHES")?.unwrap_or(defaults.num_hashes),
            num_bands: parse_var(&lookup, "NUM_BANDS")?.unwrap_or(defaults.num_bands),
            ngram_size: parse_var(&lookup, "NGRAM_SIZE")?.unwrap_or(defaults.ngram_size),
            lead_max_chars: parse_var(&lookup, "LEAD_MAX_CHARS")?
                .unwrap_or(defaults.lead_max_chars),
            minhash_threshold: parse_var(&lookup, "MINHASH_THRESHOLD")?
                .unwrap_or(defaults.minhash_threshold),
            ambiguous_floor: parse_var(&lookup, "AMBIGUOUS_FLOOR")?
                .unwrap_or(defaults.ambiguous_floor),
            tfidf_threshold: parse_var(&lookup, "TFIDF_THRESHOLD")?
                .unwrap_or(defaults.tfidf_threshold),
            max_candidates: parse_var(&lookup, "MAX_CANDIDATES")?
                .unwrap_or(defaults.max_candidates),
            window_days: parse_var(&lookup, "WINDOW_DAYS")?.unwrap_or(defaults.window_days),
            tie_break: parse_var(&lookup, "TIE_BREAK")?.unwrap_or(defaults.tie_break),
            assignment_timeout_ms: parse_var(&lookup, "ASSIGNMENT_TIMEOUT_MS")?
                .or(defaults.assignment_timeout_ms),
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects inconsistent values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_bands == 0 {
            return Err(invalid("NUM_BANDS", "must be positive"));
        }
        if self.num_hashes == 0 || self.num_hashes % self.num_bands != 0 {
            return Err(invalid(
                "NUM_HASHES",
                format!("{} is not a positive multiple of {} bands", self.num_hashes, self.num_bands),
            ));
        }
        if self.ngram_size == 0 {
            return Err(invalid("NGRAM_SIZE", "must be positive"));
        }
        for (name, value) in [
            ("MINHASH_THRESHOLD", self.minhash_threshold),
            ("AMBIGUOUS_FLOOR", self.ambiguous_floor),
            ("TFIDF_THRESHOLD", self.tfidf_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(name, format!("{value} is outside [0, 1]")));
            }
        }
        if self.ambiguous_floor > self.minhash_threshold {
            return Err(invalid(
                "AMBIGUOUS_FLOOR",
                format!(
                    "{} exceeds the minhash threshold {}",
                    self.ambiguous_floor, self.minhash_threshold
                ),
            ));
        }
        if self.max_candidates == 0 {
            return Err(invalid("MAX_CANDIDATES", "must be positive"));
        }
        if self.window_days == 0 {
            return Err(invalid("WINDOW_DAYS", "must be positive"));
        }
        if self.assignment_timeout_ms == Some(0) {
            return Err(invalid("ASSIGNMENT_TIMEOUT_MS", "must be positive"));
        }
        Ok(())
    }
}

/// Parameters of newsletter ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub min_cluster_size: u32,
    pub max_age_hours: f64,
    pub recency_weight: f64,
    pub size_weight: f64,
    pub diversity_weight: f64,
    pub coherence_weight: f64,
    /// Age in hours at which recency decays to 1/e.
    pub recency_decay_hours: f64,
    /// Size at which the size component saturates.
    pub size_saturation: f64,
    /// Distinct sources at which the diversity component saturates.
    pub source_saturation: f64,
    /// Coherence assumed for clusters that never recorded one.
    pub default_coherence: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            min_cluster_size: 2,
            max_age_hours: 72.0,
            recency_weight: 0.4,
            size_weight: 0.3,
            diversity_weight: 0.2,
            coherence_weight: 0.1,
            recency_decay_hours: 24.0,
            size_saturation: 10.0,
            source_saturation: 5.0,
            default_coherence: 0.5,
        }
    }
}

impl RankingConfig {
    /// Load configuration from `STORYLINE_RANK_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let d = Self::default();
        let config = Self {
            min_cluster_size: parse_var(&lookup, "RANK_MIN_CLUSTER_SIZE")?
                .unwrap_or(d.min_cluster_size),
            max_age_hours: parse_var(&lookup, "RANK_MAX_AGE_HOURS")?.unwrap_or(d.max_age_hours),
            recency_weight: parse_var(&lookup, "RANK_RECENCY_WEIGHT")?
                .unwrap_or(d.recency_weight),
            size_weight: parse_var(&lookup, "RANK_SIZE_WEIGHT")?.unwrap_or(d.size_weight),
            diversity_weight: parse_var(&lookup, "RANK_DIVERSITY_WEIGHT")?
                .unwrap_or(d.diversity_weight),
            coherence_weight: parse_var(&lookup, "RANK_COHERENCE_WEIGHT")?
                .unwrap_or(d.coherence_weight),
            recency_decay_hours: parse_var(&lookup, "RANK_RECENCY_DECAY_HOURS")?
                .unwrap_or(d.recency_decay_hours),
            size_saturation: parse_var(&lookup, "RANK_SIZE_SATURATION")?
                .unwrap_or(d.size_saturation),
            source_saturation: parse_var(&lookup, "RANK_SOURCE_SATURATION")?
                .unwrap_or(d.source_saturation),
            default_coherence: parse_var(&lookup, "RANK_DEFAULT_COHERENCE")?
                .unwrap_or(d.default_coherence),
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects inconsistent values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let weights = [
            ("RANK_RECENCY_WEIGHT", self.recency_weight),
            ("RANK_SIZE_WEIGHT", self.size_weight),
            ("RANK_DIVERSITY_WEIGHT", self.diversity_weight),
            ("RANK_COHERENCE_WEIGHT", self.coherence_weight),
        ];
        for (name, value) in weights {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(name, format!("{value} is outside [0, 1]")));
            }
        }
        let total: f64 = weights.iter().map(|(_, w)| w).sum();
        if (total - 1.0).abs() > 1e-6 {
            return Err(invalid("RANK_RECENCY_WEIGHT", format!("weights sum to {total}, not 1")));
        }
        for (name, value) in [
            ("RANK_MAX_AGE_HOURS", self.max_age_hours),
            ("RANK_RECENCY_DECAY_HOURS", self.recency_decay_hours),
            ("RANK_SIZE_SATURATION", self.size_saturation),
            ("RANK_SOURCE_SATURATION", self.source_saturation),
        ] {
            if !(value > 0.0 && value.is_finite()) {
                return Err(invalid(name, format!("{value} must be positive")));
            }
        }
        if !(0.0..=1.0).contains(&self.default_coherence) {
            return Err(invalid("RANK_DEFAULT_COHERENCE", "must be within [0, 1]"));
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid environment variable value.
    #[error("invalid value for environment variable {name}: {reason}")]
    InvalidValue { name: String, reason: String },
}

fn invalid(suffix: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        name: format!("{ENV_PREFIX}{suffix}"),
        reason: reason.into(),
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    suffix: &str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let name = format!("{ENV_PREFIX}{suffix}");
    match lookup(&name) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                name,
                reason: e.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_values() {
        let config = ClusteringConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config, ClusteringConfig::default());
        assert_eq!(config.num_hashes, 128);
        assert_eq!(config.num_bands, 16);
        assert_eq!(config.minhash_threshold, 0.8);
        assert_eq!(config.ambiguous_floor, 0.4);
        assert_eq!(config.tfidf_threshold, 0.6);
        assert_eq!(config.max_candidates, 50);
        assert_eq!(config.tie_break, TieBreak::SupportCount);
        assert!(config.assignment_timeout_ms.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = ClusteringConfig::from_lookup(lookup(&[
            ("STORYLINE_MINHASH_THRESHOLD", "0.9"),
            ("STORYLINE_TIE_BREAK", "oldest_cluster"),
            ("STORYLINE_ASSIGNMENT_TIMEOUT_MS", "250"),
            ("STORYLINE_WINDOW_DAYS", " 7 "),
        ]))
        .unwrap();

        assert_eq!(config.minhash_threshold, 0.9);
        assert_eq!(config.tie_break, TieBreak::OldestCluster);
        assert_eq!(config.assignment_timeout_ms, Some(250));
        assert_eq!(config.window_days, 7);
    }

    #[test]
    fn test_unparseable_value() {
        let err = ClusteringConfig::from_lookup(lookup(&[("STORYLINE_NUM_BANDS", "many")]))
            .unwrap_err();
        match err {
            ConfigError::InvalidValue { name, .. } => assert_eq!(name, "STORYLINE_NUM_BANDS"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_uneven_bands_rejected() {
        let config = ClusteringConfig {
            num_bands: 12,
            ..ClusteringConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_floor_above_threshold_rejected() {
        let config = ClusteringConfig {
            ambiguous_floor: 0.9,
            ..ClusteringConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let err = ClusteringConfig::from_lookup(lookup(&[("STORYLINE_TFIDF_THRESHOLD", "1.5")]));
        assert!(err.is_err());
    }

    #[test]
    fn test_ranking_defaults() {
        let config = RankingConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, RankingConfig::default());
        assert_eq!(config.min_cluster_size, 2);
        assert_eq!(config.max_age_hours, 72.0);
    }

    #[test]
    fn test_ranking_weights_must_sum_to_one() {
        let err = RankingConfig::from_lookup(lookup(&[("STORYLINE_RANK_SIZE_WEIGHT", "0.5")]));
        assert!(err.is_err());

        let ok = RankingConfig::from_lookup(lookup(&[
            ("STORYLINE_RANK_SIZE_WEIGHT", "0.5"),
            ("STORYLINE_RANK_RECENCY_WEIGHT", "0.2"),
        ]));
        assert!(ok.is_ok());
    }

    #[test]
    fn test_tie_break_parsing() {
        assert_eq!(
            "LARGEST_CLUSTER".parse::<TieBreak>(),
            Ok(TieBreak::LargestCluster)
        );
        assert!("newest".parse::<TieBreak>().is_err());
    }

    #[test]
    fn test_config_serde_uses_defaults() {
        let config: ClusteringConfig = serde_json::from_str(r#"{"max_candidates": 10}"#).unwrap();
        assert_eq!(config.max_candidates, 10);
        assert_eq!(config.num_hashes, 128);
    }
}
