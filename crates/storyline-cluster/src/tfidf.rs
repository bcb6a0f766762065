//! TF-IDF (Term Frequency-Inverse Document Frequency) vectors.
//!
//! TF-IDF only adjudicates borderline MinHash scores, so the model is kept
//! deliberately small:
//! - Tokenization on non-word characters
//! - Raw term counts weighted by `ln(N / max(df, 1))`
//! - Cosine similarity for document comparison
//! - A stable `term:weight` wire format

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SignatureError;

/// Tokens of this many characters or fewer are discarded.
const MAX_DISCARDED_TOKEN_LENGTH: usize = 2;

/// Decimal places kept when serializing weights.
const WEIGHT_PRECISION: usize = 6;

/// Tokenizes text into lowercase word tokens.
///
/// Splits on every character that is neither alphanumeric nor `_`, and
/// drops tokens of two characters or fewer.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|token| token.chars().count() > MAX_DISCARDED_TOKEN_LENGTH)
        .map(str::to_lowercase)
        .collect()
}

/// Counts occurrences of each term in a document.
pub fn term_counts(tokens: &[String]) -> HashMap<&str, usize> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for token in tokens {
        *counts.entry(token.as_str()).or_insert(0) += 1;
    }
    counts
}

/// Statistics about a corpus of documents for IDF computation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorpusStats {
    /// Number of documents in the corpus
    pub document_count: usize,
    /// Number of documents containing each term
    pub document_frequencies: HashMap<String, usize>,
}

impl CorpusStats {
    /// Creates a new empty corpus stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a document's tokens to the corpus statistics.
    ///
    /// Updates document count and document frequencies for each unique term.
    pub fn add_document(&mut self, tokens: &[String]) {
        self.document_count += 1;

        let unique_terms: HashSet<&String> = tokens.iter().collect();
        for term in unique_terms {
            *self.document_frequencies.entry(term.clone()).or_insert(0) += 1;
        }
    }

    /// Forgets every document.
    pub fn clear(&mut self) {
        self.document_count = 0;
        self.document_frequencies.clear();
    }

    /// Computes the inverse document frequency for a term.
    ///
    /// IDF = ln(N / max(df, 1)). Returns 0.0 for an empty corpus.
    pub fn idf(&self, term: &str) -> f64 {
        if self.document_count == 0 {
            return 0.0;
        }
        let df = self.document_frequencies.get(term).copied().unwrap_or(0).max(1);
        (self.document_count as f64 / df as f64).ln()
    }

    /// The IDF `term` would have once a document containing it is added.
    pub fn idf_including(&self, term: &str) -> f64 {
        let df = self.document_frequencies.get(term).copied().unwrap_or(0) + 1;
        ((self.document_count + 1) as f64 / df as f64).ln()
    }
}

/// A TF-IDF weighted document vector, ordered by term.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TfIdfVector {
    /// Map from term to TF-IDF weight
    pub weights: BTreeMap<String, f64>,
}

impl TfIdfVector {
    /// Creates a TF-IDF vector from document tokens and corpus statistics.
    ///
    /// Terms whose weight is not positive are dropped.
    pub fn from_tokens(tokens: &[String], corpus: &CorpusStats) -> Self {
        let weights = term_counts(tokens)
            .into_iter()
            .map(|(term, count)| (term.to_string(), count as f64 * corpus.idf(term)))
            .filter(|(_, weight)| *weight > 0.0)
            .collect();

        Self { weights }
    }

    /// Like [`TfIdfVector::from_tokens`], weighting as if the document were
    /// already part of `corpus`.
    pub fn from_unobserved_tokens(tokens: &[String], corpus: &CorpusStats) -> Self {
        let weights = term_counts(tokens)
            .into_iter()
            .map(|(term, count)| (term.to_string(), count as f64 * corpus.idf_including(term)))
            .filter(|(_, weight)| *weight > 0.0)
            .collect();

        Self { weights }
    }

    /// Computes the L2 norm (magnitude) of the vector.
    pub fn magnitude(&self) -> f64 {
        self.weights.values().map(|w| w * w).sum::<f64>().sqrt()
    }

    /// Computes the dot product with another TF-IDF vector.
    pub fn dot(&self, other: &TfIdfVector) -> f64 {
        self.weights
            .iter()
            .filter_map(|(term, weight)| {
                other
                    .weights
                    .get(term)
                    .map(|other_weight| weight * other_weight)
            })
            .sum()
    }

    /// Computes cosine similarity with another TF-IDF vector.
    ///
    /// Returns exactly 0.0 if either vector has zero magnitude, including
    /// when both are empty.
    pub fn cosine_similarity(&self, other: &TfIdfVector) -> f64 {
        let mag_self = self.magnitude();
        let mag_other = other.magnitude();

        if mag_self == 0.0 || mag_other == 0.0 {
            return 0.0;
        }

        self.dot(other) / (mag_self * mag_other)
    }

    /// Checks if the vector is empty (no terms with positive weight).
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Serializes as comma-joined `term:weight` pairs sorted by term.
    pub fn signature(&self) -> String {
        self.to_string()
    }

    /// Parses a serialized vector. The empty string is the zero vector.
    pub fn from_signature(signature: &str) -> Result<Self, SignatureError> {
        let mut weights = BTreeMap::new();
        if signature.is_empty() {
            return Ok(Self { weights });
        }

        for pair in signature.split(',') {
            let (term, weight) = pair
                .rsplit_once(':')
                .ok_or_else(|| SignatureError::InvalidTerm(pair.to_string()))?;
            let weight: f64 = weight
                .parse()
                .map_err(|_| SignatureError::InvalidTerm(pair.to_string()))?;
            if term.is_empty() || !weight.is_finite() {
                return Err(SignatureError::InvalidTerm(pair.to_string()));
            }
            weights.insert(term.to_string(), weight);
        }
        Ok(Self { weights })
    }
}

impl fmt::Display for TfIdfVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (term, weight)) in self.weights.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{term}:{weight:.prec$}", prec = WEIGHT_PRECISION)?;
        }
        Ok(())
    }
}
