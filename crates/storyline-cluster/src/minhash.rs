//! MinHash signatures over character n-grams.
//!
//! Each slot simulates one random permutation of the n-gram universe by
//! hashing every item with the slot index as seed and keeping the minimum.
//! The fraction of slots on which two signatures agree estimates the Jaccard
//! similarity of their n-gram sets.
//!
//! The hash family (XXH3-64 seeded with the slot index) and the serialized
//! form (comma-joined decimal slot values) are persisted with every article.
//! Changing either invalidates all stored signatures.

use std::fmt;
use std::str::FromStr;

use xxhash_rust::xxh3::xxh3_64_with_seed;

use crate::error::SignatureError;
use crate::normalize::generate_ngrams;

/// Default number of MinHash slots.
pub const DEFAULT_NUM_HASHES: usize = 128;

/// A MinHash signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MinHash {
    slots: Vec<u64>,
}

impl MinHash {
    /// Creates a signature with `num_hashes` slots, each at `u64::MAX`.
    pub fn new(num_hashes: usize) -> Self {
        Self {
            slots: vec![u64::MAX; num_hashes],
        }
    }

    /// Builds a signature from already normalized text.
    pub fn from_text(text: &str, ngram_size: usize, num_hashes: usize) -> Self {
        let mut minhash = Self::new(num_hashes);
        minhash.update(generate_ngrams(text, ngram_size));
        minhash
    }

    /// Folds items into the signature, keeping the minimum hash per slot.
    pub fn update<I, S>(&mut self, items: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for item in items {
            let bytes = item.as_ref().as_bytes();
            for (seed, slot) in self.slots.iter_mut().enumerate() {
                let hash = xxh3_64_with_seed(bytes, seed as u64);
                if hash < *slot {
                    *slot = hash;
                }
            }
        }
    }

    /// Estimated Jaccard similarity: the fraction of agreeing slots.
    ///
    /// Signatures of different lengths are incomparable and score 0.
    pub fn similarity(&self, other: &MinHash) -> f64 {
        if self.slots.len() != other.slots.len() || self.slots.is_empty() {
            return 0.0;
        }
        let matching = self
            .slots
            .iter()
            .zip(&other.slots)
            .filter(|(a, b)| a == b)
            .count();
        matching as f64 / self.slots.len() as f64
    }

    /// Number of slots.
    pub fn num_hashes(&self) -> usize {
        self.slots.len()
    }

    /// Slot values in order.
    pub fn slots(&self) -> &[u64] {
        &self.slots
    }

    /// True if no item was ever folded in.
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|slot| *slot == u64::MAX)
    }

    /// Serializes the signature as comma-joined slot values.
    pub fn signature(&self) -> String {
        self.to_string()
    }

    /// Parses a serialized signature.
    pub fn from_signature(signature: &str) -> Result<Self, SignatureError> {
        if signature.is_empty() {
            return Ok(Self { slots: Vec::new() });
        }
        let slots = signature
            .split(',')
            .enumerate()
            .map(|(index, value)| {
                value.parse::<u64>().map_err(|_| SignatureError::InvalidSlot {
                    index,
                    value: value.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { slots })
    }

    /// Parses a serialized signature and checks its slot count.
    pub fn from_signature_checked(
        signature: &str,
        num_hashes: usize,
    ) -> Result<Self, SignatureError> {
        let minhash = Self::from_signature(signature)?;
        if minhash.num_hashes() != num_hashes {
            return Err(SignatureError::SlotCount {
                expected: num_hashes,
                found: minhash.num_hashes(),
            });
        }
        Ok(minhash)
    }
}

impl fmt::Display for MinHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, slot) in self.slots.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{slot}")?;
        }
        Ok(())
    }
}

impl FromStr for MinHash {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_signature(s)
    }
}
