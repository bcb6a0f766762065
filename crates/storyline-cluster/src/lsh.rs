//! Locality-sensitive hashing over MinHash signatures.
//!
//! The `num_hashes` slots are cut into `num_bands` contiguous bands of
//! `num_hashes / num_bands` slots. Two items become candidates of one another
//! when they agree on every slot of at least one band, so the chance of
//! retrieval is about `1 - (1 - s^r)^b` for true similarity `s`, `r` rows per
//! band and `b` bands.
//!
//! Candidates are not guaranteed to be similar. Callers re-verify with
//! [`MinHash::similarity`] before acting on them.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use crate::error::LshError;
use crate::minhash::MinHash;

/// Default number of LSH bands.
pub const DEFAULT_NUM_BANDS: usize = 16;

/// A banded LSH index keyed by item identifier.
#[derive(Debug, Clone)]
pub struct LshIndex<Id> {
    num_hashes: usize,
    rows_per_band: usize,
    /// One bucket map per band, keyed by the band's exact slot values.
    bands: Vec<HashMap<Box<[u64]>, HashSet<Id>>>,
    members: HashSet<Id>,
}

impl<Id> LshIndex<Id>
where
    Id: Copy + Eq + Hash + Ord,
{
    /// Creates an empty index.
    ///
    /// Fails if `num_bands` is zero or does not divide `num_hashes`.
    pub fn new(num_hashes: usize, num_bands: usize) -> Result<Self, LshError> {
        if num_bands == 0 {
            return Err(LshError::ZeroBands);
        }
        if num_hashes == 0 || num_hashes % num_bands != 0 {
            return Err(LshError::UnevenBands {
                num_hashes,
                num_bands,
            });
        }
        Ok(Self {
            num_hashes,
            rows_per_band: num_hashes / num_bands,
            bands: (0..num_bands).map(|_| HashMap::new()).collect(),
            members: HashSet::new(),
        })
    }

    /// Records `id` under each of its band buckets.
    pub fn add(&mut self, id: Id, minhash: &MinHash) -> Result<(), LshError> {
        self.check_len(minhash)?;
        for (band, key) in self.bands.iter_mut().zip(minhash.slots().chunks(self.rows_per_band)) {
            band.entry(Box::from(key)).or_default().insert(id);
        }
        self.members.insert(id);
        Ok(())
    }

    /// Removes `id` from the buckets of `minhash`, pruning emptied buckets.
    ///
    /// `minhash` must be the signature `id` was added with.
    pub fn remove(&mut self, id: Id, minhash: &MinHash) -> Result<(), LshError> {
        self.check_len(minhash)?;
        for (band, key) in self.bands.iter_mut().zip(minhash.slots().chunks(self.rows_per_band)) {
            if let Some(bucket) = band.get_mut(key) {
                bucket.remove(&id);
                if bucket.is_empty() {
                    band.remove(key);
                }
            }
        }
        self.members.remove(&id);
        Ok(())
    }

    /// Returns every item sharing at least one band with `minhash`.
    ///
    /// Items matching more bands come first; ties are ordered by id.
    pub fn candidates(&self, minhash: &MinHash) -> Result<Vec<Id>, LshError> {
        self.check_len(minhash)?;

        let mut hits: HashMap<Id, usize> = HashMap::new();
        for (band, key) in self.bands.iter().zip(minhash.slots().chunks(self.rows_per_band)) {
            if let Some(bucket) = band.get(key) {
                for id in bucket {
                    *hits.entry(*id).or_insert(0) += 1;
                }
            }
        }

        let mut ranked: Vec<(Id, usize)> = hits.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(ranked.into_iter().map(|(id, _)| id).collect())
    }

    /// Checks whether `id` has been added.
    pub fn contains(&self, id: &Id) -> bool {
        self.members.contains(id)
    }

    /// Number of indexed items.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Number of non-empty buckets across all bands.
    pub fn bucket_count(&self) -> usize {
        self.bands.iter().map(HashMap::len).sum()
    }

    /// Drops every item.
    pub fn clear(&mut self) {
        for band in &mut self.bands {
            band.clear();
        }
        self.members.clear();
    }

    /// Number of bands.
    pub fn num_bands(&self) -> usize {
        self.bands.len()
    }

    /// Slots per band.
    pub fn rows_per_band(&self) -> usize {
        self.rows_per_band
    }

    fn check_len(&self, minhash: &MinHash) -> Result<(), LshError> {
        if minhash.num_hashes() != self.num_hashes {
            return Err(LshError::SignatureLength {
                expected: self.num_hashes,
                found: minhash.num_hashes(),
            });
        }
        Ok(())
    }
}
