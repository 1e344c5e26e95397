//! Banded Locality-Sensitive Hashing index over MinHash signatures
//! (component 8, part 2).

use crate::minhash::Signature;
use dashmap::DashMap;
use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone, Copy)]
pub struct LshConfig {
    pub bands: usize,
    pub rows: usize,
}

impl LshConfig {
    pub fn defaults() -> Self {
        Self { bands: 32, rows: 4 }
    }

    pub fn signature_length(self) -> usize {
        self.bands * self.rows
    }

    /// The similarity threshold this (B, R) configuration is tuned around:
    /// `(1/B)^(1/R)`.
    pub fn expected_threshold(self) -> f64 {
        (1.0 / self.bands as f64).powf(1.0 / self.rows as f64)
    }
}

fn band_digest(rows: &[u64]) -> String {
    const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;
    let mut h1 = FNV_OFFSET_BASIS;
    let mut h2 = FNV_OFFSET_BASIS.rotate_left(17);
    for &r in rows {
        for &b in &r.to_le_bytes() {
            h1 ^= b as u64;
            h1 = h1.wrapping_mul(FNV_PRIME);
            h2 ^= b as u64;
            h2 = h2.wrapping_mul(FNV_PRIME).rotate_left(13);
        }
    }
    format!("{h1:016x}{h2:016x}")
}

/// Guarded internally by `DashMap`'s per-shard locking, satisfying the
/// read/write-lock requirement in §4.5/§5 without a single global lock that
/// would serialize `find_candidates` against itself.
pub struct LshIndex<Id: Eq + Hash + Clone> {
    config: LshConfig,
    buckets: DashMap<String, Vec<Id>>,
    signatures: DashMap<Id, Signature>,
}

impl<Id: Eq + Hash + Clone> LshIndex<Id> {
    pub fn new(config: LshConfig) -> Self {
        Self {
            config,
            buckets: DashMap::new(),
            signatures: DashMap::new(),
        }
    }

    fn band_keys(&self, sig: &Signature) -> Vec<String> {
        (0..self.config.bands)
            .filter_map(|b| {
                let start = b * self.config.rows;
                let end = start + self.config.rows;
                sig.0.get(start..end).map(|rows| format!("band_{b}_{}", band_digest(rows)))
            })
            .collect()
    }

    /// Resets the index and inserts every (id, signature) pair in batch.
    pub fn build_index(&self, signatures: HashMap<Id, Signature>) {
        self.buckets.clear();
        self.signatures.clear();
        for (id, sig) in signatures {
            self.add(id, sig);
        }
    }

    pub fn add(&self, id: Id, sig: Signature) {
        for key in self.band_keys(&sig) {
            self.buckets.entry(key).or_default().push(id.clone());
        }
        self.signatures.insert(id, sig);
    }

    pub fn remove(&self, id: &Id) {
        if let Some((_, sig)) = self.signatures.remove(id) {
            for key in self.band_keys(&sig) {
                if let Some(mut bucket) = self.buckets.get_mut(&key) {
                    bucket.retain(|x| x != id);
                }
            }
        }
    }

    /// Union of bucket memberships across every band this signature falls
    /// into.
    pub fn find_candidates(&self, sig: &Signature) -> Vec<Id> {
        let mut seen = Vec::new();
        for key in self.band_keys(sig) {
            if let Some(bucket) = self.buckets.get(&key) {
                for id in bucket.iter() {
                    if !seen.contains(id) {
                        seen.push(id.clone());
                    }
                }
            }
        }
        seen
    }

    /// Stricter retrieval: only ids that co-occur with `sig` in at least
    /// `k` distinct bands.
    pub fn find_candidates_min_bands(&self, sig: &Signature, k: usize) -> Vec<Id> {
        let mut counts: HashMap<Id, usize> = HashMap::new();
        for key in self.band_keys(sig) {
            if let Some(bucket) = self.buckets.get(&key) {
                for id in bucket.iter() {
                    *counts.entry(id.clone()).or_insert(0) += 1;
                }
            }
        }
        counts.into_iter().filter(|(_, n)| *n >= k).map(|(id, _)| id).collect()
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::minhash::signature;

    #[test]
    fn near_duplicate_signatures_share_at_least_one_bucket() {
        let config = LshConfig { bands: 8, rows: 4 };
        let index: LshIndex<String> = LshIndex::new(config);

        let features = vec!["a".into(), "b".into(), "c".into(), "d".into(), "e".into()];
        let sig_a = signature(&features, config.signature_length());
        let sig_b = signature(&features, config.signature_length());

        index.add("frag_a".to_string(), sig_a.clone());
        index.add("frag_b".to_string(), sig_b);

        let candidates = index.find_candidates(&sig_a);
        assert!(candidates.contains(&"frag_a".to_string()));
        assert!(candidates.contains(&"frag_b".to_string()));
    }

    #[test]
    fn remove_drops_membership_from_all_bands() {
        let config = LshConfig { bands: 4, rows: 4 };
        let index: LshIndex<String> = LshIndex::new(config);
        let features = vec!["x".into(), "y".into()];
        let sig = signature(&features, config.signature_length());

        index.add("only".to_string(), sig.clone());
        assert!(!index.find_candidates(&sig).is_empty());

        index.remove(&"only".to_string());
        assert!(index.find_candidates(&sig).is_empty());
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn expected_threshold_matches_closed_form() {
        let config = LshConfig { bands: 32, rows: 4 };
        let t = config.expected_threshold();
        assert!((t - (1.0f64 / 32.0).powf(0.25)).abs() < 1e-9);
    }
}
