//! MinHash signatures over a feature multiset (component 8, part 1).

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

fn seeded_hash(seed: u64, bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS ^ seed;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature(pub Vec<u64>);

impl Signature {
    /// Fraction of equal components, an unbiased estimator of the Jaccard
    /// similarity between the two underlying feature sets.
    pub fn estimated_jaccard(&self, other: &Signature) -> f64 {
        if self.0.is_empty() || other.0.is_empty() || self.0.len() != other.0.len() {
            return 0.0;
        }
        let agree = self.0.iter().zip(&other.0).filter(|(a, b)| a == b).count();
        agree as f64 / self.0.len() as f64
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Builds a signature of `length` 64-bit minima, one per independent hash
/// seed (seeds double as the "permutations" in the textbook formulation).
pub fn signature(features: &[String], length: usize) -> Signature {
    let mut mins = vec![u64::MAX; length];
    for feature in features {
        let bytes = feature.as_bytes();
        for (seed, slot) in mins.iter_mut().enumerate() {
            let h = seeded_hash(seed as u64, bytes);
            if h < *slot {
                *slot = h;
            }
        }
    }
    Signature(mins)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_feature_sets_yield_identical_signatures() {
        let features = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let s1 = signature(&features, 32);
        let s2 = signature(&features, 32);
        assert_eq!(s1, s2);
        assert_eq!(s1.estimated_jaccard(&s2), 1.0);
    }

    #[test]
    fn disjoint_feature_sets_rarely_agree_everywhere() {
        let a = signature(&["x".to_string(), "y".to_string()], 64);
        let b = signature(&["p".to_string(), "q".to_string()], 64);
        assert!(a.estimated_jaccard(&b) < 1.0);
    }

    #[test]
    fn empty_features_produce_max_sentinel_signature() {
        let s = signature(&[], 16);
        assert!(s.0.iter().all(|&v| v == u64::MAX));
    }
}
