//! Centroid/BFS clone grouping (component 10, part 2): grows groups from
//! the candidate-pair graph without needing the full all-pairs matrix.

use crate::classifier::{CloneType, Thresholds};
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone)]
pub struct CloneGroup {
    pub id: usize,
    pub members: Vec<usize>,
    pub average_similarity: f64,
    pub clone_type: CloneType,
}

fn clone_type_for(similarity: f64, thresholds: Thresholds) -> Option<CloneType> {
    if similarity >= thresholds.t1 {
        Some(CloneType::Type1)
    } else if similarity >= thresholds.t2 {
        Some(CloneType::Type2)
    } else if similarity >= thresholds.t3 {
        Some(CloneType::Type3)
    } else if similarity >= thresholds.t4 {
        Some(CloneType::Type4)
    } else {
        None
    }
}

/// `candidate_pairs` are the edges worth testing (typically LSH output);
/// `similarity_fn` is evaluated lazily, only for pairs actually visited
/// during BFS growth. Groups with fewer than 2 members are dropped.
pub fn group<F>(
    fragment_ids: &[usize],
    candidate_pairs: &[(usize, usize)],
    similarity_fn: F,
    threshold: f64,
    thresholds: Thresholds,
) -> Vec<CloneGroup>
where
    F: Fn(usize, usize) -> f64,
{
    let mut adjacency: HashMap<usize, Vec<usize>> = HashMap::new();
    for &(a, b) in candidate_pairs {
        adjacency.entry(a).or_default().push(b);
        adjacency.entry(b).or_default().push(a);
    }

    let mut classified: HashSet<usize> = HashSet::new();
    let mut groups = Vec::new();
    let mut next_id = 0;

    for &seed in fragment_ids {
        if classified.contains(&seed) {
            continue;
        }
        let mut members = vec![seed];
        let mut member_set: HashSet<usize> = HashSet::from([seed]);
        let mut queue: VecDeque<usize> = adjacency.get(&seed).cloned().unwrap_or_default().into();
        let mut visited_candidates: HashSet<usize> = HashSet::from([seed]);

        while let Some(candidate) = queue.pop_front() {
            if visited_candidates.contains(&candidate) {
                continue;
            }
            visited_candidates.insert(candidate);
            if classified.contains(&candidate) || member_set.contains(&candidate) {
                continue;
            }

            let joins = members.iter().any(|&m| similarity_fn(m, candidate) >= threshold);
            if joins {
                members.push(candidate);
                member_set.insert(candidate);
                for &next in adjacency.get(&candidate).cloned().unwrap_or_default().iter() {
                    if !visited_candidates.contains(&next) {
                        queue.push_back(next);
                    }
                }
            }
        }

        if members.len() < 2 {
            continue;
        }

        let mut pair_count = 0usize;
        let mut pair_sum = 0.0;
        for i in 0..members.len() {
            for j in (i + 1)..members.len() {
                pair_sum += similarity_fn(members[i], members[j]);
                pair_count += 1;
            }
        }
        let average_similarity = if pair_count == 0 { 0.0 } else { pair_sum / pair_count as f64 };
        let clone_type = clone_type_for(average_similarity, thresholds).unwrap_or(CloneType::Type4);

        for &m in &members {
            classified.insert(m);
        }
        members.sort_unstable();
        groups.push(CloneGroup { id: next_id, members, average_similarity, clone_type });
        next_id += 1;
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triangle_of_near_identical_fragments_forms_one_group() {
        let ids = vec![1, 2, 3];
        let pairs = vec![(1, 2), (2, 3), (1, 3)];
        let sim = |_a: usize, _b: usize| 0.97;
        let groups = group(&ids, &pairs, sim, 0.9, Thresholds::defaults());
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].members, vec![1, 2, 3]);
        assert_eq!(groups[0].clone_type, CloneType::Type1);
    }

    #[test]
    fn isolated_fragment_forms_no_group() {
        let ids = vec![1, 2, 3];
        let pairs = vec![(1, 2)];
        let sim = |_a: usize, _b: usize| 0.99;
        let groups = group(&ids, &pairs, sim, 0.9, Thresholds::defaults());
        assert_eq!(groups.len(), 1);
        assert!(!groups[0].members.contains(&3));
    }

    #[test]
    fn below_threshold_pairs_never_merge() {
        let ids = vec![1, 2];
        let pairs = vec![(1, 2)];
        let sim = |_a: usize, _b: usize| 0.1;
        let groups = group(&ids, &pairs, sim, 0.9, Thresholds::defaults());
        assert!(groups.is_empty());
    }
}
