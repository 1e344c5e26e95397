//! Similarity analyzers (component 9): Textual, Syntactic, Structural, and
//! Semantic, sharing one capability set (`similarity`, `distance`, `name`)
//! dispatched through a single enum rather than trait objects, matching the
//! closed, compile-time-known set of analyzer kinds.

use crate::apted::{self, CostModel, Costs};
use crate::cfg::Cfg;
use crate::dfa::DfaResult;
use crate::fragment::CodeFragment;
use crate::metrics::{self, CfgFeatures};
use crate::tree::Canonicalization;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalyzerKind {
    Textual,
    Syntactic,
    Structural,
    Semantic,
}

impl AnalyzerKind {
    pub fn name(self) -> &'static str {
        match self {
            AnalyzerKind::Textual => "textual",
            AnalyzerKind::Syntactic => "syntactic",
            AnalyzerKind::Structural => "structural",
            AnalyzerKind::Semantic => "semantic",
        }
    }
}

/// Levenshtein edit distance in O(min(m, n)) space.
fn levenshtein(a: &str, b: &str) -> usize {
    let (a, b) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let mut prev: Vec<usize> = (0..=a.len()).collect();
    let mut curr = vec![0usize; a.len() + 1];

    for j in 1..=b.len() {
        curr[0] = j;
        for i in 1..=a.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[i] = (prev[i] + 1).min(curr[i - 1] + 1).min(prev[i - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[a.len()]
}

/// `1 - lev(a, b) / max(|a|, |b|)`, with an exact-match shortcut to `1.0`
/// and two-empty-strings treated as identical.
pub fn textual_similarity(a: &CodeFragment, b: &CodeFragment) -> f64 {
    let (na, nb) = (a.normalized_text(), b.normalized_text());
    if na == nb {
        return 1.0;
    }
    let max_len = na.chars().count().max(nb.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(na, nb) as f64 / max_len as f64
}

pub fn textual_distance(a: &CodeFragment, b: &CodeFragment) -> f64 {
    1.0 - textual_similarity(a, b)
}

/// APTED over the stripped (identifier/literal-erased) tree, rewarding
/// shared control structure independent of naming.
pub fn syntactic_similarity(a: &CodeFragment, b: &CodeFragment) -> f64 {
    let costs = Costs {
        model: CostModel::LanguageAware {
            boilerplate_multiplier: 0.5,
            ignore_literals: true,
            ignore_identifiers: true,
        },
    };
    apted::similarity(a.tree(Canonicalization::Stripped), b.tree(Canonicalization::Stripped), &costs)
}

pub fn syntactic_distance(a: &CodeFragment, b: &CodeFragment) -> f64 {
    let costs = Costs {
        model: CostModel::LanguageAware {
            boilerplate_multiplier: 0.5,
            ignore_literals: true,
            ignore_identifiers: true,
        },
    };
    apted::distance(a.tree(Canonicalization::Stripped), b.tree(Canonicalization::Stripped), &costs)
}

/// APTED over the full tree, retaining literal and identifier payloads, so
/// only near-verbatim structure (allowing formatting differences) scores
/// highly.
pub fn structural_similarity(a: &CodeFragment, b: &CodeFragment) -> f64 {
    let costs = Costs {
        model: CostModel::LanguageAware {
            boilerplate_multiplier: 1.0,
            ignore_literals: false,
            ignore_identifiers: false,
        },
    };
    apted::similarity(a.tree(Canonicalization::Full), b.tree(Canonicalization::Full), &costs)
}

pub fn structural_distance(a: &CodeFragment, b: &CodeFragment) -> f64 {
    let costs = Costs {
        model: CostModel::LanguageAware {
            boilerplate_multiplier: 1.0,
            ignore_literals: false,
            ignore_identifiers: false,
        },
    };
    apted::distance(a.tree(Canonicalization::Full), b.tree(Canonicalization::Full), &costs)
}

const CFG_WEIGHT_CYCLOMATIC: f64 = 0.25;
const CFG_WEIGHT_EDGE_DIST: f64 = 0.25;
const CFG_WEIGHT_BLOCK_COUNT: f64 = 0.20;
const CFG_WEIGHT_EDGE_COUNT: f64 = 0.15;
const CFG_WEIGHT_BRANCHING: f64 = 0.10;
const CFG_WEIGHT_LOOP_COND: f64 = 0.05;

const CFG_DFA_BLEND_CFG: f64 = 0.6;
const CFG_DFA_BLEND_DFA: f64 = 0.4;

fn ratio_similarity(a: f64, b: f64) -> f64 {
    let lo = a.min(b);
    let hi = a.max(b);
    if hi == 0.0 {
        1.0
    } else {
        lo / hi
    }
}

/// Cosine similarity between two sparse count vectors keyed by the same
/// label space (CFG edge kinds, or DFA def-/use-kinds).
fn cosine_similarity(a: &HashMap<&'static str, usize>, b: &HashMap<&'static str, usize>) -> f64 {
    let mut keys: Vec<&str> = a.keys().chain(b.keys()).copied().collect();
    keys.sort_unstable();
    keys.dedup();
    if keys.is_empty() {
        return 1.0;
    }
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for key in keys {
        let va = *a.get(key).unwrap_or(&0) as f64;
        let vb = *b.get(key).unwrap_or(&0) as f64;
        dot += va * vb;
        norm_a += va * va;
        norm_b += vb * vb;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(0.0, 1.0)
}

fn histogram_similarity(a: &CfgFeatures, b: &CfgFeatures) -> f64 {
    cosine_similarity(&a.edge_histogram, &b.edge_histogram)
}

/// Weighted comparison of two CFG feature summaries, per the fixed weights
/// `{cyclomatic 0.25, edge-type distribution 0.25, block count 0.20,
/// edge count 0.15, branching 0.10, loop/cond structure 0.05}`.
fn cfg_feature_similarity(a: &CfgFeatures, b: &CfgFeatures) -> f64 {
    let cyclomatic = ratio_similarity(a.cyclomatic as f64, b.cyclomatic as f64);
    let edge_dist = histogram_similarity(a, b);
    let block_count = ratio_similarity(a.block_count as f64, b.block_count as f64);
    let edge_count = ratio_similarity(a.edge_count as f64, b.edge_count as f64);
    let branching = ratio_similarity(a.avg_branching, b.avg_branching);
    let loop_cond = ratio_similarity((a.loop_edges + a.cond_edges) as f64, (b.loop_edges + b.cond_edges) as f64);

    cyclomatic * CFG_WEIGHT_CYCLOMATIC
        + edge_dist * CFG_WEIGHT_EDGE_DIST
        + block_count * CFG_WEIGHT_BLOCK_COUNT
        + edge_count * CFG_WEIGHT_EDGE_COUNT
        + branching * CFG_WEIGHT_BRANCHING
        + loop_cond * CFG_WEIGHT_LOOP_COND
}

/// Blends total defs/uses/pairs, average chain length, cross-block ratio,
/// and def-/use-kind histograms (the latter two via cosine similarity)
/// into a single DFA-shape similarity score.
fn dfa_feature_similarity(a: &DfaResult, b: &DfaResult) -> f64 {
    let defs = ratio_similarity(a.total_defs() as f64, b.total_defs() as f64);
    let uses = ratio_similarity(a.total_uses() as f64, b.total_uses() as f64);
    let pairs = ratio_similarity(a.total_pairs() as f64, b.total_pairs() as f64);
    let cross_block = ratio_similarity(a.cross_block_ratio(), b.cross_block_ratio());
    let chain_len = ratio_similarity(a.average_chain_length(), b.average_chain_length());
    let def_kinds = cosine_similarity(&a.def_kind_histogram(), &b.def_kind_histogram());
    let use_kinds = cosine_similarity(&a.use_kind_histogram(), &b.use_kind_histogram());
    (defs + uses + pairs + cross_block + chain_len + def_kinds + use_kinds) / 7.0
}

/// CFG-feature comparison, optionally blended with DFA similarity at
/// `{CFG 0.6, DFA 0.4}` when data-flow chains are available for both sides.
pub fn semantic_similarity(a: &Cfg, b: &Cfg, dfa: Option<(&DfaResult, &DfaResult)>) -> f64 {
    let cfg_sim = cfg_feature_similarity(&metrics::cfg_features(a), &metrics::cfg_features(b));
    match dfa {
        Some((da, db)) => {
            let dfa_sim = dfa_feature_similarity(da, db);
            cfg_sim * CFG_DFA_BLEND_CFG + dfa_sim * CFG_DFA_BLEND_DFA
        }
        None => cfg_sim,
    }
}

pub fn semantic_distance(a: &Cfg, b: &Cfg, dfa: Option<(&DfaResult, &DfaResult)>) -> f64 {
    1.0 - semantic_similarity(a, b, dfa)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::SynNode;
    use crate::cfg::build_all;
    use tree_sitter::{Language, Parser};

    fn parse<'a>(src: &'a str, code: &'a mut Vec<u8>) -> tree_sitter::Tree {
        *code = src.as_bytes().to_vec();
        let mut parser = Parser::new();
        parser
            .set_language(&Language::from(tree_sitter_python::LANGUAGE))
            .unwrap();
        parser.parse(&code, None).unwrap()
    }

    #[test]
    fn identical_source_has_textual_similarity_one() {
        let mut code = Vec::new();
        let tree = parse("def f(x):\n    return x + 1\n", &mut code);
        let root = SynNode::new(tree.root_node(), &code);
        let func = root.body().into_iter().next().unwrap();
        let frag = CodeFragment::new("a.py".into(), "f".into(), func, &code);
        assert_eq!(textual_similarity(&frag, &frag), 1.0);
    }

    #[test]
    fn renamed_variables_score_high_syntactic_similarity() {
        let mut code_a = Vec::new();
        let tree_a = parse("def foo(x):\n    if x:\n        return x\n    return 0\n", &mut code_a);
        let root_a = SynNode::new(tree_a.root_node(), &code_a);
        let func_a = root_a.body().into_iter().next().unwrap();
        let frag_a = CodeFragment::new("a.py".into(), "foo".into(), func_a, &code_a);

        let mut code_b = Vec::new();
        let tree_b = parse("def bar(y):\n    if y:\n        return y\n    return 0\n", &mut code_b);
        let root_b = SynNode::new(tree_b.root_node(), &code_b);
        let func_b = root_b.body().into_iter().next().unwrap();
        let frag_b = CodeFragment::new("b.py".into(), "bar".into(), func_b, &code_b);

        assert!(syntactic_similarity(&frag_a, &frag_b) > 0.9);
    }

    #[test]
    fn semantic_similarity_of_a_function_with_itself_is_one() {
        let mut code = Vec::new();
        let tree = parse("def f(x):\n    if x:\n        return 1\n    return 0\n", &mut code);
        let root = SynNode::new(tree.root_node(), &code);
        let (_m, funcs) = build_all(root);
        let f = funcs.get("f").unwrap();
        assert_eq!(semantic_similarity(f, f, None), 1.0);
    }

    #[test]
    fn unrelated_functions_score_lower_structural_similarity_than_identical() {
        let mut code_a = Vec::new();
        let tree_a = parse("def f(x):\n    return x + 1\n", &mut code_a);
        let root_a = SynNode::new(tree_a.root_node(), &code_a);
        let func_a = root_a.body().into_iter().next().unwrap();
        let frag_a = CodeFragment::new("a.py".into(), "f".into(), func_a, &code_a);

        let mut code_b = Vec::new();
        let tree_b = parse(
            "def g(items):\n    total = 0\n    for i in items:\n        total += i\n    return total\n",
            &mut code_b,
        );
        let root_b = SynNode::new(tree_b.root_node(), &code_b);
        let func_b = root_b.body().into_iter().next().unwrap();
        let frag_b = CodeFragment::new("b.py".into(), "g".into(), func_b, &code_b);

        assert!(structural_similarity(&frag_a, &frag_b) < structural_similarity(&frag_a, &frag_a));
    }

    #[test]
    fn cosine_similarity_of_proportional_histograms_is_one() {
        let a = HashMap::from([("normal", 2usize), ("cond_true", 4)]);
        let b = HashMap::from([("normal", 1usize), ("cond_true", 2)]);
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_similarity_of_disjoint_histograms_is_zero() {
        let a = HashMap::from([("normal", 3usize)]);
        let b = HashMap::from([("cond_true", 3usize)]);
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }
}
