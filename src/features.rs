//! Feature extraction (component 7): deterministic string-token sets used
//! as input to MinHash. Every token list returned here is sorted
//! alphabetically before being handed back, per §9's determinism note.

use crate::tree::LabeledTree;
use std::collections::HashMap;

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

fn combine(hashes: &[u64], label: &str) -> u64 {
    let mut buf = label.as_bytes().to_vec();
    for h in hashes {
        buf.extend_from_slice(&h.to_le_bytes());
    }
    fnv1a(&buf)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureOptions {
    pub max_subtree_height: usize,
    pub k_gram_size: usize,
}

impl FeatureOptions {
    pub fn defaults() -> Self {
        Self {
            max_subtree_height: 3,
            k_gram_size: 4,
        }
    }
}

const STRUCTURAL_PATTERNS: &[&str] = &[
    "If", "For", "While", "Try", "With", "Function", "Class", "Return", "Assign", "Call", "Attribute", "Compare",
];

fn size_bin(count: usize) -> &'static str {
    match count {
        0 => "0",
        1 => "1",
        2..=3 => "2-3",
        4..=7 => "4-7",
        8..=15 => "8-15",
        _ => "16+",
    }
}

/// Extract the full deterministic feature-token multiset for one tree.
pub fn extract(tree: &LabeledTree, opts: FeatureOptions) -> Vec<String> {
    if tree.is_empty() {
        return Vec::new();
    }

    let mut heights = vec![0usize; tree.len()];
    let mut hashes = vec![0u64; tree.len()];
    let mut tokens = Vec::new();

    // Children arrays already give bottom-up order via postorder ids.
    for &id in &tree.by_postorder {
        let node = &tree.nodes[id];
        let child_hashes: Vec<u64> = node.children.iter().map(|&c| hashes[c]).collect();
        let height = node.children.iter().map(|&c| heights[c] + 1).max().unwrap_or(0);
        heights[id] = height;
        hashes[id] = combine(&child_hashes, &node.label);

        if height <= opts.max_subtree_height {
            tokens.push(format!("sub:{}:{:016x}", height, hashes[id]));
        }
    }

    let preorder = preorder_labels(tree);
    let k = opts.k_gram_size.max(1);
    if preorder.len() >= k {
        for window in preorder.windows(k) {
            tokens.push(format!("kgram:{}", window.join(":")));
        }
    }

    let mut kind_counts: HashMap<&str, usize> = HashMap::new();
    for node in &tree.nodes {
        let kind = base_kind(&node.label);
        *kind_counts.entry(kind).or_insert(0) += 1;
    }
    for (kind, count) in &kind_counts {
        tokens.push(format!("type:{kind}"));
        tokens.push(format!("typedist:{kind}:{}", size_bin(*count)));
    }

    for pattern in STRUCTURAL_PATTERNS {
        if kind_counts.contains_key(pattern) {
            tokens.push(format!("pattern:{pattern}"));
        }
    }

    tokens.sort();
    tokens.dedup();
    tokens
}

fn base_kind(label: &str) -> &str {
    label.split('(').next().unwrap_or(label)
}

fn preorder_labels(tree: &LabeledTree) -> Vec<String> {
    let mut out = Vec::with_capacity(tree.len());
    let mut stack = vec![tree.root];
    while let Some(id) = stack.pop() {
        out.push(tree.nodes[id].label.clone());
        for &c in tree.nodes[id].children.iter().rev() {
            stack.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::SynNode;
    use crate::tree::Canonicalization;
    use tree_sitter::{Language, Parser};

    fn parse_tree(src: &str) -> LabeledTree {
        let mut parser = Parser::new();
        parser
            .set_language(&Language::from(tree_sitter_python::LANGUAGE))
            .unwrap();
        let code = src.as_bytes().to_vec();
        let tree = parser.parse(&code, None).unwrap();
        let root = SynNode::new(tree.root_node(), &code);
        LabeledTree::build(root, Canonicalization::Full)
    }

    #[test]
    fn extraction_is_deterministic() {
        let t = parse_tree("def f(x):\n    if x:\n        return x\n    return 0\n");
        let a = extract(&t, FeatureOptions::defaults());
        let b = extract(&t, FeatureOptions::defaults());
        assert_eq!(a, b);
    }

    #[test]
    fn output_is_sorted() {
        let t = parse_tree("def f(x):\n    return x + 1\n");
        let tokens = extract(&t, FeatureOptions::defaults());
        let mut sorted = tokens.clone();
        sorted.sort();
        assert_eq!(tokens, sorted);
    }

    #[test]
    fn structural_pattern_tokens_present_for_control_flow() {
        let t = parse_tree("def f(x):\n    if x:\n        return x\n    return 0\n");
        let tokens = extract(&t, FeatureOptions::defaults());
        assert!(tokens.contains(&"pattern:If".to_string()));
        assert!(tokens.contains(&"pattern:Function".to_string()));
        assert!(tokens.contains(&"pattern:Return".to_string()));
    }
}
