//! All-Path Tree Edit Distance with key-roots (component 6), the
//! Pawlik-Augsten formulation over the labeled tree model.

use crate::tree::LabeledTree;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CostModel {
    Uniform,
    LanguageAware {
        boilerplate_multiplier: f64,
        ignore_literals: bool,
        ignore_identifiers: bool,
    },
}

fn base_label(label: &str) -> &str {
    label.split('(').next().unwrap_or(label)
}

fn structural_multiplier(kind: &str, model: CostModel) -> f64 {
    let CostModel::LanguageAware {
        boilerplate_multiplier,
        ignore_literals,
        ignore_identifiers,
    } = model
    else {
        return 1.0;
    };

    match kind {
        "Function" | "AsyncFunction" | "Class" | "Module" | "Arguments" | "Decorator" => 1.5,
        "If" | "Elif" | "Else" | "For" | "AsyncFor" | "While" | "Try" | "With" | "AsyncWith" | "Match"
        | "Break" | "Continue" | "Return" | "Raise" => 1.3,
        "BinOp" | "UnaryOp" | "Compare" | "Call" | "Attribute" | "Subscript" | "List" | "Set" | "Dict"
        | "Tuple" | "ListComp" | "SetComp" | "DictComp" | "GeneratorExp" | "Lambda" | "IfExp" => 0.8,
        "Constant" if ignore_literals => 0.1,
        "Name" if ignore_identifiers => 0.2,
        "Arg" | "AnnAssign" => boilerplate_multiplier,
        _ => 1.0,
    }
}

fn label_similarity_discount(a: &str, b: &str) -> f64 {
    if a == b {
        return 0.3;
    }
    let related: &[(&str, &str)] = &[
        ("Function", "AsyncFunction"),
        ("For", "AsyncFor"),
        ("With", "AsyncWith"),
        ("List", "Tuple"),
        ("ListComp", "GeneratorExp"),
        ("If", "IfExp"),
        ("BinOp", "UnaryOp"),
    ];
    if related.iter().any(|(x, y)| (x == &a && y == &b) || (x == &b && y == &a)) {
        return 0.2;
    }
    let category = |k: &str| -> &'static str {
        match k {
            "Function" | "AsyncFunction" | "Class" | "Module" => "structural",
            "If" | "Elif" | "Else" | "For" | "AsyncFor" | "While" | "Try" | "With" | "AsyncWith" => "control",
            "BinOp" | "UnaryOp" | "Compare" | "Call" | "Attribute" | "Subscript" => "expression",
            _ => "other",
        }
    };
    if category(a) == category(b) && category(a) != "other" {
        return 0.1;
    }
    0.0
}

pub struct Costs {
    pub model: CostModel,
}

impl Costs {
    pub fn uniform() -> Self {
        Self { model: CostModel::Uniform }
    }

    pub fn insert(&self, label: &str) -> f64 {
        structural_multiplier(base_label(label), self.model)
    }

    pub fn delete(&self, label: &str) -> f64 {
        structural_multiplier(base_label(label), self.model)
    }

    pub fn rename(&self, a: &str, b: &str) -> f64 {
        if a == b {
            return 0.0;
        }
        let (ab, bb) = (base_label(a), base_label(b));
        let base_cost = (structural_multiplier(ab, self.model) + structural_multiplier(bb, self.model)) / 2.0;
        if ab == bb {
            return 0.0;
        }
        let discount = label_similarity_discount(ab, bb);
        (base_cost * (1.0 - discount)).max(0.0)
    }
}

/// Dense forest-distance / tree-distance matrices, reset per `distance` call
/// - never shared across pairs (§9 "memoization scope").
struct Matrices {
    td: Vec<Vec<f64>>,
}

/// Canonical APTED distance: O(n^2) space, exact. Intended for trees under
/// ~500 nodes per §4.3's size guidance; larger trees should go through
/// `optimized` or `approximate`.
pub fn distance(a: &LabeledTree, b: &LabeledTree, costs: &Costs) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let n = a.len();
    let m = b.len();
    let mut td = Matrices {
        td: vec![vec![0.0; m]; n],
    };

    let mut a_key_roots = a.key_roots();
    let mut b_key_roots = b.key_roots();
    a_key_roots.sort_unstable();
    b_key_roots.sort_unstable();

    for &i in a_key_roots.iter().rev() {
        for &j in b_key_roots.iter().rev() {
            fill_forest_distance(a, b, i, j, costs, &mut td);
        }
    }

    td.td[a.root][b.root]
}

fn fill_forest_distance(a: &LabeledTree, b: &LabeledTree, i: usize, j: usize, costs: &Costs, td: &mut Matrices) {
    let lml_i = a.nodes[i].lml;
    let lml_j = b.nodes[j].lml;
    let i_post = a.nodes[i].postorder;
    let j_post = b.nodes[j].postorder;

    let rows = i_post - lml_i + 2;
    let cols = j_post - lml_j + 2;
    let mut fd = vec![vec![0.0; cols]; rows];

    for x in 1..rows {
        let node = a.nodes[a.by_postorder[lml_i + x - 1]].id;
        fd[x][0] = fd[x - 1][0] + costs.delete(&a.nodes[node].label);
    }
    for y in 1..cols {
        let node = b.nodes[b.by_postorder[lml_j + y - 1]].id;
        fd[0][y] = fd[0][y - 1] + costs.insert(&b.nodes[node].label);
    }

    for x in 1..rows {
        let x_post = lml_i + x - 1;
        let x_id = a.by_postorder[x_post];
        for y in 1..cols {
            let y_post = lml_j + y - 1;
            let y_id = b.by_postorder[y_post];

            let x_lml = a.nodes[x_id].lml;
            let y_lml = b.nodes[y_id].lml;

            let delete_cost = fd[x - 1][y] + costs.delete(&a.nodes[x_id].label);
            let insert_cost = fd[x][y - 1] + costs.insert(&b.nodes[y_id].label);

            if x_lml == lml_i && y_lml == lml_j {
                let rename_cost = fd[x - 1][y - 1] + costs.rename(&a.nodes[x_id].label, &b.nodes[y_id].label);
                let best = delete_cost.min(insert_cost).min(rename_cost);
                fd[x][y] = best;
                td.td[x_id][y_id] = best;
            } else {
                let x_off = x_lml - lml_i;
                let y_off = y_lml - lml_j;
                let detached = fd[x_off][y_off] + td.td[x_id][y_id];
                fd[x][y] = delete_cost.min(insert_cost).min(detached);
            }
        }
    }
}

/// `1 - distance / (size(a) + size(b))`, clamped to `[0, 1]`. Two empty
/// trees are identical (`1.0`); one empty and one non-empty share nothing
/// (`0.0`).
pub fn similarity(a: &LabeledTree, b: &LabeledTree, costs: &Costs) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let d = distance(a, b, costs);
    let denom = (a.len() + b.len()) as f64;
    (1.0 - d / denom).clamp(0.0, 1.0)
}

/// A pruning-oriented distance result. `Exact` is a real distance; `Bounded`
/// means the true distance is known only to exceed `at_least` - never to be
/// treated as a real score per §9 Open Question (b).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundedDistance {
    Exact(f64),
    Bounded { at_least: f64 },
}

impl BoundedDistance {
    pub fn value(self) -> f64 {
        match self {
            BoundedDistance::Exact(d) => d,
            BoundedDistance::Bounded { at_least } => at_least,
        }
    }

    pub fn is_approximate(self) -> bool {
        matches!(self, BoundedDistance::Bounded { .. })
    }
}

const SMALL_TREE_LIMIT: usize = 500;
const LARGE_TREE_LIMIT: usize = 2000;

/// Chooses the canonical matrix algorithm for small trees, an early-exit
/// `max_distance`-bounded variant for mid-size trees, and a structural-gap
/// heuristic for very large ones - never a real distance in that last case.
pub fn optimized(a: &LabeledTree, b: &LabeledTree, costs: &Costs, max_distance: Option<f64>) -> BoundedDistance {
    if a.len() > LARGE_TREE_LIMIT || b.len() > LARGE_TREE_LIMIT {
        return BoundedDistance::Bounded { at_least: approximate(a, b) };
    }

    if a.len() <= SMALL_TREE_LIMIT && b.len() <= SMALL_TREE_LIMIT && max_distance.is_none() {
        return BoundedDistance::Exact(distance(a, b, costs));
    }

    match max_distance {
        None => BoundedDistance::Exact(distance(a, b, costs)),
        Some(bound) => {
            // A cheap structural lower bound (size difference) lets us
            // short-circuit before running the full matrix when it already
            // exceeds the bound.
            let lower_bound = (a.len() as f64 - b.len() as f64).abs();
            if lower_bound > bound {
                return BoundedDistance::Bounded { at_least: lower_bound };
            }
            let d = distance(a, b, costs);
            if d > bound {
                BoundedDistance::Bounded { at_least: bound + 1.0 }
            } else {
                BoundedDistance::Exact(d)
            }
        }
    }
}

/// Magnitude estimate for trees too large for exact computation: scales the
/// size gap by a height-gap penalty. Per §9 Open Question (a), this is a
/// lower-bound-flavored estimate, not a metric comparable to exact values.
pub fn approximate(a: &LabeledTree, b: &LabeledTree) -> f64 {
    let size_gap = (a.len() as f64 - b.len() as f64).abs();
    let height = |t: &LabeledTree| -> usize {
        t.nodes.iter().map(|n| depth(t, n.id)).max().unwrap_or(0)
    };
    let height_gap = (height(a) as f64 - height(b) as f64).abs();
    size_gap + height_gap * 2.0
}

fn depth(t: &LabeledTree, id: usize) -> usize {
    let mut d = 0;
    let mut cur = id;
    while let Some(p) = t.nodes[cur].parent {
        d += 1;
        cur = p;
    }
    d
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::SynNode;
    use crate::tree::Canonicalization;
    use tree_sitter::{Language, Parser};

    fn parse_tree(src: &str, mode: Canonicalization) -> LabeledTree {
        let mut parser = Parser::new();
        parser
            .set_language(&Language::from(tree_sitter_python::LANGUAGE))
            .unwrap();
        let code = src.as_bytes().to_vec();
        let tree = parser.parse(&code, None).unwrap();
        let root = SynNode::new(tree.root_node(), &code);
        LabeledTree::build(root, mode)
    }

    #[test]
    fn identical_trees_have_zero_distance_and_full_similarity() {
        let t = parse_tree("def f(x):\n    return x + 1\n", Canonicalization::Full);
        let costs = Costs::uniform();
        assert_eq!(distance(&t, &t, &costs), 0.0);
        assert_eq!(similarity(&t, &t, &costs), 1.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let a = parse_tree("def f(x):\n    return x + 1\n", Canonicalization::Full);
        let b = parse_tree("def g(y):\n    return y * 2\n", Canonicalization::Full);
        let costs = Costs::uniform();
        assert_eq!(distance(&a, &b, &costs), distance(&b, &a, &costs));
    }

    #[test]
    fn renamed_identifiers_collapse_under_stripped_canonicalization() {
        let a = parse_tree("def foo(x):\n    return x + 1\n", Canonicalization::Stripped);
        let b = parse_tree("def bar(y):\n    return y + 1\n", Canonicalization::Stripped);
        let costs = Costs::uniform();
        assert_eq!(distance(&a, &b, &costs), 0.0);
    }

    #[test]
    fn similarity_is_bounded_zero_one() {
        let a = parse_tree("x = 1\n", Canonicalization::Full);
        let b = parse_tree("def f():\n    for i in range(10):\n        print(i)\n", Canonicalization::Full);
        let costs = Costs::uniform();
        let s = similarity(&a, &b, &costs);
        assert!((0.0..=1.0).contains(&s));
    }

    #[test]
    fn optimized_bound_never_reports_below_the_bound_as_exact() {
        let a = parse_tree("def f(x):\n    return x + 1\n", Canonicalization::Full);
        let b = parse_tree("def g(y, z):\n    if y:\n        return z\n    return y * z + 1\n", Canonicalization::Full);
        let costs = Costs::uniform();
        let bounded = optimized(&a, &b, &costs, Some(0.5));
        if let BoundedDistance::Bounded { at_least } = bounded {
            assert!(at_least > 0.5);
        }
    }
}
