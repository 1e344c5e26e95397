//! Metric analyzers (component 11): contracts-only per spec, all thin
//! consumers of the syntax-tree adapter and the CFG.

use crate::adapter::{NodeKind, SynNode};
use crate::cfg::{Cfg, EdgeKind};
use std::collections::{HashMap, HashSet};

// ---------------------------------------------------------------------
// Cyclomatic complexity
// ---------------------------------------------------------------------

/// `E - N + 2P`, with `P = 1` since a CFG is a single connected component.
pub fn cyclomatic_complexity(cfg: &Cfg) -> i64 {
    cfg.edge_count() as i64 - cfg.block_count() as i64 + 2
}

#[derive(Debug, Clone, Default)]
pub struct CfgFeatures {
    pub block_count: usize,
    pub edge_count: usize,
    pub edge_histogram: HashMap<&'static str, usize>,
    pub cyclomatic: i64,
    pub avg_branching: f64,
    pub loop_edges: usize,
    pub cond_edges: usize,
}

fn edge_label(k: EdgeKind) -> &'static str {
    match k {
        EdgeKind::Normal => "normal",
        EdgeKind::CondTrue => "cond_true",
        EdgeKind::CondFalse => "cond_false",
        EdgeKind::Loop => "loop",
        EdgeKind::LoopBack => "loop_back",
        EdgeKind::Exception => "exception",
        EdgeKind::Return => "return",
        EdgeKind::Break => "break",
        EdgeKind::Continue => "continue",
        EdgeKind::Finally => "finally",
    }
}

/// Structural summary of a CFG, used as the basis of semantic (Type-4)
/// similarity in the similarity analyzers.
pub fn cfg_features(cfg: &Cfg) -> CfgFeatures {
    let mut histogram = HashMap::new();
    let mut loop_edges = 0;
    let mut cond_edges = 0;
    for w in cfg.graph.edge_weights() {
        *histogram.entry(edge_label(*w)).or_insert(0) += 1;
        if matches!(w, EdgeKind::Loop | EdgeKind::LoopBack) {
            loop_edges += 1;
        }
        if matches!(w, EdgeKind::CondTrue | EdgeKind::CondFalse) {
            cond_edges += 1;
        }
    }

    let block_count = cfg.block_count();
    let edge_count = cfg.edge_count();
    let avg_branching = if block_count == 0 {
        0.0
    } else {
        edge_count as f64 / block_count as f64
    };

    CfgFeatures {
        block_count,
        edge_count,
        edge_histogram: histogram,
        cyclomatic: cyclomatic_complexity(cfg),
        avg_branching,
        loop_edges,
        cond_edges,
    }
}

// ---------------------------------------------------------------------
// Nesting depth
// ---------------------------------------------------------------------

const NESTING_KINDS: &[NodeKind] = &[
    NodeKind::If,
    NodeKind::For,
    NodeKind::AsyncFor,
    NodeKind::While,
    NodeKind::Try,
    NodeKind::With,
    NodeKind::AsyncWith,
];

/// Maximum depth of lexical nesting across control-flow kinds and
/// comprehensions within one function body; the function itself is depth 0.
pub fn nesting_depth(func_body: &[SynNode]) -> usize {
    fn walk(node: SynNode, depth: usize, max: &mut usize) {
        let is_nesting = NESTING_KINDS.contains(&node.kind())
            || matches!(
                node.kind(),
                NodeKind::ListComp | NodeKind::SetComp | NodeKind::DictComp | NodeKind::GeneratorExp
            );
        let next_depth = if is_nesting { depth + 1 } else { depth };
        *max = (*max).max(next_depth);

        for child in node.body() {
            walk(child, next_depth, max);
        }
        for child in node.orelse() {
            walk(child, next_depth, max);
        }
        for handler in node.handlers() {
            walk(handler, next_depth, max);
        }
        for child in node.finalbody() {
            walk(child, next_depth, max);
        }
        if !is_nesting {
            for child in node.children() {
                walk(child, depth, max);
            }
        }
    }

    let mut max = 0;
    for stmt in func_body {
        walk(*stmt, 0, &mut max);
    }
    max
}

// ---------------------------------------------------------------------
// LCOM4
// ---------------------------------------------------------------------

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self { parent: (0..n).collect() }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra] = rb;
        }
    }

    fn component_count(&mut self) -> usize {
        let n = self.parent.len();
        let roots: HashSet<usize> = (0..n).map(|i| self.find(i)).collect();
        roots.len()
    }
}

/// Collects `self.<attr>` accesses and `self.<method>(...)` intra-class
/// calls for one method body, used to decide which other methods it shares
/// state or calls with.
fn method_touches(method_body: &[SynNode]) -> (HashSet<String>, HashSet<String>) {
    let mut attrs = HashSet::new();
    let mut calls = HashSet::new();

    fn walk(node: SynNode, attrs: &mut HashSet<String>, calls: &mut HashSet<String>) {
        if node.kind() == NodeKind::Attribute {
            if let Some(base) = node.inner.child_by_field_name("object") {
                if base.utf8_text(node.code) == Ok("self") {
                    if let Some(attr) = node.inner.child_by_field_name("attribute") {
                        if let Ok(name) = attr.utf8_text(node.code) {
                            // A call target (`self.foo(...)`) is tracked as
                            // a call, not a plain attribute access.
                            let is_call_target = node
                                .inner
                                .parent()
                                .map(|p| p.kind() == "call" && p.child_by_field_name("function") == Some(node.inner))
                                .unwrap_or(false);
                            if is_call_target {
                                calls.insert(name.to_string());
                            } else {
                                attrs.insert(name.to_string());
                            }
                        }
                    }
                }
            }
        }
        for child in node.children() {
            walk(child, attrs, calls);
        }
    }

    for stmt in method_body {
        walk(*stmt, &mut attrs, &mut calls);
    }
    (attrs, calls)
}

/// `class_methods`: ordered `(name, body)` pairs for instance methods only
/// (static/class methods already excluded by the caller). Deterministic:
/// methods are processed in the order given, which callers sort beforehand.
pub fn lcom4(class_methods: &[(String, Vec<SynNode>)]) -> usize {
    if class_methods.is_empty() {
        return 0;
    }
    let n = class_methods.len();
    let touches: Vec<(HashSet<String>, HashSet<String>)> =
        class_methods.iter().map(|(_, body)| method_touches(body)).collect();
    let name_index: HashMap<&str, usize> =
        class_methods.iter().enumerate().map(|(i, (name, _))| (name.as_str(), i)).collect();

    let mut uf = UnionFind::new(n);
    for i in 0..n {
        for j in (i + 1)..n {
            let shares_attr = !touches[i].0.is_disjoint(&touches[j].0);
            let calls_each_other =
                touches[i].1.contains(&class_methods[j].0) || touches[j].1.contains(&class_methods[i].0);
            if shares_attr || calls_each_other {
                uf.union(i, j);
            }
        }
    }
    let _ = name_index;
    uf.component_count()
}

// ---------------------------------------------------------------------
// CBO
// ---------------------------------------------------------------------

/// Count of distinct other classes (from `known_classes`, the set of class
/// names defined in the same file) referenced via inheritance, a type
/// annotation, instantiation, or attribute access. Cross-module type
/// inference is out of scope; this is a same-file, name-based heuristic.
pub fn cbo(class_node: SynNode, class_name: &str, known_classes: &HashSet<String>) -> usize {
    let mut referenced = HashSet::new();

    // Inheritance: the class's argument/base list.
    for base in class_node.args() {
        if let Some(text) = base.text() {
            if known_classes.contains(text) && text != class_name {
                referenced.insert(text.to_string());
            }
        }
    }

    fn walk(node: SynNode, class_name: &str, known: &HashSet<String>, out: &mut HashSet<String>) {
        if node.kind() == NodeKind::Name {
            if let Some(t) = node.text() {
                if known.contains(t) && t != class_name {
                    out.insert(t.to_string());
                }
            }
        }
        for child in node.children() {
            walk(child, class_name, known, out);
        }
    }
    for stmt in class_node.body() {
        walk(stmt, class_name, known_classes, &mut referenced);
    }

    referenced.len()
}

// ---------------------------------------------------------------------
// System-level coupling
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct Coupling {
    pub afferent: usize,
    pub efferent: usize,
    pub instability: f64,
    pub abstractness: f64,
    pub distance_from_main_sequence: f64,
    pub modularity_index: f64,
}

/// The dotted prefix before a module's last component, e.g. `"pkg.sub"`
/// for `"pkg.sub.mod"`; a module with no dot is its own package.
fn package_of(module: &str) -> &str {
    module.rsplit_once('.').map(|(pkg, _)| pkg).unwrap_or(module)
}

/// Robert Martin's package metrics over a module import graph: `modules`
/// maps each module name to the modules it imports (efferent edges).
/// `abstractness` per module is the caller-supplied ratio of abstract
/// classes (methods that only `pass` or `raise NotImplementedError`) to
/// total classes.
pub fn coupling(modules: &HashMap<String, HashSet<String>>, module: &str, abstractness: f64) -> Coupling {
    let efferent_set = modules.get(module);
    let efferent = efferent_set.map(|s| s.len()).unwrap_or(0);
    let afferent = modules
        .iter()
        .filter(|(name, imports)| *name != module && imports.contains(module))
        .count();

    let instability = if afferent + efferent == 0 {
        0.0
    } else {
        efferent as f64 / (afferent + efferent) as f64
    };
    let distance = (abstractness + instability - 1.0).abs();

    // Cohesion: the share of this module's imports that stay within its
    // own package. Cycle penalty: the share of its imports that import it
    // straight back, a direct two-module cycle. A module with no imports
    // is vacuously cohesive and free of cycles.
    let package = package_of(module);
    let cohesion = match efferent_set {
        Some(imports) if !imports.is_empty() => {
            imports.iter().filter(|i| package_of(i) == package).count() as f64 / imports.len() as f64
        }
        _ => 1.0,
    };
    let cycle_penalty = match efferent_set {
        Some(imports) if !imports.is_empty() => {
            let mutual = imports
                .iter()
                .filter(|i| modules.get(*i).is_some_and(|back| back.contains(module)))
                .count();
            mutual as f64 / imports.len() as f64
        }
        _ => 0.0,
    };
    let modularity_index = (cohesion * (1.0 - cycle_penalty)).clamp(0.0, 1.0);

    Coupling {
        afferent,
        efferent,
        instability,
        abstractness,
        distance_from_main_sequence: distance,
        modularity_index,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::SynNode;
    use crate::cfg::build_all;
    use tree_sitter::{Language, Parser};

    fn parse(src: &str) -> (tree_sitter::Tree, Vec<u8>) {
        let mut parser = Parser::new();
        parser
            .set_language(&Language::from(tree_sitter_python::LANGUAGE))
            .unwrap();
        let code = src.as_bytes().to_vec();
        let tree = parser.parse(&code, None).unwrap();
        (tree, code)
    }

    #[test]
    fn straight_line_function_has_complexity_one() {
        let (tree, code) = parse("def f():\n    x = 1\n    return x\n");
        let root = SynNode::new(tree.root_node(), &code);
        let (_m, funcs) = build_all(root);
        let f = funcs.get("f").unwrap();
        assert_eq!(cyclomatic_complexity(f), 1);
    }

    #[test]
    fn branching_function_has_complexity_two() {
        let (tree, code) = parse("def f(x):\n    if x:\n        return 1\n    return 0\n");
        let root = SynNode::new(tree.root_node(), &code);
        let (_m, funcs) = build_all(root);
        let f = funcs.get("f").unwrap();
        assert_eq!(cyclomatic_complexity(f), 2);
    }

    #[test]
    fn nested_if_increases_depth() {
        let (tree, code) = parse("def f(x, y):\n    if x:\n        if y:\n            return 1\n    return 0\n");
        let root = SynNode::new(tree.root_node(), &code);
        let func = root.body().into_iter().next().unwrap();
        let depth = nesting_depth(&func.body());
        assert_eq!(depth, 2);
    }

    #[test]
    fn cohesive_class_has_single_component() {
        let (tree, code) = parse(
            "class C:\n    def a(self):\n        return self.x\n    def b(self):\n        self.x = 1\n",
        );
        let root = SynNode::new(tree.root_node(), &code);
        let class = root.body().into_iter().next().unwrap();
        let methods: Vec<(String, Vec<SynNode>)> = class
            .body()
            .into_iter()
            .map(|m| (m.name().unwrap().to_string(), m.body()))
            .collect();
        assert_eq!(lcom4(&methods), 1);
    }

    #[test]
    fn disjoint_methods_form_separate_components() {
        let (tree, code) = parse(
            "class C:\n    def a(self):\n        return self.x\n    def b(self):\n        return self.y\n",
        );
        let root = SynNode::new(tree.root_node(), &code);
        let class = root.body().into_iter().next().unwrap();
        let methods: Vec<(String, Vec<SynNode>)> = class
            .body()
            .into_iter()
            .map(|m| (m.name().unwrap().to_string(), m.body()))
            .collect();
        assert_eq!(lcom4(&methods), 2);
    }

    #[test]
    fn same_package_acyclic_module_has_high_modularity() {
        let mut modules = HashMap::new();
        modules.insert("pkg.a".to_string(), HashSet::from(["pkg.b".to_string()]));
        modules.insert("pkg.b".to_string(), HashSet::new());

        let result = coupling(&modules, "pkg.a", 0.0);
        assert_eq!(result.modularity_index, 1.0);
    }

    #[test]
    fn cross_package_mutual_import_lowers_modularity() {
        let mut modules = HashMap::new();
        modules.insert("pkg.a".to_string(), HashSet::from(["other.b".to_string()]));
        modules.insert("other.b".to_string(), HashSet::from(["pkg.a".to_string()]));

        let result = coupling(&modules, "pkg.a", 0.0);
        assert_eq!(result.modularity_index, 0.0);
    }

    #[test]
    fn module_with_no_imports_is_vacuously_modular() {
        let modules: HashMap<String, HashSet<String>> = HashMap::new();
        let result = coupling(&modules, "pkg.a", 0.0);
        assert_eq!(result.modularity_index, 1.0);
    }
}
