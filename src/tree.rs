//! Labeled ordered tree (component 2) used by all tree-edit-distance work.
//!
//! Built once from a `SynNode` and never mutated afterwards. Parent links
//! are plain arena indices rather than owning pointers — see the design
//! note on graph cycles; an ordered tree has no cycles, but keeping the
//! same indexed-arena shape as the CFG lets both be walked the same way.

use crate::adapter::{NodeKind, SynNode};

#[derive(Debug, Clone)]
pub struct TreeNode {
    pub id: usize,
    pub label: String,
    pub children: Vec<usize>,
    pub parent: Option<usize>,
    /// Populated by `prepare`.
    pub postorder: usize,
    pub lml: usize,
    pub key_root: bool,
    /// Byte span in the source this node came from, kept for fragment
    /// back-references; not part of the edit-distance computation itself.
    pub span: (usize, usize),
}

#[derive(Debug, Clone)]
pub struct LabeledTree {
    /// Arena indexed by construction id (not postorder id).
    pub nodes: Vec<TreeNode>,
    pub root: usize,
    /// node-id -> postorder id
    pub postorder_of: Vec<usize>,
    /// postorder id -> node-id
    pub by_postorder: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Canonicalization {
    Full,
    Stripped,
}

fn kind_name(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Module => "Module",
        NodeKind::Function => "Function",
        NodeKind::AsyncFunction => "AsyncFunction",
        NodeKind::Class => "Class",
        NodeKind::If => "If",
        NodeKind::Elif => "Elif",
        NodeKind::Else => "Else",
        NodeKind::For => "For",
        NodeKind::AsyncFor => "AsyncFor",
        NodeKind::While => "While",
        NodeKind::Try => "Try",
        NodeKind::ExceptHandler => "ExceptHandler",
        NodeKind::Finally => "Finally",
        NodeKind::With => "With",
        NodeKind::AsyncWith => "AsyncWith",
        NodeKind::Return => "Return",
        NodeKind::Break => "Break",
        NodeKind::Continue => "Continue",
        NodeKind::Raise => "Raise",
        NodeKind::Pass => "Pass",
        NodeKind::Assign => "Assign",
        NodeKind::AnnAssign => "AnnAssign",
        NodeKind::AugAssign => "AugAssign",
        NodeKind::Expression => "Expression",
        NodeKind::Call => "Call",
        NodeKind::Name => "Name",
        NodeKind::Constant => "Constant",
        NodeKind::Attribute => "Attribute",
        NodeKind::Subscript => "Subscript",
        NodeKind::BinOp => "BinOp",
        NodeKind::UnaryOp => "UnaryOp",
        NodeKind::BoolOp => "BoolOp",
        NodeKind::Compare => "Compare",
        NodeKind::ListLit => "List",
        NodeKind::SetLit => "Set",
        NodeKind::DictLit => "Dict",
        NodeKind::TupleLit => "Tuple",
        NodeKind::ListComp => "ListComp",
        NodeKind::SetComp => "SetComp",
        NodeKind::DictComp => "DictComp",
        NodeKind::GeneratorExp => "GeneratorExp",
        NodeKind::Lambda => "Lambda",
        NodeKind::IfExp => "IfExp",
        NodeKind::Import => "Import",
        NodeKind::ImportFrom => "ImportFrom",
        NodeKind::Alias => "Alias",
        NodeKind::Arguments => "Arguments",
        NodeKind::Arg => "Arg",
        NodeKind::Decorator => "Decorator",
        NodeKind::Match => "Match",
        NodeKind::MatchCase => "MatchCase",
        NodeKind::Global => "Global",
        NodeKind::Delete => "Delete",
        NodeKind::Assert => "Assert",
        NodeKind::Yield => "Yield",
        NodeKind::Await => "Await",
        NodeKind::Other => "Other",
    }
}

/// Does this kind carry a name/literal payload worth keeping in the full
/// canonicalization?
fn payload_of(node: SynNode, kind: NodeKind) -> Option<String> {
    match kind {
        NodeKind::Function
        | NodeKind::AsyncFunction
        | NodeKind::Class
        | NodeKind::Name
        | NodeKind::Constant => node.name().map(str::to_owned).or_else(|| {
            node.text().map(|t| {
                let t = t.trim();
                if t.len() > 32 { t[..32].to_owned() } else { t.to_owned() }
            })
        }),
        NodeKind::BinOp | NodeKind::UnaryOp | NodeKind::BoolOp | NodeKind::Compare => node
            .inner
            .child_by_field_name("operator")
            .and_then(|n| n.utf8_text(node.code).ok())
            .map(str::to_owned),
        _ => None,
    }
}

pub fn canonical_label(node: SynNode, mode: Canonicalization) -> String {
    let kind = node.kind();
    let base = kind_name(kind);
    if mode == Canonicalization::Stripped {
        return base.to_string();
    }
    match payload_of(node, kind) {
        Some(p) if !p.is_empty() => format!("{base}({p})"),
        _ => base.to_string(),
    }
}

struct Builder<'a> {
    nodes: Vec<TreeNode>,
    mode: Canonicalization,
    _marker: std::marker::PhantomData<&'a ()>,
}

impl<'a> Builder<'a> {
    fn push(&mut self, node: SynNode<'a>, parent: Option<usize>) -> usize {
        let id = self.nodes.len();
        self.nodes.push(TreeNode {
            id,
            label: canonical_label(node, self.mode),
            children: Vec::new(),
            parent,
            postorder: 0,
            lml: 0,
            key_root: false,
            span: (node.start_byte(), node.end_byte()),
        });
        for child in node.children() {
            let cid = self.push(child, Some(id));
            self.nodes[id].children.push(cid);
        }
        id
    }
}

impl LabeledTree {
    pub fn build(root: SynNode, mode: Canonicalization) -> Self {
        let mut b = Builder {
            nodes: Vec::new(),
            mode,
            _marker: std::marker::PhantomData,
        };
        let root_id = b.push(root, None);
        let mut tree = LabeledTree {
            nodes: b.nodes,
            root: root_id,
            postorder_of: Vec::new(),
            by_postorder: Vec::new(),
        };
        tree.prepare();
        tree
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Assigns post-order ids, left-most-leaf ids and key-root flags.
    /// Uses an explicit stack, not recursion — deep statement chains can
    /// exceed the default call-stack budget (§9 "Recursion depth").
    fn prepare(&mut self) {
        let n = self.nodes.len();
        self.postorder_of = vec![0; n];
        self.by_postorder = vec![0; n];
        if n == 0 {
            return;
        }

        let mut order = Vec::with_capacity(n);
        let mut stack = vec![(self.root, false)];
        while let Some((id, visited)) = stack.pop() {
            if visited {
                order.push(id);
                continue;
            }
            stack.push((id, true));
            for &c in self.nodes[id].children.iter().rev() {
                stack.push((c, false));
            }
        }

        for (post, &id) in order.iter().enumerate() {
            self.nodes[id].postorder = post;
            self.postorder_of[id] = post;
            self.by_postorder[post] = id;
        }

        // left-most-leaf: a leaf's lml is itself; an internal node's lml is
        // its first child's lml.
        for &id in &order {
            let post = self.nodes[id].postorder;
            if self.nodes[id].children.is_empty() {
                self.nodes[id].lml = post;
            } else {
                let first_child = self.nodes[id].children[0];
                self.nodes[id].lml = self.nodes[first_child].lml;
            }
        }

        // key root: no node with strictly larger post-order id shares this
        // node's lml. Equivalent to: among nodes sharing an lml value, only
        // the one with the greatest postorder id is a key root; the root is
        // always a key root by convention (its lml group may be singleton).
        let mut max_post_for_lml = vec![usize::MAX; n];
        for &id in &order {
            let lml = self.nodes[id].lml;
            let post = self.nodes[id].postorder;
            if max_post_for_lml[lml] == usize::MAX || post > max_post_for_lml[lml] {
                max_post_for_lml[lml] = post;
            }
        }
        for node in &mut self.nodes {
            node.key_root = node.postorder == max_post_for_lml[node.lml];
        }
        self.nodes[self.root].key_root = true;
    }

    /// Key roots ordered by ascending post-order id, as APTED's main loop
    /// expects to iterate in descending order (callers reverse as needed).
    pub fn key_roots(&self) -> Vec<usize> {
        let mut kr: Vec<usize> = self.nodes.iter().filter(|n| n.key_root).map(|n| n.id).collect();
        kr.sort_by_key(|&id| self.nodes[id].postorder);
        kr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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
    fn postorder_is_a_permutation() {
        let (tree, code) = parse("def f(x):\n    return x + 1\n");
        let root = SynNode::new(tree.root_node(), &code);
        let t = LabeledTree::build(root, Canonicalization::Full);

        let mut seen: Vec<bool> = vec![false; t.len()];
        for n in &t.nodes {
            assert!(n.postorder < t.len());
            assert!(!seen[n.postorder], "duplicate postorder id");
            seen[n.postorder] = true;
        }
        assert!(seen.into_iter().all(|b| b));
    }

    #[test]
    fn root_is_always_a_key_root() {
        let (tree, code) = parse("x = 1\ny = 2\n");
        let root = SynNode::new(tree.root_node(), &code);
        let t = LabeledTree::build(root, Canonicalization::Full);
        assert!(t.nodes[t.root].key_root);
    }

    #[test]
    fn lml_matches_first_childs_lml() {
        let (tree, code) = parse("if x:\n    y = 1\n");
        let root = SynNode::new(tree.root_node(), &code);
        let t = LabeledTree::build(root, Canonicalization::Full);
        for n in &t.nodes {
            if let Some(&first) = n.children.first() {
                assert_eq!(n.lml, t.nodes[first].lml);
            }
        }
    }

    #[test]
    fn stripped_canonicalization_drops_identifiers() {
        let (tree, code) = parse("foo = 1\n");
        let root = SynNode::new(tree.root_node(), &code);
        let full = LabeledTree::build(root, Canonicalization::Full);
        let stripped = LabeledTree::build(root, Canonicalization::Stripped);
        let has_payload = full.nodes.iter().any(|n| n.label.contains('('));
        let no_payload = stripped.nodes.iter().all(|n| !n.label.contains('('));
        assert!(has_payload);
        assert!(no_payload);
    }
}
