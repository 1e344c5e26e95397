//! Data-flow info: def-use chains over a CFG (component 5).
//!
//! Walks the same statement shapes the CFG builder does, but flattened (no
//! need to synthesize blocks) - each statement is matched back to the block
//! the CFG already put it in by its byte span, so block/position bookkeeping
//! never drifts out of sync with the CFG itself.

use crate::adapter::{NodeKind, SynNode};
use crate::cfg::Cfg;
use petgraph::prelude::*;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    Assign,
    Parameter,
    ForTarget,
    Import,
    WithTarget,
    ExceptTarget,
    Augmented,
    Read,
    CallArg,
    AttributeBase,
    SubscriptBase,
}

impl RefKind {
    pub fn is_def(self) -> bool {
        matches!(
            self,
            RefKind::Assign
                | RefKind::Parameter
                | RefKind::ForTarget
                | RefKind::Import
                | RefKind::WithTarget
                | RefKind::ExceptTarget
                | RefKind::Augmented
        )
    }
}

#[derive(Debug, Clone)]
pub struct DefUseRef {
    pub name: String,
    pub kind: RefKind,
    pub block: NodeIndex,
    pub position: usize,
}

#[derive(Debug, Clone)]
pub struct DefUsePair {
    pub def_index: usize,
    pub use_index: usize,
    pub cross_block: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Chain {
    pub name: String,
    pub defs: Vec<DefUseRef>,
    pub uses: Vec<DefUseRef>,
    pub pairs: Vec<DefUsePair>,
}

#[derive(Debug, Clone, Default)]
pub struct DfaResult {
    pub chains: HashMap<String, Chain>,
}

impl DfaResult {
    pub fn total_defs(&self) -> usize {
        self.chains.values().map(|c| c.defs.len()).sum()
    }

    pub fn total_uses(&self) -> usize {
        self.chains.values().map(|c| c.uses.len()).sum()
    }

    pub fn total_pairs(&self) -> usize {
        self.chains.values().map(|c| c.pairs.len()).sum()
    }

    pub fn cross_block_ratio(&self) -> f64 {
        let total = self.total_pairs();
        if total == 0 {
            return 0.0;
        }
        let cross: usize = self
            .chains
            .values()
            .flat_map(|c| &c.pairs)
            .filter(|p| p.cross_block)
            .count();
        cross as f64 / total as f64
    }

    pub fn average_chain_length(&self) -> f64 {
        if self.chains.is_empty() {
            return 0.0;
        }
        let total: usize = self.chains.values().map(|c| c.defs.len() + c.uses.len()).sum();
        total as f64 / self.chains.len() as f64
    }

    /// Histogram over def-kinds across all chains, keyed by `RefKind` debug
    /// name for stable, human-readable serialization.
    pub fn def_kind_histogram(&self) -> HashMap<&'static str, usize> {
        let mut hist = HashMap::new();
        for c in self.chains.values() {
            for d in &c.defs {
                *hist.entry(kind_label(d.kind)).or_insert(0) += 1;
            }
        }
        hist
    }

    pub fn use_kind_histogram(&self) -> HashMap<&'static str, usize> {
        let mut hist = HashMap::new();
        for c in self.chains.values() {
            for u in &c.uses {
                *hist.entry(kind_label(u.kind)).or_insert(0) += 1;
            }
        }
        hist
    }
}

fn kind_label(k: RefKind) -> &'static str {
    match k {
        RefKind::Assign => "assign",
        RefKind::Parameter => "parameter",
        RefKind::ForTarget => "for_target",
        RefKind::Import => "import",
        RefKind::WithTarget => "with_target",
        RefKind::ExceptTarget => "except_target",
        RefKind::Augmented => "augmented",
        RefKind::Read => "read",
        RefKind::CallArg => "call_arg",
        RefKind::AttributeBase => "attribute_base",
        RefKind::SubscriptBase => "subscript_base",
    }
}

struct Collector<'a> {
    block_of_span: HashMap<(usize, usize), NodeIndex>,
    raw: Vec<(String, RefKind, NodeIndex)>,
    _marker: std::marker::PhantomData<&'a ()>,
}

impl<'a> Collector<'a> {
    fn block_for(&self, node: SynNode<'a>) -> Option<NodeIndex> {
        self.block_of_span.get(&(node.start_byte(), node.end_byte())).copied()
    }

    fn record(&mut self, name: &str, kind: RefKind, block: NodeIndex) {
        if !name.is_empty() {
            self.raw.push((name.to_string(), kind, block));
        }
    }

    fn scan_expr(&mut self, node: SynNode<'a>, block: NodeIndex) {
        match node.kind() {
            NodeKind::Name => {
                if let Some(t) = node.text() {
                    self.record(t, RefKind::Read, block);
                }
            }
            NodeKind::Call => {
                let mut cursor = node.inner.walk();
                for child in node.inner.children(&mut cursor) {
                    let child = SynNode::new(child, node.code);
                    if child.raw_kind() == "argument_list" {
                        let mut c2 = child.inner.walk();
                        for arg in child.inner.children(&mut c2) {
                            let arg = SynNode::new(arg, node.code);
                            if arg.kind() == NodeKind::Name {
                                if let Some(t) = arg.text() {
                                    self.record(t, RefKind::CallArg, block);
                                }
                            } else {
                                self.scan_expr(arg, block);
                            }
                        }
                    } else {
                        self.scan_expr(child, block);
                    }
                }
            }
            NodeKind::Attribute => {
                if let Some(base) = node.inner.child_by_field_name("object").map(|n| SynNode::new(n, node.code)) {
                    if base.kind() == NodeKind::Name {
                        if let Some(t) = base.text() {
                            self.record(t, RefKind::AttributeBase, block);
                        }
                    } else {
                        self.scan_expr(base, block);
                    }
                }
            }
            NodeKind::Subscript => {
                if let Some(base) = node.value() {
                    if base.kind() == NodeKind::Name {
                        if let Some(t) = base.text() {
                            self.record(t, RefKind::SubscriptBase, block);
                        }
                    } else {
                        self.scan_expr(base, block);
                    }
                }
                for child in node.children() {
                    self.scan_expr(child, block);
                }
            }
            NodeKind::Constant => {}
            _ => {
                for child in node.children() {
                    self.scan_expr(child, block);
                }
            }
        }
    }

    fn collect_statement(&mut self, stmt: SynNode<'a>) {
        let Some(block) = self.block_for(stmt) else {
            // Decision/header blocks may hold a synthesized span (e.g. the
            // comprehension mini-subgraph); statements we can't place are
            // simply skipped rather than guessed at.
            return self.recurse_into_children(stmt);
        };

        match stmt.kind() {
            NodeKind::Assign => {
                for t in stmt.targets() {
                    if t.kind() == NodeKind::Name {
                        if let Some(name) = t.text() {
                            self.record(name, RefKind::Assign, block);
                        }
                    }
                }
                if let Some(v) = stmt.right() {
                    self.scan_expr(v, block);
                }
            }
            NodeKind::AugAssign => {
                if let Some(t) = stmt.left() {
                    if t.kind() == NodeKind::Name {
                        if let Some(name) = t.text() {
                            self.record(name, RefKind::Augmented, block);
                        }
                    }
                }
                if let Some(v) = stmt.right() {
                    self.scan_expr(v, block);
                }
            }
            NodeKind::AnnAssign => {
                if let Some(t) = stmt.left() {
                    if t.kind() == NodeKind::Name {
                        if let Some(name) = t.text() {
                            self.record(name, RefKind::Assign, block);
                        }
                    }
                }
                if let Some(v) = stmt.right() {
                    self.scan_expr(v, block);
                }
            }
            NodeKind::If | NodeKind::While => {
                if let Some(t) = stmt.test() {
                    self.scan_expr(t, block);
                }
                for s in stmt.body() {
                    self.collect_statement(s);
                }
                for s in stmt.orelse() {
                    self.collect_statement(s);
                }
            }
            NodeKind::For | NodeKind::AsyncFor => {
                if let Some(target) = stmt.left() {
                    if target.kind() == NodeKind::Name {
                        if let Some(name) = target.text() {
                            self.record(name, RefKind::ForTarget, block);
                        }
                    }
                }
                if let Some(it) = stmt.iter_expr() {
                    self.scan_expr(it, block);
                }
                for s in stmt.body() {
                    self.collect_statement(s);
                }
                for s in stmt.orelse() {
                    self.collect_statement(s);
                }
            }
            NodeKind::Try => {
                for s in stmt.body() {
                    self.collect_statement(s);
                }
                for h in stmt.handlers() {
                    if let Some(name) = h.name() {
                        if let Some(hblock) = self.block_for(h) {
                            self.record(name, RefKind::ExceptTarget, hblock);
                        }
                    }
                    for s in h.body() {
                        self.collect_statement(s);
                    }
                }
                for s in stmt.finalbody() {
                    self.collect_statement(s);
                }
            }
            NodeKind::With | NodeKind::AsyncWith => {
                let mut cursor = stmt.inner.walk();
                for child in stmt.inner.children(&mut cursor) {
                    if child.kind() == "with_item" {
                        if let Some(alias) = child.child_by_field_name("alias") {
                            if let Ok(name) = alias.utf8_text(stmt.code) {
                                self.record(name, RefKind::WithTarget, block);
                            }
                        }
                    }
                }
                for s in stmt.body() {
                    self.collect_statement(s);
                }
            }
            NodeKind::Import | NodeKind::ImportFrom => {
                let mut cursor = stmt.inner.walk();
                for child in stmt.inner.named_children(&mut cursor) {
                    let child = SynNode::new(child, stmt.code);
                    if let Some(name) = child.text() {
                        self.record(name, RefKind::Import, block);
                    }
                }
            }
            NodeKind::Return | NodeKind::Raise | NodeKind::Assert | NodeKind::Delete | NodeKind::Expression => {
                for c in stmt.children() {
                    self.scan_expr(c, block);
                }
            }
            NodeKind::Function | NodeKind::AsyncFunction | NodeKind::Class => {
                // Handled by a separate `analyze` call scoped to that
                // definition's own CFG; not walked again here.
            }
            _ => self.recurse_into_children(stmt),
        }
    }

    fn recurse_into_children(&mut self, stmt: SynNode<'a>) {
        for c in stmt.children() {
            self.collect_statement(c);
        }
    }
}

/// Build def-use chains for one CFG. `params` are the function's own
/// parameter names (bound in the entry block); pass `&[]` for a module CFG.
pub fn analyze(cfg: &Cfg, root: SynNode, params: &[&str]) -> DfaResult {
    let mut block_of_span = HashMap::new();
    for n in cfg.graph.node_indices() {
        for s in &cfg.graph[n].stmts {
            block_of_span.insert((s.start_byte, s.end_byte), n);
        }
    }

    let mut collector = Collector {
        block_of_span,
        raw: Vec::new(),
        _marker: std::marker::PhantomData,
    };

    for name in params {
        collector.record(name, RefKind::Parameter, cfg.entry);
    }
    for stmt in root.body() {
        collector.collect_statement(stmt);
    }

    let mut chains: HashMap<String, Chain> = HashMap::new();
    for (position, (name, kind, block)) in collector.raw.into_iter().enumerate() {
        let chain = chains.entry(name.clone()).or_insert_with(|| Chain {
            name: name.clone(),
            ..Default::default()
        });
        let r = DefUseRef { name, kind, block, position };
        if kind.is_def() {
            chain.defs.push(r);
        } else {
            chain.uses.push(r);
        }
    }

    for chain in chains.values_mut() {
        for (ui, u) in chain.uses.iter().enumerate() {
            if let Some((di, d)) = chain
                .defs
                .iter()
                .enumerate()
                .filter(|(_, d)| d.position <= u.position)
                .max_by_key(|(_, d)| d.position)
            {
                chain.pairs.push(DefUsePair {
                    def_index: di,
                    use_index: ui,
                    cross_block: d.block != u.block,
                });
            }
        }
    }

    DfaResult { chains }
}

#[cfg(test)]
mod tests {
    use super::*;
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
    fn simple_assign_then_read_forms_a_pair() {
        let (tree, code) = parse("def f():\n    x = 1\n    return x\n");
        let root = SynNode::new(tree.root_node(), &code);
        let (_m, funcs) = build_all(root);
        let f = funcs.get("f").unwrap();

        let fn_node = find_function(root, "f").unwrap();
        let result = analyze(f, fn_node, &[]);
        let chain = result.chains.get("x").expect("x should have a chain");
        assert_eq!(chain.defs.len(), 1);
        assert_eq!(chain.uses.len(), 1);
        assert_eq!(chain.pairs.len(), 1);
    }

    #[test]
    fn parameters_are_defs_in_entry_block() {
        let (tree, code) = parse("def f(a, b):\n    return a + b\n");
        let root = SynNode::new(tree.root_node(), &code);
        let (_m, funcs) = build_all(root);
        let f = funcs.get("f").unwrap();
        let fn_node = find_function(root, "f").unwrap();

        let result = analyze(f, fn_node, &["a", "b"]);
        assert!(result.chains.get("a").unwrap().defs.iter().any(|d| d.kind == RefKind::Parameter));
        assert!(result.chains.get("b").unwrap().defs.iter().any(|d| d.kind == RefKind::Parameter));
    }

    fn find_function<'a>(root: SynNode<'a>, name: &str) -> Option<SynNode<'a>> {
        for stmt in root.body() {
            let inner = crate::adapter::inner_definition(stmt);
            if inner.name() == Some(name) {
                return Some(inner);
            }
        }
        None
    }
}
