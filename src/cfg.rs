//! Control Flow Graph builder (component 3).
//!
//! Basic blocks live in an arena-backed `petgraph` graph indexed by small
//! integer ids (`NodeIndex`); edges reference endpoints by id. This sidesteps
//! the ownership cycles loops would otherwise create — see the design note
//! on graph cycles — and makes traversal a pure index walk.

use crate::adapter::{self, NodeKind, SynNode};
use std::collections::HashMap;
use tracing::warn;

use petgraph::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    Normal,
    CondTrue,
    CondFalse,
    Loop,
    LoopBack,
    Exception,
    Return,
    Break,
    Continue,
    Finally,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StmtSpan {
    pub start_byte: usize,
    pub end_byte: usize,
    pub start_line: usize,
    pub end_line: usize,
}

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: usize,
    pub label: String,
    pub stmts: Vec<StmtSpan>,
    pub is_loop_header: bool,
}

impl BasicBlock {
    fn new(id: usize, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            stmts: Vec::new(),
            is_loop_header: false,
        }
    }
}

pub type Graph = StableDiGraph<BasicBlock, EdgeKind>;

#[derive(Debug, Clone)]
pub struct Cfg {
    pub name: String,
    pub graph: Graph,
    pub entry: NodeIndex,
    pub exit: NodeIndex,
}

impl Cfg {
    pub fn block_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn predecessors(&self, n: NodeIndex) -> Vec<NodeIndex> {
        self.graph.neighbors_directed(n, Incoming).collect()
    }

    pub fn successors(&self, n: NodeIndex) -> Vec<NodeIndex> {
        self.graph.neighbors_directed(n, Outgoing).collect()
    }

    pub fn edges_out(&self, n: NodeIndex) -> Vec<(NodeIndex, EdgeKind)> {
        self.graph
            .edges_directed(n, Outgoing)
            .map(|e| (e.target(), *e.weight()))
            .collect()
    }
}

struct LoopCtx {
    header: NodeIndex,
    join: NodeIndex,
}

struct Builder<'a> {
    graph: Graph,
    next_id: usize,
    current: NodeIndex,
    loop_stack: Vec<LoopCtx>,
    handler_stack: Vec<NodeIndex>,
    /// Entry blocks of every `finally` currently in scope, innermost last.
    /// `return`/`break`/`continue` built while this is non-empty route into
    /// the innermost one instead of their nominal target.
    finally_stack: Vec<NodeIndex>,
    func_cfgs: HashMap<String, Cfg>,
    scope: Vec<String>,
    _marker: std::marker::PhantomData<&'a ()>,
}

impl<'a> Builder<'a> {
    fn new_block(&mut self, label: impl Into<String>) -> NodeIndex {
        let id = self.next_id;
        self.next_id += 1;
        self.graph.add_node(BasicBlock::new(id, label))
    }

    fn edge(&mut self, from: NodeIndex, to: NodeIndex, kind: EdgeKind) {
        self.graph.add_edge(from, to, kind);
    }

    fn append(&mut self, node: SynNode) {
        let loc = node.location();
        self.graph[self.current].stmts.push(StmtSpan {
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            start_line: loc.start_line,
            end_line: loc.end_line,
        });
    }

    /// Seal the current block into `next` with a Normal edge and make
    /// `next` the new current block.
    fn seal_into(&mut self, next: NodeIndex) {
        self.edge(self.current, next, EdgeKind::Normal);
        self.current = next;
    }

    /// Terminate the current block with `kind` going to `target` (if any),
    /// then open a fresh, disconnected block so any following source-order
    /// statements land somewhere inspectable — lacking predecessors, they
    /// read as unreachable to the dead-code pass.
    fn terminate(&mut self, kind: EdgeKind, target: Option<NodeIndex>) {
        if let Some(t) = target {
            self.edge(self.current, t, kind);
        }
        self.current = self.new_block("unreachable");
    }

    fn nearest_handler_or_exit(&self, exit: NodeIndex) -> NodeIndex {
        self.handler_stack.last().copied().unwrap_or(exit)
    }

    /// If a finally block exists, route `source` into it with a Finally
    /// edge and record `(kind, fallback_target)` so the finally block's own
    /// exit can re-issue this termination once it is built; otherwise
    /// connect straight to `fallback_target`.
    fn route_through_finally(
        &mut self,
        source: NodeIndex,
        kind: EdgeKind,
        fallback_target: NodeIndex,
        finally_entry: Option<NodeIndex>,
        finally_exits: &mut Vec<(EdgeKind, NodeIndex)>,
    ) {
        match finally_entry {
            Some(fe) => {
                self.edge(source, fe, EdgeKind::Finally);
                finally_exits.push((kind, fallback_target));
            }
            None => self.edge(source, fallback_target, kind),
        }
    }

    fn build_statements(&mut self, stmts: &[SynNode<'a>], exit: NodeIndex) {
        for stmt in stmts {
            self.build_statement(*stmt, exit);
        }
    }

    /// Like `build_statements`, but records every block visited along the
    /// way (used by `build_try` to wire exception edges from anywhere in
    /// the try body, not just its final block).
    fn build_statements_tracking(&mut self, stmts: &[SynNode<'a>], exit: NodeIndex, seen: &mut Vec<NodeIndex>) {
        for stmt in stmts {
            self.build_statement(*stmt, exit);
            if !seen.contains(&self.current) {
                seen.push(self.current);
            }
        }
    }

    fn build_statement(&mut self, stmt: SynNode<'a>, exit: NodeIndex) {
        let raw = stmt.raw_kind();
        if raw == "decorated_definition" {
            self.build_def(stmt, exit);
            return;
        }

        match stmt.kind() {
            NodeKind::Function | NodeKind::AsyncFunction | NodeKind::Class => {
                self.build_def(stmt, exit);
            }
            NodeKind::If => self.build_if(stmt, exit),
            NodeKind::While => self.build_while(stmt, exit),
            NodeKind::For | NodeKind::AsyncFor => self.build_for(stmt, exit),
            NodeKind::Try => self.build_try(stmt, exit),
            NodeKind::With | NodeKind::AsyncWith => self.build_with(stmt, exit),
            NodeKind::Return => {
                self.append(stmt);
                match self.finally_stack.last().copied() {
                    Some(fe) => self.terminate(EdgeKind::Finally, Some(fe)),
                    None => self.terminate(EdgeKind::Return, Some(exit)),
                }
            }
            NodeKind::Raise => {
                self.append(stmt);
                let handler = self.nearest_handler_or_exit(exit);
                self.terminate(EdgeKind::Exception, Some(handler));
            }
            NodeKind::Break => {
                self.append(stmt);
                if let Some(ctx) = self.loop_stack.last() {
                    let join = ctx.join;
                    match self.finally_stack.last().copied() {
                        Some(fe) => self.terminate(EdgeKind::Finally, Some(fe)),
                        None => self.terminate(EdgeKind::Break, Some(join)),
                    }
                } else {
                    warn!(target: "cfg", "break outside loop; treating as opaque statement");
                    self.terminate(EdgeKind::Break, None);
                }
            }
            NodeKind::Continue => {
                self.append(stmt);
                if let Some(ctx) = self.loop_stack.last() {
                    let header = ctx.header;
                    match self.finally_stack.last().copied() {
                        Some(fe) => self.terminate(EdgeKind::Finally, Some(fe)),
                        None => self.terminate(EdgeKind::Continue, Some(header)),
                    }
                } else {
                    warn!(target: "cfg", "continue outside loop; treating as opaque statement");
                    self.terminate(EdgeKind::Continue, None);
                }
            }
            NodeKind::Expression if has_comprehension(stmt) => self.build_comprehension(stmt),
            _ => {
                // Straight-line statement: assign, aug-assign, expression,
                // import, pass, assert, delete, global. Malformed/unknown
                // kinds degrade to this same opaque path per §7 - never
                // fatal.
                self.append(stmt);
            }
        }
    }

    fn build_if(&mut self, stmt: SynNode<'a>, exit: NodeIndex) {
        let cond = self.new_block("if");
        self.seal_into(cond);
        self.append(stmt);

        let join = self.new_block("join");

        let body = self.new_block("if.body");
        self.edge(cond, body, EdgeKind::CondTrue);
        self.current = body;
        self.build_statements(&stmt.body(), exit);
        self.seal_into(join);

        let orelse = stmt.orelse();
        if orelse.is_empty() {
            self.edge(cond, join, EdgeKind::CondFalse);
        } else {
            let else_block = self.new_block("if.else");
            self.edge(cond, else_block, EdgeKind::CondFalse);
            self.current = else_block;
            self.build_statements(&orelse, exit);
            self.seal_into(join);
        }
        self.current = join;
    }

    fn build_while(&mut self, stmt: SynNode<'a>, exit: NodeIndex) {
        let header = self.new_block("while.header");
        self.graph[header].is_loop_header = true;
        self.seal_into(header);
        self.append(stmt);

        let join = self.new_block("while.join");
        let body = self.new_block("while.body");
        self.edge(header, body, EdgeKind::CondTrue);
        self.edge(header, join, EdgeKind::CondFalse);

        self.loop_stack.push(LoopCtx { header, join });
        self.current = body;
        self.build_statements(&stmt.body(), exit);
        self.edge(self.current, header, EdgeKind::LoopBack);
        self.loop_stack.pop();

        self.current = join;
        self.build_statements(&stmt.orelse(), exit);
    }

    fn build_for(&mut self, stmt: SynNode<'a>, exit: NodeIndex) {
        let init = self.new_block("for.init");
        self.seal_into(init);
        self.append(stmt);

        let header = self.new_block("for.header");
        self.graph[header].is_loop_header = true;
        self.edge(init, header, EdgeKind::Normal);

        let join = self.new_block("for.join");
        let body = self.new_block("for.body");
        self.edge(header, body, EdgeKind::CondTrue);
        self.edge(header, join, EdgeKind::CondFalse);

        self.loop_stack.push(LoopCtx { header, join });
        self.current = body;
        self.build_statements(&stmt.body(), exit);
        self.edge(self.current, header, EdgeKind::LoopBack);
        self.loop_stack.pop();

        self.current = join;
        self.build_statements(&stmt.orelse(), exit);
    }

    fn build_with(&mut self, stmt: SynNode<'a>, exit: NodeIndex) {
        // Straight-line; the context manager's implicit cleanup is folded
        // into the enclosing try/finally machinery rather than given its
        // own CFG shape, since `with` cleanup always runs synchronously at
        // scope exit with no branch of its own.
        let entry = self.new_block("with");
        self.seal_into(entry);
        self.append(stmt);
        self.build_statements(&stmt.body(), exit);
    }

    fn build_try(&mut self, stmt: SynNode<'a>, exit: NodeIndex) {
        let handlers = stmt.handlers();
        let finalbody = stmt.finalbody();

        let join = self.new_block("try.join");
        let finally_entry = if finalbody.is_empty() {
            None
        } else {
            Some(self.new_block("finally"))
        };

        // Continuations the finally block's own exit must re-issue once
        // built, gathered as body/handler construction routes terminations
        // through it instead of straight to their nominal target.
        let mut finally_exits: Vec<(EdgeKind, NodeIndex)> = Vec::new();

        let first_handler_test = if handlers.is_empty() {
            None
        } else {
            Some(self.new_block("except"))
        };
        let raise_target = first_handler_test.unwrap_or_else(|| self.nearest_handler_or_exit(exit));

        let try_entry = self.new_block("try.body");
        self.seal_into(try_entry);

        self.handler_stack.push(raise_target);
        if let Some(fe) = finally_entry {
            self.finally_stack.push(fe);
        }
        let mut try_nodes = vec![try_entry];
        self.build_statements_tracking(&stmt.body(), exit, &mut try_nodes);
        if finally_entry.is_some() {
            self.finally_stack.pop();
        }
        self.handler_stack.pop();
        let try_body_end = self.current;

        // Every block visited while walking the try body may itself raise;
        // wire each one to the first handler test (or the enclosing
        // handler/exit when this try has none of its own).
        for n in &try_nodes {
            self.edge(*n, raise_target, EdgeKind::Exception);
        }

        // Normal completion of the body routes through `finally`, if any.
        self.route_through_finally(try_body_end, EdgeKind::Normal, join, finally_entry, &mut finally_exits);

        // Chain each handler: cond_true into its body, cond_false falls to
        // the next handler's test; the last handler's cond_false re-raises.
        let mut test_node = first_handler_test;
        for (idx, handler) in handlers.iter().enumerate() {
            let this_test = test_node.expect("handler list non-empty implies a test block");
            self.current = this_test;
            self.append(*handler);

            let body = self.new_block("except.body");
            self.edge(this_test, body, EdgeKind::CondTrue);
            self.current = body;
            if let Some(fe) = finally_entry {
                self.finally_stack.push(fe);
            }
            self.build_statements(&handler.body(), exit);
            if finally_entry.is_some() {
                self.finally_stack.pop();
            }
            let handler_end = self.current;
            self.route_through_finally(handler_end, EdgeKind::Normal, join, finally_entry, &mut finally_exits);

            if idx + 1 < handlers.len() {
                let next_test = self.new_block("except");
                self.edge(this_test, next_test, EdgeKind::CondFalse);
                test_node = Some(next_test);
            } else {
                let outer = self.handler_stack.last().copied().unwrap_or(exit);
                self.route_through_finally(this_test, EdgeKind::Exception, outer, finally_entry, &mut finally_exits);
            }
        }

        if let Some(fe) = finally_entry {
            // `return`/`break`/`continue` built anywhere in the body or
            // handlers funneled into this finally without knowing their own
            // destination; re-issue all three unconditionally (an enclosing
            // finally further out, if any, takes precedence over the raw
            // target, chaining nested finally blocks correctly).
            let outer_finally = self.finally_stack.last().copied();
            let return_target = outer_finally.unwrap_or(exit);
            finally_exits.push((EdgeKind::Return, return_target));
            if let Some(ctx) = self.loop_stack.last() {
                let break_target = outer_finally.unwrap_or(ctx.join);
                let continue_target = outer_finally.unwrap_or(ctx.header);
                finally_exits.push((EdgeKind::Break, break_target));
                finally_exits.push((EdgeKind::Continue, continue_target));
            }

            self.current = fe;
            self.build_statements(&finalbody, exit);
            let finally_exit = self.current;

            finally_exits.push((EdgeKind::Finally, join));
            let mut wired = std::collections::HashSet::new();
            for (kind, target) in finally_exits {
                if wired.insert((kind, target)) {
                    self.edge(finally_exit, target, kind);
                }
            }
        }

        self.current = join;
    }

    fn build_def(&mut self, stmt: SynNode<'a>, exit: NodeIndex) {
        // A nested def/class is a single opaque statement in the enclosing
        // CFG; its own sub-CFG is built independently and registered under
        // its fully-qualified name.
        self.append(stmt);

        let inner = adapter::inner_definition(stmt);
        let name = inner.name().unwrap_or("<anon>").to_string();
        let qualified = adapter::qualify(&self.scope, &name);

        if matches!(inner.kind(), NodeKind::Function | NodeKind::AsyncFunction) {
            let sub = build_function_cfg(inner, &qualified, &self.scope);
            self.func_cfgs.insert(qualified, sub);
        } else if matches!(inner.kind(), NodeKind::Class) {
            self.scope.push(name);
            for member in inner.body() {
                self.build_statement(member, exit);
            }
            self.scope.pop();
        }
    }

    fn build_comprehension(&mut self, stmt: SynNode<'a>) {
        // Synthesize the mini sub-graph from §4.1: init -> header
        // -(true)-> body -> append -(back)-> header; header -(false)->
        // exit. Nested generators/filters collapse to this single-stage
        // shape rather than one stage per `for`/`if` clause.
        self.append(stmt);
        let init = self.new_block("comp_init");
        self.seal_into(init);

        let header = self.new_block("comp_header");
        self.graph[header].is_loop_header = true;
        self.edge(init, header, EdgeKind::Normal);

        let comp_exit = self.new_block("comp_exit");
        let body = self.new_block("comp_body");
        self.edge(header, body, EdgeKind::CondTrue);
        self.edge(header, comp_exit, EdgeKind::CondFalse);

        let append_block = self.new_block("comp_append");
        self.edge(body, append_block, EdgeKind::Normal);
        self.edge(append_block, header, EdgeKind::LoopBack);

        self.current = comp_exit;
    }
}

fn has_comprehension(stmt: SynNode) -> bool {
    fn walk(n: SynNode) -> bool {
        matches!(
            n.kind(),
            NodeKind::ListComp | NodeKind::SetComp | NodeKind::DictComp | NodeKind::GeneratorExp
        ) || n.children().into_iter().any(walk)
    }
    walk(stmt)
}

fn build_function_cfg(def: SynNode, qualified_name: &str, parent_scope: &[String]) -> Cfg {
    let mut graph: Graph = StableDiGraph::new();
    let entry = graph.add_node(BasicBlock::new(0, "entry"));
    let exit = graph.add_node(BasicBlock::new(1, "exit"));

    let mut scope = parent_scope.to_vec();
    scope.push(def.name().unwrap_or("<anon>").to_string());

    let mut builder = Builder {
        graph,
        next_id: 2,
        current: entry,
        loop_stack: Vec::new(),
        handler_stack: Vec::new(),
        finally_stack: Vec::new(),
        func_cfgs: HashMap::new(),
        scope,
        _marker: std::marker::PhantomData,
    };

    builder.build_statements(&def.body(), exit);
    builder.edge(builder.current, exit, EdgeKind::Normal);

    Cfg {
        name: qualified_name.to_string(),
        graph: builder.graph,
        entry,
        exit,
    }
}

/// Build the module-level CFG only.
pub fn build(root: SynNode) -> Cfg {
    build_all(root).0
}

/// Build the module CFG plus one sub-CFG per function/async-function/method,
/// keyed by fully-qualified name.
pub fn build_all(root: SynNode) -> (Cfg, HashMap<String, Cfg>) {
    let mut graph: Graph = StableDiGraph::new();
    let entry = graph.add_node(BasicBlock::new(0, "entry"));
    let exit = graph.add_node(BasicBlock::new(1, "exit"));

    let mut builder = Builder {
        graph,
        next_id: 2,
        current: entry,
        loop_stack: Vec::new(),
        handler_stack: Vec::new(),
        finally_stack: Vec::new(),
        func_cfgs: HashMap::new(),
        scope: Vec::new(),
        _marker: std::marker::PhantomData,
    };

    builder.build_statements(&root.body(), exit);
    builder.edge(builder.current, exit, EdgeKind::Normal);

    let module = Cfg {
        name: "<module>".to_string(),
        graph: builder.graph,
        entry,
        exit,
    };
    (module, builder.func_cfgs)
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
    fn single_statement_function_has_entry_and_exit() {
        let (tree, code) = parse("def f():\n    x = 1\n");
        let root = SynNode::new(tree.root_node(), &code);
        let (_module, funcs) = build_all(root);
        let f = funcs.get("f").expect("f should be registered");
        assert!(f.block_count() >= 3);
        assert_eq!(f.predecessors(f.entry).len(), 0);
        assert_eq!(f.successors(f.exit).len(), 0);
    }

    #[test]
    fn return_then_statement_leaves_a_disconnected_block() {
        let (tree, code) = parse("def f():\n    return 1\n    x = 2\n");
        let root = SynNode::new(tree.root_node(), &code);
        let (_module, funcs) = build_all(root);
        let f = funcs.get("f").unwrap();
        let unreachable = f
            .graph
            .node_indices()
            .find(|&n| f.predecessors(n).is_empty() && n != f.entry);
        assert!(unreachable.is_some());
    }

    #[test]
    fn if_without_else_has_cond_true_and_cond_false() {
        let (tree, code) = parse("def f(x):\n    if x:\n        y = 1\n    z = 2\n");
        let root = SynNode::new(tree.root_node(), &code);
        let (_module, funcs) = build_all(root);
        let f = funcs.get("f").unwrap();
        let decision = f
            .graph
            .node_indices()
            .find(|&n| f.graph[n].label == "if")
            .unwrap();
        let out = f.edges_out(decision);
        assert!(out.iter().any(|(_, k)| *k == EdgeKind::CondTrue));
        assert!(out.iter().any(|(_, k)| *k == EdgeKind::CondFalse));
    }

    #[test]
    fn while_loop_has_back_edge() {
        let (tree, code) = parse("def f(x):\n    while x:\n        x = x - 1\n");
        let root = SynNode::new(tree.root_node(), &code);
        let (_module, funcs) = build_all(root);
        let f = funcs.get("f").unwrap();
        let has_back = f.graph.edge_weights().any(|w| *w == EdgeKind::LoopBack);
        assert!(has_back);
    }

    #[test]
    fn nested_function_gets_its_own_cfg() {
        let (tree, code) = parse("def outer():\n    def inner():\n        return 1\n    return inner()\n");
        let root = SynNode::new(tree.root_node(), &code);
        let (_module, funcs) = build_all(root);
        assert!(funcs.contains_key("outer"));
        assert!(funcs.contains_key("outer.inner"));
    }

    #[test]
    fn try_finally_routes_return_through_cleanup() {
        let (tree, code) = parse(
            "def f():\n    try:\n        return 1\n    finally:\n        cleanup()\n",
        );
        let root = SynNode::new(tree.root_node(), &code);
        let (_module, funcs) = build_all(root);
        let f = funcs.get("f").unwrap();

        // The block holding `return 1` must not reach `exit` directly; it
        // has to funnel into the finally block first.
        let return_block = f.graph.node_indices().find(|&n| f.graph[n].label == "try.body").unwrap();
        assert!(
            !f.edges_out(return_block).iter().any(|(target, kind)| *target == f.exit && *kind == EdgeKind::Return),
            "return inside try/finally must not bypass the finally block"
        );
        assert!(f.edges_out(return_block).iter().any(|(_, kind)| *kind == EdgeKind::Finally));

        // The finally block's own exit must re-issue the return to `exit`.
        let finally_block = f.graph.node_indices().find(|&n| f.graph[n].label == "finally").unwrap();
        assert!(f.edges_out(finally_block).iter().any(|(target, kind)| *target == f.exit && *kind == EdgeKind::Return));
    }

    #[test]
    fn break_in_try_finally_inside_loop_routes_through_cleanup() {
        let (tree, code) = parse(
            "def f(xs):\n    for x in xs:\n        try:\n            break\n        finally:\n            cleanup()\n",
        );
        let root = SynNode::new(tree.root_node(), &code);
        let (_module, funcs) = build_all(root);
        let f = funcs.get("f").unwrap();

        let for_join = f.graph.node_indices().find(|&n| f.graph[n].label == "for.join").unwrap();
        let try_body = f.graph.node_indices().find(|&n| f.graph[n].label == "try.body").unwrap();
        assert!(
            !f.edges_out(try_body).iter().any(|(target, kind)| *target == for_join && *kind == EdgeKind::Break),
            "break inside try/finally must not bypass the finally block"
        );

        let finally_block = f.graph.node_indices().find(|&n| f.graph[n].label == "finally").unwrap();
        assert!(f.edges_out(finally_block).iter().any(|(target, kind)| *target == for_join && *kind == EdgeKind::Break));
    }

    #[test]
    fn except_handlers_chain_on_cond_false() {
        let (tree, code) = parse(
            "def f():\n    try:\n        risky()\n    except ValueError:\n        a = 1\n    except TypeError:\n        b = 2\n",
        );
        let root = SynNode::new(tree.root_node(), &code);
        let (_module, funcs) = build_all(root);
        let f = funcs.get("f").unwrap();
        let except_blocks: Vec<_> = f
            .graph
            .node_indices()
            .filter(|&n| f.graph[n].label == "except")
            .collect();
        assert_eq!(except_blocks.len(), 2);
    }
}
