//! Reachability / dead-code detection (component 4).

use crate::cfg::{Cfg, EdgeKind};
use petgraph::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ReachabilityReport {
    pub reachable_ids: Vec<usize>,
    pub unreachable_ids: Vec<usize>,
    pub ratio: f64,
    pub analysis_time: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Critical,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeadCodeReason {
    UnreachableAfterReturn,
    UnreachableAfterRaise,
    UnreachableAfterBreak,
    UnreachableAfterContinue,
    UnreachableBranch,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeadCodeFinding {
    pub function: String,
    pub file: PathBuf,
    pub start_line: usize,
    pub end_line: usize,
    pub block_id: usize,
    pub snippet: String,
    pub reason: DeadCodeReason,
    pub severity: Severity,
}

/// DFS from `cfg.entry` over successor edges; any block not visited is
/// unreachable. `extra_entries` lets callers seed additional reachability
/// roots (e.g. exception handlers reachable only from outside the module).
pub fn analyze(cfg: &Cfg) -> ReachabilityReport {
    analyze_with_entries(cfg, &[])
}

pub fn analyze_with_entries(cfg: &Cfg, extra_entries: &[NodeIndex]) -> ReachabilityReport {
    let start = std::time::Instant::now();
    let mut visited = HashSet::new();
    let mut stack = vec![cfg.entry];
    stack.extend(extra_entries.iter().copied());

    while let Some(n) = stack.pop() {
        if !visited.insert(n) {
            continue;
        }
        for succ in cfg.graph.neighbors_directed(n, Outgoing) {
            if !visited.contains(&succ) {
                stack.push(succ);
            }
        }
    }

    let mut reachable_ids = Vec::new();
    let mut unreachable_ids = Vec::new();
    for n in cfg.graph.node_indices() {
        let id = cfg.graph[n].id;
        if visited.contains(&n) {
            reachable_ids.push(id);
        } else {
            unreachable_ids.push(id);
        }
    }
    reachable_ids.sort_unstable();
    unreachable_ids.sort_unstable();

    let total = reachable_ids.len() + unreachable_ids.len();
    let ratio = if total == 0 {
        1.0
    } else {
        reachable_ids.len() as f64 / total as f64
    };

    ReachabilityReport {
        reachable_ids,
        unreachable_ids,
        ratio,
        analysis_time: start.elapsed(),
    }
}

/// Classify each unreachable block by inspecting the terminator of its
/// nearest source-order predecessor (sequential fall-through), and emit one
/// finding per unreachable block.
pub fn detect(cfg: &Cfg, function: &str, file: &PathBuf) -> Vec<DeadCodeFinding> {
    let report = analyze(cfg);
    let unreachable: HashSet<usize> = report.unreachable_ids.iter().copied().collect();

    let mut findings = Vec::new();
    for n in cfg.graph.node_indices() {
        let block = &cfg.graph[n];
        if !unreachable.contains(&block.id) {
            continue;
        }
        let (start_line, end_line) = block_line_range(cfg, n);
        let snippet = block_snippet(cfg, n);
        let (reason, severity) = classify_dead_block(cfg, n);

        findings.push(DeadCodeFinding {
            function: function.to_string(),
            file: file.clone(),
            start_line,
            end_line,
            block_id: block.id,
            snippet,
            reason,
            severity,
        });
    }
    findings.sort_by_key(|f| (f.start_line, f.end_line, f.block_id));
    findings
}

fn block_line_range(cfg: &Cfg, n: NodeIndex) -> (usize, usize) {
    let block = &cfg.graph[n];
    let start = block.stmts.first().map(|s| s.start_line).unwrap_or(0);
    let end = block.stmts.last().map(|s| s.end_line).unwrap_or(start);
    (start, end)
}

fn block_snippet(cfg: &Cfg, n: NodeIndex) -> String {
    let block = &cfg.graph[n];
    format!("<{} statement(s) in block {}>", block.stmts.len(), block.id)
}

/// Find the nearest predecessor in sequential statement order (by line
/// number, within a small tolerance window) and classify the dead block
/// from that predecessor's terminating edge kind.
fn classify_dead_block(cfg: &Cfg, dead: NodeIndex) -> (DeadCodeReason, Severity) {
    const TOLERANCE_LINES: usize = 3;
    let dead_start = cfg.graph[dead].stmts.first().map(|s| s.start_line).unwrap_or(0);

    let mut best: Option<(NodeIndex, usize)> = None;
    for n in cfg.graph.node_indices() {
        if n == dead {
            continue;
        }
        let Some(last) = cfg.graph[n].stmts.last() else {
            continue;
        };
        if last.end_line > dead_start + TOLERANCE_LINES {
            continue;
        }
        let gap = dead_start.saturating_sub(last.end_line);
        if best.is_none_or(|(_, best_gap)| gap < best_gap) {
            best = Some((n, gap));
        }
    }

    let Some((pred, _)) = best else {
        return (DeadCodeReason::UnreachableBranch, Severity::Warning);
    };

    for (_, kind) in cfg.edges_out(pred) {
        match kind {
            EdgeKind::Return => return (DeadCodeReason::UnreachableAfterReturn, Severity::Critical),
            EdgeKind::Exception => return (DeadCodeReason::UnreachableAfterRaise, Severity::Critical),
            EdgeKind::Break => return (DeadCodeReason::UnreachableAfterBreak, Severity::Critical),
            EdgeKind::Continue => return (DeadCodeReason::UnreachableAfterContinue, Severity::Critical),
            _ => {}
        }
    }
    (DeadCodeReason::UnreachableBranch, Severity::Warning)
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
    fn single_statement_function_has_no_unreachable_blocks() {
        let (tree, code) = parse("def f():\n    x = 1\n");
        let root = SynNode::new(tree.root_node(), &code);
        let (_m, funcs) = build_all(root);
        let f = funcs.get("f").unwrap();
        let report = analyze(f);
        assert!(report.unreachable_ids.is_empty());
        assert_eq!(report.ratio, 1.0);
    }

    #[test]
    fn unreachable_after_return_is_critical() {
        let (tree, code) = parse("def f():\n    return 1\n    x = 2\n");
        let root = SynNode::new(tree.root_node(), &code);
        let (_m, funcs) = build_all(root);
        let f = funcs.get("f").unwrap();
        let report = analyze(f);
        assert_eq!(report.unreachable_ids.len(), 1);

        let findings = detect(f, "f", &PathBuf::from("test.py"));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].reason, DeadCodeReason::UnreachableAfterReturn);
        assert_eq!(findings[0].severity, Severity::Critical);
    }

    #[test]
    fn reachable_plus_unreachable_equals_total() {
        let (tree, code) = parse("def f(x):\n    if x:\n        return 1\n        y = 2\n    return 3\n");
        let root = SynNode::new(tree.root_node(), &code);
        let (_m, funcs) = build_all(root);
        let f = funcs.get("f").unwrap();
        let report = analyze(f);
        assert_eq!(
            report.reachable_ids.len() + report.unreachable_ids.len(),
            f.block_count()
        );
    }
}
