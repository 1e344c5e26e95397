//! Orchestration pipeline (component 12): walk -> parse -> per-file
//! (CFG, DFA, metrics, features) -> MinHash -> LSH -> candidate pairs ->
//! similarity analyzers -> classifier -> grouping -> report.

use crate::adapter::{self, NodeKind, SynNode};
use crate::cfg::{self, Cfg};
use crate::classifier::{self, ClassifierToggles, CloneType, Thresholds};
use crate::dfa::{self, DfaResult};
use crate::errors::AnalyzerResult;
use crate::features::{self, FeatureOptions};
use crate::fragment::CodeFragment;
use crate::grouping::{self, CloneGroup};
use crate::lsh::{LshConfig, LshIndex};
use crate::metrics;
use crate::minhash::{self, Signature};
use crate::reachability::{self, DeadCodeFinding};
use crate::utils::Config;
use crate::walk::spawn_senders;

use console::style;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;
use tree_sitter::{Language, Parser, Tree};

/// One successfully parsed source file: owns its bytes and parse tree so
/// every fragment borrowed from it can outlive the walk that found it.
struct ParsedFile {
    path: PathBuf,
    source: Vec<u8>,
    tree: Tree,
}

fn parse_file(path: &Path) -> AnalyzerResult<ParsedFile> {
    let source = std::fs::read(path)?;
    let mut parser = Parser::new();
    parser
        .set_language(&Language::from(tree_sitter_python::LANGUAGE))
        .map_err(|_| crate::errors::AnalyzerError::Config("failed to load python grammar".into()))?;
    let tree = parser
        .parse(&source, None)
        .ok_or_else(|| crate::errors::AnalyzerError::Msg(format!("parse failed for {}", path.display())))?;
    Ok(ParsedFile { path: path.to_path_buf(), source, tree })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FragmentKind {
    Function,
    Class,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct FragmentRef {
    pub file: PathBuf,
    pub name: String,
    pub start_line: usize,
    pub end_line: usize,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ClonePairReport {
    pub a: FragmentRef,
    pub b: FragmentRef,
    pub clone_type: CloneType,
    pub similarity: f64,
    pub confidence: f64,
    pub analyzer: &'static str,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CloneGroupReport {
    pub id: usize,
    pub members: Vec<FragmentRef>,
    pub average_similarity: f64,
    pub clone_type: CloneType,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct FunctionMetrics {
    pub name: String,
    pub file: PathBuf,
    pub cyclomatic_complexity: i64,
    pub nesting_depth: usize,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ClassMetrics {
    pub name: String,
    pub file: PathBuf,
    pub lcom4: usize,
    pub cbo: usize,
}

#[derive(Debug, serde::Serialize)]
pub struct ScanReport {
    pub files_scanned: usize,
    pub errors: Vec<(PathBuf, String)>,
    pub dead_code: Vec<DeadCodeFinding>,
    pub function_metrics: Vec<FunctionMetrics>,
    pub class_metrics: Vec<ClassMetrics>,
    pub clone_pairs: Vec<ClonePairReport>,
    pub clone_groups: Vec<CloneGroupReport>,
    pub elapsed: std::time::Duration,
}

/// One analyzable unit: a function or class definition big enough to clear
/// `MinLines`/`MinNodes`, together with everything the later stages need.
struct FragmentRecord<'a> {
    kind: FragmentKind,
    file_index: usize,
    qualified_name: String,
    fragment: CodeFragment<'a>,
    cfg: Option<&'a Cfg>,
    dfa: Option<DfaResult>,
}

/// Scan `root` end to end and produce the aggregate findings, per the
/// configured thresholds, toggles, and filters.
pub fn run(root: &Path, cfg: &Config) -> AnalyzerResult<ScanReport> {
    let started = Instant::now();

    let rx = spawn_senders(root, cfg);
    let parsed_results: Mutex<Vec<AnalyzerResult<ParsedFile>>> = Mutex::new(Vec::new());
    rx.into_iter().flatten().par_bridge().for_each(|path| {
        let result = parse_file(&path);
        parsed_results.lock().unwrap().push(result);
    });

    let mut parsed = Vec::new();
    let mut errors = Vec::new();
    for result in parsed_results.into_inner().unwrap() {
        match result {
            Ok(p) => parsed.push(p),
            Err(e) => errors.push((root.to_path_buf(), e.to_string())),
        }
    }

    tracing::info!(files = parsed.len(), "{} files parsed", style(parsed.len()).bold());

    // Per-file CFG set, built up front since fragments borrow from it.
    let file_cfgs: Vec<(Cfg, HashMap<String, Cfg>)> = parsed
        .par_iter()
        .map(|p| {
            let root_node = SynNode::new(p.tree.root_node(), &p.source);
            cfg::build_all(root_node)
        })
        .collect();

    let mut records: Vec<FragmentRecord> = Vec::new();
    for (file_index, file) in parsed.iter().enumerate() {
        let root_node = SynNode::new(file.tree.root_node(), &file.source);
        collect_fragments(root_node, &file.path, file_index, &file_cfgs[file_index].1, &mut records, cfg);
    }

    tracing::info!(fragments = records.len(), "candidate fragments collected");

    // Dead-code detection: one per function fragment.
    let mut dead_code = Vec::new();
    for record in &records {
        if let Some(cfg_ref) = record.cfg {
            dead_code.extend(reachability::detect(cfg_ref, &record.qualified_name, &record.fragment.file));
        }
    }

    let function_metrics = function_metrics(&records);
    let class_metrics = class_metrics(&records, &file_cfgs, &parsed);

    let lsh_config = LshConfig { bands: cfg.knobs.lsh_bands, rows: cfg.knobs.lsh_rows };
    let sig_len = lsh_config.signature_length().max(cfg.knobs.lsh_min_hash_count);

    let signatures: Vec<Signature> = records
        .par_iter()
        .map(|r| {
            let tokens = features::extract(r.fragment.tree(crate::tree::Canonicalization::Full), FeatureOptions {
                max_subtree_height: cfg.knobs.max_subtree_height,
                k_gram_size: cfg.knobs.k_gram_size,
            });
            minhash::signature(&tokens, sig_len)
        })
        .collect();

    let index: LshIndex<usize> = LshIndex::new(lsh_config);
    let sig_map: HashMap<usize, Signature> = signatures.iter().cloned().enumerate().collect();
    index.build_index(sig_map);

    let mut candidate_pairs: HashSet<(usize, usize)> = HashSet::new();
    for (i, sig) in signatures.iter().enumerate() {
        for j in index.find_candidates(sig) {
            if i != j {
                let pair = if i < j { (i, j) } else { (j, i) };
                candidate_pairs.insert(pair);
            }
        }
    }

    tracing::info!(candidates = candidate_pairs.len(), "LSH candidate pairs found");

    let thresholds = Thresholds {
        t1: cfg.thresholds.t1,
        t2: cfg.thresholds.t2,
        t3: cfg.thresholds.t3,
        t4: cfg.thresholds.t4,
    };
    let toggles = ClassifierToggles {
        textual_enabled: cfg.toggles.enable_textual_analysis,
        semantic_enabled: cfg.toggles.enable_semantic_analysis,
        dfa_enabled: cfg.toggles.enable_dfa_analysis,
    };

    let pair_list: Vec<(usize, usize)> = candidate_pairs.into_iter().collect();
    let classifications: Vec<(usize, usize, classifier::Classification)> = pair_list
        .par_iter()
        .filter_map(|&(i, j)| {
            let a = &records[i];
            let b = &records[j];
            let cfgs = match (a.cfg, b.cfg) {
                (Some(ca), Some(cb)) => Some((ca, cb)),
                _ => None,
            };
            let dfas = match (&a.dfa, &b.dfa) {
                (Some(da), Some(db)) => Some((da, db)),
                _ => None,
            };
            classifier::classify(&a.fragment, &b.fragment, cfgs, dfas, thresholds, toggles)
                .map(|c| (i, j, c))
        })
        .collect();

    let mut pair_similarity: HashMap<(usize, usize), f64> = HashMap::new();
    let mut clone_pairs = Vec::new();
    for (i, j, classification) in &classifications {
        pair_similarity.insert((*i, *j), classification.similarity);
        clone_pairs.push(ClonePairReport {
            a: fragment_ref(&records[*i]),
            b: fragment_ref(&records[*j]),
            clone_type: classification.clone_type,
            similarity: classification.similarity,
            confidence: classification.confidence,
            analyzer: classification.analyzer_name,
        });
    }

    let involved: Vec<usize> = {
        let mut ids: HashSet<usize> = HashSet::new();
        for (i, j, _) in &classifications {
            ids.insert(*i);
            ids.insert(*j);
        }
        let mut v: Vec<usize> = ids.into_iter().collect();
        v.sort_unstable();
        v
    };
    let group_edges: Vec<(usize, usize)> = classifications.iter().map(|(i, j, _)| (*i, *j)).collect();
    let groups: Vec<CloneGroup> = grouping::group(
        &involved,
        &group_edges,
        |a, b| {
            let key = if a < b { (a, b) } else { (b, a) };
            pair_similarity.get(&key).copied().unwrap_or(0.0)
        },
        thresholds.t4,
        thresholds,
    );

    let clone_groups = groups
        .into_iter()
        .map(|g| CloneGroupReport {
            id: g.id,
            members: g.members.iter().map(|&idx| fragment_ref(&records[idx])).collect(),
            average_similarity: g.average_similarity,
            clone_type: g.clone_type,
        })
        .collect();

    Ok(ScanReport {
        files_scanned: parsed.len(),
        errors,
        dead_code,
        function_metrics,
        class_metrics,
        clone_pairs,
        clone_groups,
        elapsed: started.elapsed(),
    })
}

fn fragment_ref(record: &FragmentRecord) -> FragmentRef {
    FragmentRef {
        file: record.fragment.file.clone(),
        name: record.qualified_name.clone(),
        start_line: record.fragment.span.start_line,
        end_line: record.fragment.span.end_line,
    }
}

/// Recursively finds function/class definitions big enough to analyze and
/// pushes a `FragmentRecord` for each, threading scope qualification the
/// same way the CFG builder does.
fn collect_fragments<'a>(
    node: SynNode<'a>,
    file: &Path,
    file_index: usize,
    func_cfgs: &'a HashMap<String, Cfg>,
    out: &mut Vec<FragmentRecord<'a>>,
    cfg: &Config,
) {
    fn walk<'a>(
        node: SynNode<'a>,
        scope: &mut Vec<String>,
        file: &Path,
        file_index: usize,
        func_cfgs: &'a HashMap<String, Cfg>,
        out: &mut Vec<FragmentRecord<'a>>,
        cfg: &Config,
    ) {
        for child in node.body() {
            let raw = child.raw_kind();
            let inner = if raw == "decorated_definition" { adapter::inner_definition(child) } else { child };

            match inner.kind() {
                NodeKind::Function | NodeKind::AsyncFunction => {
                    let name = inner.name().unwrap_or("<anon>").to_string();
                    let qualified = adapter::qualify(scope.as_slice(), &name);
                    let fragment = CodeFragment::new(file.to_path_buf(), qualified.clone(), inner, inner.code);
                    if fragment.meets_minimums(cfg.knobs.min_lines, cfg.knobs.min_nodes) {
                        let function_cfg = func_cfgs.get(&qualified);
                        let params: Vec<&str> = inner.args().iter().filter_map(|a| a.text()).collect();
                        let dfa_result = function_cfg.map(|c| dfa::analyze(c, inner, &params));
                        out.push(FragmentRecord {
                            kind: FragmentKind::Function,
                            file_index,
                            qualified_name: qualified,
                            fragment,
                            cfg: function_cfg,
                            dfa: dfa_result,
                        });
                    }
                    scope.push(name);
                    walk(inner, scope, file, file_index, func_cfgs, out, cfg);
                    scope.pop();
                }
                NodeKind::Class => {
                    let name = inner.name().unwrap_or("<anon>").to_string();
                    let qualified = adapter::qualify(scope.as_slice(), &name);
                    let fragment = CodeFragment::new(file.to_path_buf(), qualified.clone(), inner, inner.code);
                    if fragment.meets_minimums(cfg.knobs.min_lines, cfg.knobs.min_nodes) {
                        out.push(FragmentRecord {
                            kind: FragmentKind::Class,
                            file_index,
                            qualified_name: qualified,
                            fragment,
                            cfg: None,
                            dfa: None,
                        });
                    }
                    scope.push(name);
                    walk(inner, scope, file, file_index, func_cfgs, out, cfg);
                    scope.pop();
                }
                _ => walk(inner, scope, file, file_index, func_cfgs, out, cfg),
            }
        }
    }

    let mut scope = Vec::new();
    walk(node, &mut scope, file, file_index, func_cfgs, out, cfg);
}

fn function_metrics(records: &[FragmentRecord]) -> Vec<FunctionMetrics> {
    records
        .iter()
        .filter(|r| r.kind == FragmentKind::Function)
        .filter_map(|r| {
            r.cfg.map(|c| FunctionMetrics {
                name: r.qualified_name.clone(),
                file: r.fragment.file.clone(),
                cyclomatic_complexity: metrics::cyclomatic_complexity(c),
                nesting_depth: metrics::nesting_depth(&r.fragment.root.body()),
            })
        })
        .collect()
}

fn class_metrics(
    records: &[FragmentRecord],
    _file_cfgs: &[(Cfg, HashMap<String, Cfg>)],
    _parsed: &[ParsedFile],
) -> Vec<ClassMetrics> {
    // Per file, known class names (for the CBO name-lookup heuristic).
    let mut classes_per_file: HashMap<usize, HashSet<String>> = HashMap::new();
    for r in records.iter().filter(|r| r.kind == FragmentKind::Class) {
        classes_per_file
            .entry(r.file_index)
            .or_default()
            .insert(r.fragment.root.name().unwrap_or("").to_string());
    }

    records
        .iter()
        .filter(|r| r.kind == FragmentKind::Class)
        .map(|r| {
            let methods: Vec<(String, Vec<SynNode>)> = r
                .fragment
                .root
                .body()
                .into_iter()
                .filter(|m| matches!(m.kind(), NodeKind::Function | NodeKind::AsyncFunction))
                .map(|m| (m.name().unwrap_or("<anon>").to_string(), m.body()))
                .collect();
            let lcom4 = metrics::lcom4(&methods);

            let known = classes_per_file.get(&r.file_index).cloned().unwrap_or_default();
            let class_name = r.fragment.root.name().unwrap_or("");
            let cbo = metrics::cbo(r.fragment.root, class_name, &known);

            ClassMetrics { name: r.qualified_name.clone(), file: r.fragment.file.clone(), lcom4, cbo }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::Config;

    const SOURCE: &str = r#"
def compute_alpha(x, y):
    total = 0
    for i in range(x):
        if i % 2 == 0:
            total += i
        else:
            total -= i
    return total
    print("never")


def compute_beta(x, y):
    total = 0
    for i in range(x):
        if i % 2 == 0:
            total += i
        else:
            total -= i
    return total
"#;

    #[test]
    fn run_finds_dead_code_and_a_clone_pair() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("sample.py"), SOURCE).unwrap();

        let config = Config::default();
        let report = run(tmp.path(), &config).expect("pipeline run should succeed");

        assert_eq!(report.files_scanned, 1);
        assert!(report.errors.is_empty());
        assert!(!report.dead_code.is_empty(), "unreachable print after return should be flagged");
        assert!(!report.clone_pairs.is_empty(), "identical function bodies should classify as a clone pair");
    }

    #[test]
    fn run_on_empty_directory_yields_empty_report() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::default();
        let report = run(tmp.path(), &config).expect("pipeline run should succeed on an empty tree");

        assert_eq!(report.files_scanned, 0);
        assert!(report.clone_pairs.is_empty());
        assert!(report.dead_code.is_empty());
    }
}
