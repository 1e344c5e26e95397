//! Cascading clone classifier (component 10, part 1): fastest filter first,
//! T1 ≥ T2 ≥ T3 ≥ T4.

use crate::cfg::Cfg;
use crate::dfa::DfaResult;
use crate::fragment::CodeFragment;
use crate::similarity;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum CloneType {
    Type1,
    Type2,
    Type3,
    Type4,
}

impl CloneType {
    pub fn label(self) -> &'static str {
        match self {
            CloneType::Type1 => "Type-1",
            CloneType::Type2 => "Type-2",
            CloneType::Type3 => "Type-3",
            CloneType::Type4 => "Type-4",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub t1: f64,
    pub t2: f64,
    pub t3: f64,
    pub t4: f64,
}

impl Thresholds {
    pub fn defaults() -> Self {
        Self { t1: 0.95, t2: 0.80, t3: 0.65, t4: 0.50 }
    }

    /// T1 ≥ T2 ≥ T3 ≥ T4, surfaced as a setup failure by the caller if not.
    pub fn is_monotonic(&self) -> bool {
        self.t1 >= self.t2 && self.t2 >= self.t3 && self.t3 >= self.t4
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClassifierToggles {
    pub textual_enabled: bool,
    pub semantic_enabled: bool,
    pub dfa_enabled: bool,
}

impl ClassifierToggles {
    pub fn defaults() -> Self {
        Self { textual_enabled: true, semantic_enabled: true, dfa_enabled: true }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Classification {
    pub clone_type: CloneType,
    pub similarity: f64,
    pub confidence: f64,
    pub analyzer_name: &'static str,
}

/// The full cascade over a fragment pair. `cfgs`/`dfas` are `None` when the
/// semantic analyzer has nothing to build on (e.g. a fragment too small to
/// contain a statement).
pub fn classify(
    a: &CodeFragment,
    b: &CodeFragment,
    cfgs: Option<(&Cfg, &Cfg)>,
    dfas: Option<(&DfaResult, &DfaResult)>,
    thresholds: Thresholds,
    toggles: ClassifierToggles,
) -> Option<Classification> {
    if toggles.textual_enabled {
        let s = similarity::textual_similarity(a, b);
        if s >= thresholds.t1 {
            return Some(Classification {
                clone_type: CloneType::Type1,
                similarity: s,
                confidence: 1.0,
                analyzer_name: "textual",
            });
        }
    }

    let syntactic = similarity::syntactic_similarity(a, b);
    if syntactic >= thresholds.t2 {
        return Some(Classification {
            clone_type: CloneType::Type2,
            similarity: syntactic,
            confidence: 0.95,
            analyzer_name: "syntactic",
        });
    }

    let structural = similarity::structural_similarity(a, b);
    if structural >= thresholds.t3 {
        return Some(Classification {
            clone_type: CloneType::Type3,
            similarity: structural,
            confidence: 0.9,
            analyzer_name: "structural",
        });
    }

    if toggles.semantic_enabled {
        if let Some((cfg_a, cfg_b)) = cfgs {
            let dfa_pair = if toggles.dfa_enabled { dfas } else { None };
            let semantic = similarity::semantic_similarity(cfg_a, cfg_b, dfa_pair);
            if semantic >= thresholds.t4 {
                return Some(Classification {
                    clone_type: CloneType::Type4,
                    similarity: semantic,
                    confidence: 0.85,
                    analyzer_name: "semantic",
                });
            }
        }
    }

    if structural >= thresholds.t4 {
        return Some(Classification {
            clone_type: CloneType::Type4,
            similarity: structural,
            confidence: 0.8,
            analyzer_name: "structural",
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::SynNode;
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
    fn identical_functions_classify_as_type1() {
        let mut code_a = Vec::new();
        let tree_a = parse("def g(a, b):\n    r = a + b\n    return r\n", &mut code_a);
        let root_a = SynNode::new(tree_a.root_node(), &code_a);
        let func_a = root_a.body().into_iter().next().unwrap();
        let frag_a = CodeFragment::new("a.py".into(), "g".into(), func_a, &code_a);

        let mut code_b = Vec::new();
        let tree_b = parse("def g(a, b):\n    r = a + b\n    return r\n", &mut code_b);
        let root_b = SynNode::new(tree_b.root_node(), &code_b);
        let func_b = root_b.body().into_iter().next().unwrap();
        let frag_b = CodeFragment::new("b.py".into(), "g".into(), func_b, &code_b);

        let c = classify(&frag_a, &frag_b, None, None, Thresholds::defaults(), ClassifierToggles::defaults())
            .unwrap();
        assert_eq!(c.clone_type, CloneType::Type1);
        assert_eq!(c.similarity, 1.0);
        assert_eq!(c.confidence, 1.0);
    }

    #[test]
    fn renamed_function_classifies_as_type2_when_threshold_allows() {
        let mut code_a = Vec::new();
        let tree_a = parse("def foo(x):\n    return x + 1\n", &mut code_a);
        let root_a = SynNode::new(tree_a.root_node(), &code_a);
        let func_a = root_a.body().into_iter().next().unwrap();
        let frag_a = CodeFragment::new("a.py".into(), "foo".into(), func_a, &code_a);

        let mut code_b = Vec::new();
        let tree_b = parse("def bar(y):\n    return y + 2\n", &mut code_b);
        let root_b = SynNode::new(tree_b.root_node(), &code_b);
        let func_b = root_b.body().into_iter().next().unwrap();
        let frag_b = CodeFragment::new("b.py".into(), "bar".into(), func_b, &code_b);

        let thresholds = Thresholds { t1: 0.95, t2: 0.80, t3: 0.70, t4: 0.50 };
        let c = classify(&frag_a, &frag_b, None, None, thresholds, ClassifierToggles::defaults()).unwrap();
        assert_eq!(c.clone_type, CloneType::Type2);
        assert_eq!(c.confidence, 0.95);
    }

    #[test]
    fn unrelated_fragments_yield_no_classification() {
        let mut code_a = Vec::new();
        let tree_a = parse("def f():\n    return 1\n", &mut code_a);
        let root_a = SynNode::new(tree_a.root_node(), &code_a);
        let func_a = root_a.body().into_iter().next().unwrap();
        let frag_a = CodeFragment::new("a.py".into(), "f".into(), func_a, &code_a);

        let mut code_b = Vec::new();
        let tree_b = parse(
            "class Widget:\n    def __init__(self):\n        self.items = []\n    def add(self, x):\n        self.items.append(x)\n    def total(self):\n        return len(self.items)\n",
            &mut code_b,
        );
        let root_b = SynNode::new(tree_b.root_node(), &code_b);
        let class_b = root_b.body().into_iter().next().unwrap();
        let frag_b = CodeFragment::new("b.py".into(), "Widget".into(), class_b, &code_b);

        let thresholds = Thresholds::defaults();
        let c = classify(&frag_a, &frag_b, None, None, thresholds, ClassifierToggles::defaults());
        assert!(c.is_none());
    }
}
