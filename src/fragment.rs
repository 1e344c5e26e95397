//! Code fragment: a sub-region of a file plus its lazily-built derived
//! representations (labeled tree, CFG, normalized text). Fragments are
//! built once per parse result and dropped when the containing file's
//! analysis finishes — nothing here outlives a single detection run.

use crate::adapter::SynNode;
use crate::tree::{Canonicalization, LabeledTree};
use std::path::PathBuf;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Span {
    pub start_line: usize,
    pub end_line: usize,
    pub start_col: usize,
    pub end_col: usize,
}

pub struct CodeFragment<'a> {
    pub file: PathBuf,
    pub span: Span,
    pub root: SynNode<'a>,
    pub source: &'a [u8],
    pub qualified_name: String,

    tree_full: OnceLock<LabeledTree>,
    tree_stripped: OnceLock<LabeledTree>,
    normalized_text: OnceLock<String>,
    size_nodes: OnceLock<usize>,
}

impl<'a> CodeFragment<'a> {
    pub fn new(file: PathBuf, qualified_name: String, root: SynNode<'a>, source: &'a [u8]) -> Self {
        let loc = root.location();
        Self {
            file,
            span: Span {
                start_line: loc.start_line,
                end_line: loc.end_line,
                start_col: loc.start_col,
                end_col: loc.end_col,
            },
            root,
            source,
            qualified_name,
            tree_full: OnceLock::new(),
            tree_stripped: OnceLock::new(),
            normalized_text: OnceLock::new(),
            size_nodes: OnceLock::new(),
        }
    }

    pub fn tree(&self, mode: Canonicalization) -> &LabeledTree {
        match mode {
            Canonicalization::Full => {
                self.tree_full.get_or_init(|| LabeledTree::build(self.root, Canonicalization::Full))
            }
            Canonicalization::Stripped => self
                .tree_stripped
                .get_or_init(|| LabeledTree::build(self.root, Canonicalization::Stripped)),
        }
    }

    pub fn line_count(&self) -> usize {
        self.span.end_line.saturating_sub(self.span.start_line) + 1
    }

    pub fn size_nodes(&self) -> usize {
        *self.size_nodes.get_or_init(|| self.tree(Canonicalization::Full).len())
    }

    /// Strips comments (respecting string literals) and collapses
    /// whitespace; computed lazily and only needed by the textual analyzer.
    pub fn normalized_text(&self) -> &str {
        self.normalized_text.get_or_init(|| normalize_source(self.raw_text()))
    }

    pub fn raw_text(&self) -> &'a str {
        std::str::from_utf8(&self.source[self.root.start_byte()..self.root.end_byte()]).unwrap_or("")
    }

    pub fn meets_minimums(&self, min_lines: usize, min_nodes: usize) -> bool {
        self.line_count() >= min_lines && self.size_nodes() >= min_nodes
    }
}

/// Strip `#` comments (never inside a string or triple-quoted block) and
/// collapse runs of whitespace to single spaces.
pub fn normalize_source(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    let bytes = src.as_bytes();
    let mut i = 0;
    let mut in_string: Option<(u8, bool)> = None; // (quote char, triple)

    while i < bytes.len() {
        let c = bytes[i];

        if let Some((quote, triple)) = in_string {
            if c == b'\\' && i + 1 < bytes.len() {
                out.push(c as char);
                out.push(bytes[i + 1] as char);
                i += 2;
                continue;
            }
            if c == quote {
                let closes_triple = triple && bytes.get(i + 1) == Some(&quote) && bytes.get(i + 2) == Some(&quote);
                if triple && closes_triple {
                    out.push_str(std::str::from_utf8(&bytes[i..i + 3]).unwrap_or(""));
                    i += 3;
                    in_string = None;
                    continue;
                } else if !triple {
                    out.push(c as char);
                    i += 1;
                    in_string = None;
                    continue;
                }
            }
            out.push(c as char);
            i += 1;
            continue;
        }

        if c == b'"' || c == b'\'' {
            let triple = bytes.get(i + 1) == Some(&c) && bytes.get(i + 2) == Some(&c);
            in_string = Some((c, triple));
            let span = if triple { 3 } else { 1 };
            out.push_str(std::str::from_utf8(&bytes[i..i + span]).unwrap_or(""));
            i += span;
            continue;
        }

        if c == b'#' {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }

        out.push(c as char);
        i += 1;
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_comments_outside_strings() {
        let src = "x = 1  # a comment\ny = \"# not a comment\"\n";
        let n = normalize_source(src);
        assert!(!n.contains("a comment"));
        assert!(n.contains("# not a comment"));
    }

    #[test]
    fn normalize_collapses_whitespace() {
        let n = normalize_source("x   =    1\n\n\ny = 2");
        assert_eq!(n, "x = 1 y = 2");
    }
}
