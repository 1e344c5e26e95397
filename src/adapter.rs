//! Syntax-tree adapter (component 1).
//!
//! Wraps the tree-sitter parse of the source language (tree-sitter-python's
//! grammar models the `def`/`class`/decorator/`with`/`try`/`async`/comprehension
//! surface this analyzer targets) behind a uniform node view. Everything
//! downstream — the labeled-tree builder, the CFG builder, the feature
//! extractor — consumes `SynNode`, never raw tree-sitter kinds directly.

use once_cell::sync::Lazy;
use phf::phf_map;
use std::collections::HashMap;
use tree_sitter::Node as TsNode;

/// The closed statement/expression vocabulary from §6. Grammar node kinds we
/// don't recognize degrade to `Other` rather than erroring — the CFG builder
/// treats `Other` as an opaque straight-line statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Module,
    Function,
    AsyncFunction,
    Class,
    If,
    Elif,
    Else,
    For,
    AsyncFor,
    While,
    Try,
    ExceptHandler,
    Finally,
    With,
    AsyncWith,
    Return,
    Break,
    Continue,
    Raise,
    Pass,
    Assign,
    AnnAssign,
    AugAssign,
    Expression,
    Call,
    Name,
    Constant,
    Attribute,
    Subscript,
    BinOp,
    UnaryOp,
    BoolOp,
    Compare,
    ListLit,
    SetLit,
    DictLit,
    TupleLit,
    ListComp,
    SetComp,
    DictComp,
    GeneratorExp,
    Lambda,
    IfExp,
    Import,
    ImportFrom,
    Alias,
    Arguments,
    Arg,
    Decorator,
    Match,
    MatchCase,
    Global,
    Delete,
    Assert,
    Yield,
    Await,
    Other,
}

/// Static mapping from tree-sitter-python node kind strings to our closed
/// vocabulary. `async` variants (`AsyncFunction`/`AsyncFor`/`AsyncWith`) are
/// detected separately by inspecting the leading token, since tree-sitter's
/// grammar marks them in-place rather than with a distinct node kind.
static KIND_MAP: phf::Map<&'static str, NodeKind> = phf_map! {
    "module" => NodeKind::Module,
    "function_definition" => NodeKind::Function,
    "class_definition" => NodeKind::Class,
    "if_statement" => NodeKind::If,
    "elif_clause" => NodeKind::Elif,
    "else_clause" => NodeKind::Else,
    "for_statement" => NodeKind::For,
    "while_statement" => NodeKind::While,
    "try_statement" => NodeKind::Try,
    "except_clause" => NodeKind::ExceptHandler,
    "except_group_clause" => NodeKind::ExceptHandler,
    "finally_clause" => NodeKind::Finally,
    "with_statement" => NodeKind::With,
    "with_item" => NodeKind::Other,
    "return_statement" => NodeKind::Return,
    "break_statement" => NodeKind::Break,
    "continue_statement" => NodeKind::Continue,
    "raise_statement" => NodeKind::Raise,
    "pass_statement" => NodeKind::Pass,
    "assignment" => NodeKind::Assign,
    "augmented_assignment" => NodeKind::AugAssign,
    "expression_statement" => NodeKind::Expression,
    "call" => NodeKind::Call,
    "identifier" => NodeKind::Name,
    "integer" => NodeKind::Constant,
    "float" => NodeKind::Constant,
    "string" => NodeKind::Constant,
    "true" => NodeKind::Constant,
    "false" => NodeKind::Constant,
    "none" => NodeKind::Constant,
    "attribute" => NodeKind::Attribute,
    "subscript" => NodeKind::Subscript,
    "binary_operator" => NodeKind::BinOp,
    "unary_operator" => NodeKind::UnaryOp,
    "not_operator" => NodeKind::UnaryOp,
    "boolean_operator" => NodeKind::BoolOp,
    "comparison_operator" => NodeKind::Compare,
    "list" => NodeKind::ListLit,
    "set" => NodeKind::SetLit,
    "dictionary" => NodeKind::DictLit,
    "tuple" => NodeKind::TupleLit,
    "list_comprehension" => NodeKind::ListComp,
    "set_comprehension" => NodeKind::SetComp,
    "dictionary_comprehension" => NodeKind::DictComp,
    "generator_expression" => NodeKind::GeneratorExp,
    "lambda" => NodeKind::Lambda,
    "conditional_expression" => NodeKind::IfExp,
    "import_statement" => NodeKind::Import,
    "import_from_statement" => NodeKind::ImportFrom,
    "aliased_import" => NodeKind::Alias,
    "dotted_name" => NodeKind::Other,
    "parameters" => NodeKind::Arguments,
    "typed_parameter" => NodeKind::Arg,
    "default_parameter" => NodeKind::Arg,
    "typed_default_parameter" => NodeKind::Arg,
    "decorator" => NodeKind::Decorator,
    "decorated_definition" => NodeKind::Other,
    "match_statement" => NodeKind::Match,
    "case_clause" => NodeKind::MatchCase,
    "global_statement" => NodeKind::Global,
    "nonlocal_statement" => NodeKind::Global,
    "delete_statement" => NodeKind::Delete,
    "assert_statement" => NodeKind::Assert,
    "yield" => NodeKind::Yield,
    "await" => NodeKind::Await,
    "block" => NodeKind::Other,
    "comment" => NodeKind::Other,
};

pub fn classify(ts_kind: &str) -> NodeKind {
    KIND_MAP.get(ts_kind).copied().unwrap_or(NodeKind::Other)
}

/// A uniform view over one tree-sitter node plus the file bytes it came from.
/// Carries only borrowed data; cheap to construct on the fly while walking.
#[derive(Clone, Copy)]
pub struct SynNode<'a> {
    pub inner: TsNode<'a>,
    pub code: &'a [u8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub start_line: usize,
    pub end_line: usize,
    pub start_col: usize,
    pub end_col: usize,
}

impl<'a> SynNode<'a> {
    pub fn new(inner: TsNode<'a>, code: &'a [u8]) -> Self {
        Self { inner, code }
    }

    pub fn kind(&self) -> NodeKind {
        let raw = self.inner.kind();
        if raw == "function_definition" && self.has_leading_async() {
            return NodeKind::AsyncFunction;
        }
        if raw == "for_statement" && self.has_leading_async() {
            return NodeKind::AsyncFor;
        }
        if raw == "with_statement" && self.has_leading_async() {
            return NodeKind::AsyncWith;
        }
        classify(raw)
    }

    pub fn raw_kind(&self) -> &'a str {
        self.inner.kind()
    }

    fn has_leading_async(&self) -> bool {
        // tree-sitter-python marks `async def`/`async for`/`async with` by
        // placing an `async` token as the first child of the statement node,
        // or (inside a class/module body) as a preceding sibling token on
        // `decorated_definition`. Checking the node's own first child covers
        // the common case; callers that walk via `decorated_definition`
        // unwrap to the inner definition first.
        let mut cursor = self.inner.walk();
        self.inner
            .children(&mut cursor)
            .next()
            .map(|c| c.kind() == "async")
            .unwrap_or(false)
    }

    pub fn text(&self) -> Option<&'a str> {
        self.inner.utf8_text(self.code).ok()
    }

    pub fn name(&self) -> Option<&'a str> {
        self.inner
            .child_by_field_name("name")
            .and_then(|n| n.utf8_text(self.code).ok())
    }

    pub fn value(&self) -> Option<SynNode<'a>> {
        self.inner
            .child_by_field_name("value")
            .map(|n| SynNode::new(n, self.code))
    }

    pub fn left(&self) -> Option<SynNode<'a>> {
        self.inner
            .child_by_field_name("left")
            .map(|n| SynNode::new(n, self.code))
    }

    pub fn right(&self) -> Option<SynNode<'a>> {
        self.inner
            .child_by_field_name("right")
            .map(|n| SynNode::new(n, self.code))
    }

    pub fn test(&self) -> Option<SynNode<'a>> {
        self.inner
            .child_by_field_name("condition")
            .or_else(|| self.inner.child_by_field_name("test"))
            .map(|n| SynNode::new(n, self.code))
    }

    pub fn iter_expr(&self) -> Option<SynNode<'a>> {
        self.inner
            .child_by_field_name("right")
            .or_else(|| self.inner.child_by_field_name("iterable"))
            .map(|n| SynNode::new(n, self.code))
    }

    pub fn location(&self) -> Location {
        let s = self.inner.start_position();
        let e = self.inner.end_position();
        Location {
            start_line: s.row + 1,
            end_line: e.row + 1,
            start_col: s.column,
            end_col: e.column,
        }
    }

    /// All named children, in source order.
    pub fn children(&self) -> Vec<SynNode<'a>> {
        let mut cursor = self.inner.walk();
        self.inner
            .named_children(&mut cursor)
            .map(|n| SynNode::new(n, self.code))
            .collect()
    }

    /// The statement list for block-bearing constructs (`body` field, or the
    /// `block` child for statements where tree-sitter-python doesn't expose
    /// a named field).
    pub fn body(&self) -> Vec<SynNode<'a>> {
        if let Some(b) = self.inner.child_by_field_name("body") {
            return SynNode::new(b, self.code).children();
        }
        let mut cursor = self.inner.walk();
        if let Some(block) = self
            .inner
            .children(&mut cursor)
            .find(|n| n.kind() == "block")
        {
            return SynNode::new(block, self.code).children();
        }
        Vec::new()
    }

    pub fn orelse(&self) -> Vec<SynNode<'a>> {
        let mut cursor = self.inner.walk();
        self.inner
            .children(&mut cursor)
            .find(|n| n.kind() == "else_clause")
            .map(|n| SynNode::new(n, self.code).body())
            .unwrap_or_default()
    }

    pub fn handlers(&self) -> Vec<SynNode<'a>> {
        let mut cursor = self.inner.walk();
        self.inner
            .children(&mut cursor)
            .filter(|n| n.kind() == "except_clause" || n.kind() == "except_group_clause")
            .map(|n| SynNode::new(n, self.code))
            .collect()
    }

    pub fn finalbody(&self) -> Vec<SynNode<'a>> {
        let mut cursor = self.inner.walk();
        self.inner
            .children(&mut cursor)
            .find(|n| n.kind() == "finally_clause")
            .map(|n| SynNode::new(n, self.code).body())
            .unwrap_or_default()
    }

    pub fn targets(&self) -> Vec<SynNode<'a>> {
        self.inner
            .child_by_field_name("left")
            .map(|n| SynNode::new(n, self.code).flatten_target_list())
            .unwrap_or_default()
    }

    fn flatten_target_list(&self) -> Vec<SynNode<'a>> {
        match self.inner.kind() {
            "pattern_list" | "tuple" => self.children(),
            _ => vec![*self],
        }
    }

    pub fn args(&self) -> Vec<SynNode<'a>> {
        self.inner
            .child_by_field_name("parameters")
            .map(|n| SynNode::new(n, self.code).children())
            .unwrap_or_default()
    }

    pub fn decorators(&self) -> Vec<SynNode<'a>> {
        // `decorated_definition` has a `decorator` named child list preceding
        // the definition; walk parent if we were handed the inner def.
        let mut cursor = self.inner.walk();
        self.inner
            .children(&mut cursor)
            .filter(|n| n.kind() == "decorator")
            .map(|n| SynNode::new(n, self.code))
            .collect()
    }

    pub fn start_byte(&self) -> usize {
        self.inner.start_byte()
    }

    pub fn end_byte(&self) -> usize {
        self.inner.end_byte()
    }
}

/// Identifies whether a given definition node carries a decorator list
/// (unwraps the `decorated_definition` wrapper tree-sitter-python emits).
pub fn inner_definition<'a>(node: SynNode<'a>) -> SynNode<'a> {
    if node.inner.kind() != "decorated_definition" {
        return node;
    }
    node.inner
        .child_by_field_name("definition")
        .map(|n| SynNode::new(n, node.code))
        .unwrap_or(node)
}

/// A fully-qualified name for a nested function/class, e.g. `Outer.inner`.
pub fn qualify(scope: &[String], name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", scope.join("."), name)
    }
}

/// Cache of compiled `Language` handles is unnecessary for a single
/// language, but mirrors the registry style used elsewhere in the codebase
/// for when a second grammar is added.
pub static LANGUAGE_NAME: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("py", "python");
    m.insert("pyi", "python");
    m
});
