//! Owned syntax trees.
//!
//! Extraction never touches tree-sitter types directly: the parser adapter
//! in [`parse`] lowers a tree-sitter tree into [`SyntaxNode`]s, and anything
//! else that can produce `{kind, text, children}` can feed the extractors too.
//! Node text is a view into one shared source buffer, so lowering a file does
//! not copy its text once per tree level.

mod parse;

pub use parse::parse;

use serde::Serialize;
use std::borrow::Cow;
use std::ops::Range;
use std::sync::Arc;

/// Zero-based row/column position of a node boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
pub struct Position {
    /// Row (line) index, 0-based.
    pub row: usize,
    /// Column in bytes, 0-based.
    pub column: usize,
}

impl From<tree_sitter::Point> for Position {
    fn from(point: tree_sitter::Point) -> Self {
        Position {
            row: point.row,
            column: point.column,
        }
    }
}

/// A node of a parsed syntax tree.
#[derive(Debug, Clone)]
pub struct SyntaxNode {
    kind: Cow<'static, str>,
    source: Arc<str>,
    range: Range<usize>,
    start: Position,
    end: Position,
    children: Vec<SyntaxNode>,
}

impl SyntaxNode {
    /// Build a node by hand.
    ///
    /// The node owns its own text; positions default to zero and can be set
    /// with [`SyntaxNode::with_positions`].
    ///
    /// # Examples
    ///
    /// ```
    /// # use repograph::syntax::SyntaxNode;
    /// let name = SyntaxNode::new("identifier", "os", vec![]);
    /// let stmt = SyntaxNode::new("import_statement", "import os", vec![name]);
    /// assert_eq!(stmt.child_count(), 1);
    /// assert_eq!(stmt.children()[0].text(), "os");
    /// ```
    pub fn new(
        kind: impl Into<Cow<'static, str>>,
        text: impl Into<String>,
        children: Vec<SyntaxNode>,
    ) -> Self {
        let text: String = text.into();
        let len = text.len();
        SyntaxNode {
            kind: kind.into(),
            source: Arc::from(text),
            range: 0..len,
            start: Position::default(),
            end: Position::default(),
            children,
        }
    }

    /// Set the start/end positions of a hand-built node.
    pub fn with_positions(mut self, start: Position, end: Position) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    pub(crate) fn from_parts(
        kind: &'static str,
        source: Arc<str>,
        range: Range<usize>,
        start: Position,
        end: Position,
        children: Vec<SyntaxNode>,
    ) -> Self {
        SyntaxNode {
            kind: Cow::Borrowed(kind),
            source,
            range,
            start,
            end,
            children,
        }
    }

    /// Grammar node type (`import_statement`, `identifier`, `,` ...).
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Source text covered by this node.
    pub fn text(&self) -> &str {
        self.source.get(self.range.clone()).unwrap_or("")
    }

    /// Ordered children, anonymous tokens included.
    pub fn children(&self) -> &[SyntaxNode] {
        &self.children
    }

    /// Number of children.
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Start position.
    pub fn start_position(&self) -> Position {
        self.start
    }

    /// End position.
    pub fn end_position(&self) -> Position {
        self.end
    }

    /// First direct child with the given kind.
    pub fn child_of_kind(&self, kind: &str) -> Option<&SyntaxNode> {
        self.children.iter().find(|c| c.kind() == kind)
    }

    /// Whether any direct child has the given kind.
    pub fn has_child(&self, kind: &str) -> bool {
        self.child_of_kind(kind).is_some()
    }

    /// Depth-first, pre-order iterator over this node and all descendants.
    pub fn preorder(&self) -> Preorder<'_> {
        Preorder { stack: vec![self] }
    }
}

/// Iterator returned by [`SyntaxNode::preorder`].
pub struct Preorder<'a> {
    stack: Vec<&'a SyntaxNode>,
}

impl<'a> Iterator for Preorder<'a> {
    type Item = &'a SyntaxNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}
