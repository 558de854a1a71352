//! tree-sitter adapter.
//!
//! Picks the grammar for a detected language, parses the source, and lowers
//! the resulting tree into owned [`SyntaxNode`]s.

use super::SyntaxNode;
use crate::error::{Error, Result};
use crate::ingest::detect::{is_tsx, Language};
use std::path::Path;
use std::sync::Arc;

/// Parse `source` with the grammar for `language`.
///
/// TypeScript files with a `.tsx` extension use the TSX grammar. A tree with
/// syntax errors is still returned (tree-sitter recovers with `ERROR` nodes);
/// only a parser that produces no tree at all is an error.
///
/// # Examples
///
/// ```
/// # use repograph::syntax::parse;
/// # use repograph::ingest::detect::Language;
/// # use std::path::Path;
/// let tree = parse(Language::Python, Path::new("a.py"), "import os\n")?;
/// assert_eq!(tree.kind(), "module");
/// # Ok::<(), repograph::Error>(())
/// ```
pub fn parse(language: Language, path: &Path, source: &str) -> Result<SyntaxNode> {
    let grammar = grammar_for(language, path);

    let mut parser = tree_sitter::Parser::new();
    parser.set_language(&grammar).map_err(|e| Error::Parse {
        file: path.to_path_buf(),
        message: format!("Failed to set {} language: {:?}", language, e),
    })?;

    let tree = parser.parse(source, None).ok_or_else(|| Error::Parse {
        file: path.to_path_buf(),
        message: "Parse failed - no tree returned".to_string(),
    })?;

    let shared: Arc<str> = Arc::from(source);
    Ok(lower(tree.root_node(), &shared))
}

fn grammar_for(language: Language, path: &Path) -> tree_sitter::Language {
    match language {
        Language::Rust => tree_sitter_rust::language(),
        Language::Python => tree_sitter_python::language(),
        Language::C => tree_sitter_c::language(),
        Language::Cpp => tree_sitter_cpp::language(),
        Language::Java => tree_sitter_java::language(),
        Language::JavaScript => tree_sitter_javascript::language(),
        Language::TypeScript if is_tsx(path) => tree_sitter_typescript::language_tsx(),
        Language::TypeScript => tree_sitter_typescript::language_typescript(),
    }
}

fn lower(node: tree_sitter::Node<'_>, source: &Arc<str>) -> SyntaxNode {
    let mut cursor = node.walk();
    let children = node
        .children(&mut cursor)
        .map(|child| lower(child, source))
        .collect();

    SyntaxNode::from_parts(
        node.kind(),
        Arc::clone(source),
        node.byte_range(),
        node.start_position().into(),
        node.end_position().into(),
        children,
    )
}
