//! Import statement extraction from syntax trees.
//!
//! Every grammar family lowers its own import syntax into one normalized
//! [`ImportRecord`] shape:
//! - Python: `import` and `from ... import`
//! - JavaScript/TypeScript: `import`, `export ... from`, and `require`
//! - Java: `import` and `import static`
//! - Rust: `use` trees
//! - C/C++: `#include`
//!
//! Extraction walks the whole tree depth-first in pre-order, so nested
//! (conditional, function-scoped) imports are found and records come out in
//! source order. A statement missing a child its rule needs is skipped on its
//! own; the walk carries on with the rest of the file.

mod cfamily;
mod ecmascript;
mod java;
mod python;
mod rust;

use crate::ingest::detect::Language;
use crate::syntax::SyntaxNode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How an import binds its local name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportType {
    /// `import X from 'm'`: binds the module's default export.
    Default,
    /// `from m import a`, `import { a } from 'm'`: binds one exported symbol.
    Named,
    /// `import os`, `import * as X from 'm'`: binds the whole module.
    Namespace,
}

impl ImportType {
    /// Stable string form used as an edge property.
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportType::Default => "default",
            ImportType::Named => "named",
            ImportType::Namespace => "namespace",
        }
    }
}

/// One normalized import binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRecord {
    /// File containing the import statement.
    pub importing_file: PathBuf,
    /// Name bound in the importing file.
    pub local_name: String,
    /// Module specifier as written (`os`, `./utils`, `java.util`, `crate::a`).
    pub target_file: String,
    /// Name looked up in the target (`default`, `*`, or a symbol name).
    pub exported_name: String,
    /// Binding kind.
    pub import_type: ImportType,
}

/// A binding produced by a language rule, before the file path is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Binding {
    local_name: String,
    target: String,
    exported_name: String,
    import_type: ImportType,
}

impl Binding {
    /// Whole-module import: local, exported, and target names coincide.
    pub(crate) fn module(target: &str) -> Self {
        Self::aliased_module(target, target)
    }

    /// Whole-module import bound under another name (`import numpy as np`).
    pub(crate) fn aliased_module(target: &str, local: &str) -> Self {
        Binding {
            local_name: local.to_string(),
            target: target.to_string(),
            exported_name: target.to_string(),
            import_type: ImportType::Namespace,
        }
    }

    /// Star import (`import * as ns`, `from m import *`, `use m::*`).
    pub(crate) fn star(target: &str, local: &str) -> Self {
        Binding {
            local_name: local.to_string(),
            target: target.to_string(),
            exported_name: "*".to_string(),
            import_type: ImportType::Namespace,
        }
    }

    /// Named import, possibly aliased.
    pub(crate) fn named(target: &str, exported: &str, local: &str) -> Self {
        Binding {
            local_name: local.to_string(),
            target: target.to_string(),
            exported_name: exported.to_string(),
            import_type: ImportType::Named,
        }
    }

    /// Default import.
    pub(crate) fn default_export(target: &str, local: &str) -> Self {
        Binding {
            local_name: local.to_string(),
            target: target.to_string(),
            exported_name: "default".to_string(),
            import_type: ImportType::Default,
        }
    }

    fn into_record(self, importing_file: &Path) -> ImportRecord {
        ImportRecord {
            importing_file: importing_file.to_path_buf(),
            local_name: self.local_name,
            target_file: self.target,
            exported_name: self.exported_name,
            import_type: self.import_type,
        }
    }
}

/// What a rule made of one syntax node.
#[derive(Debug)]
pub(crate) enum Match {
    /// Not an import construct for this grammar.
    Unrelated,
    /// An import statement and the bindings it declares.
    Bindings(Vec<Binding>),
    /// An import statement missing a child the rule needs.
    Malformed(&'static str),
}

/// Extraction rule for one grammar family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportRule {
    /// Python `import` / `from ... import`.
    Python,
    /// JavaScript, TypeScript, and TSX.
    EcmaScript,
    /// Java `import` declarations.
    Java,
    /// Rust `use` declarations.
    Rust,
    /// C and C++ `#include`.
    CFamily,
}

impl ImportRule {
    /// Rule for a detected language.
    pub fn for_language(language: Language) -> Self {
        match language {
            Language::Python => ImportRule::Python,
            Language::JavaScript | Language::TypeScript => ImportRule::EcmaScript,
            Language::Java => ImportRule::Java,
            Language::Rust => ImportRule::Rust,
            Language::C | Language::Cpp => ImportRule::CFamily,
        }
    }

    /// Rule for a language tag; unknown tags have no rule.
    pub fn for_tag(tag: &str) -> Option<Self> {
        Language::from_tag(tag).map(Self::for_language)
    }

    /// Extract every import binding in `tree`, in source order.
    pub fn extract(&self, tree: &SyntaxNode, path: &Path) -> Vec<ImportRecord> {
        let mut records = Vec::new();

        for node in tree.preorder() {
            match self.match_node(node) {
                Match::Unrelated => {}
                Match::Bindings(bindings) => {
                    records.extend(bindings.into_iter().map(|b| b.into_record(path)));
                }
                Match::Malformed(reason) => {
                    log::debug!(
                        "{}:{}: skipping malformed {} ({})",
                        path.display(),
                        node.start_position().row + 1,
                        node.kind(),
                        reason
                    );
                }
            }
        }

        records
    }

    fn match_node(&self, node: &SyntaxNode) -> Match {
        match self {
            ImportRule::Python => python::match_node(node),
            ImportRule::EcmaScript => ecmascript::match_node(node),
            ImportRule::Java => java::match_node(node),
            ImportRule::Rust => rust::match_node(node),
            ImportRule::CFamily => cfamily::match_node(node),
        }
    }
}

/// Extract imports from a tree parsed for `language`.
pub fn extract_imports(tree: &SyntaxNode, path: &Path, language: Language) -> Vec<ImportRecord> {
    ImportRule::for_language(language).extract(tree, path)
}

/// Extract imports for a language tag; unsupported tags yield no records.
pub fn extract_imports_for_tag(tree: &SyntaxNode, path: &Path, tag: &str) -> Vec<ImportRecord> {
    match ImportRule::for_tag(tag) {
        Some(rule) => rule.extract(tree, path),
        None => Vec::new(),
    }
}

/// Strip one layer of matching quotes or angle brackets from a literal.
pub(crate) fn unquote(text: &str) -> &str {
    let text = text.trim();
    for (open, close) in [('"', '"'), ('\'', '\''), ('`', '`'), ('<', '>')] {
        if text.len() >= 2 && text.starts_with(open) && text.ends_with(close) {
            return &text[1..text.len() - 1];
        }
    }
    text
}
