//! Definitions and call sites.
//!
//! One walk per file collects functions, methods, classes and interfaces
//! with their line spans and enclosing class, and every call expression
//! with the simple name of its callee and the definition it appears in.
//! Calls are resolved to definitions later, across the whole repository.

use crate::graph::schema;
use crate::ingest::detect::Language;
use crate::syntax::SyntaxNode;
use serde::Serialize;
use std::path::Path;

/// Kinds of definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    /// Free function.
    Function,
    /// Function owned by a class, struct, or trait.
    Method,
    /// Class, struct, enum, or record.
    Class,
    /// Interface or trait.
    Interface,
}

impl SymbolKind {
    /// Graph label for nodes of this kind.
    pub fn label(&self) -> &'static str {
        match self {
            SymbolKind::Function => schema::LABEL_FUNCTION,
            SymbolKind::Method => schema::LABEL_METHOD,
            SymbolKind::Class => schema::LABEL_CLASS,
            SymbolKind::Interface => schema::LABEL_INTERFACE,
        }
    }

    fn is_type(&self) -> bool {
        matches!(self, SymbolKind::Class | SymbolKind::Interface)
    }
}

/// A definition found in one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Definition {
    /// Simple name.
    pub name: String,
    /// Definition kind.
    pub kind: SymbolKind,
    /// First line (1-based).
    pub start_line: usize,
    /// Last line (1-based).
    pub end_line: usize,
    /// Name of the enclosing class / impl target, for methods.
    pub parent: Option<String>,
}

/// A call expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallSite {
    /// Simple name of the called function or method.
    pub callee: String,
    /// Index into [`FileSymbols::definitions`] of the enclosing definition.
    pub caller: Option<usize>,
    /// Line of the call (1-based).
    pub line: usize,
}

/// Everything one file defines and calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileSymbols {
    /// Definitions in pre-order.
    pub definitions: Vec<Definition>,
    /// Calls in pre-order.
    pub calls: Vec<CallSite>,
}

#[derive(Debug, Clone, Default)]
struct Scope {
    class: Option<String>,
    caller: Option<usize>,
}

/// Collect definitions and calls from a parsed file.
pub fn extract_symbols(tree: &SyntaxNode, path: &Path, language: Language) -> FileSymbols {
    let mut out = FileSymbols::default();
    walk(tree, language, &Scope::default(), &mut out);
    log::debug!(
        "{}: {} definitions, {} calls",
        path.display(),
        out.definitions.len(),
        out.calls.len()
    );
    out
}

fn walk(node: &SyntaxNode, language: Language, scope: &Scope, out: &mut FileSymbols) {
    if let Some(callee) = call_target(node, language) {
        out.calls.push(CallSite {
            callee,
            caller: scope.caller,
            line: line_of(node),
        });
    }

    let inner = if let Some(def) = definition(node, language, scope) {
        let is_type = def.kind.is_type();
        let name = def.name.clone();
        out.definitions.push(def);
        let index = out.definitions.len() - 1;
        Scope {
            class: is_type.then_some(name),
            caller: Some(index),
        }
    } else if language == Language::Rust && node.kind() == "impl_item" {
        Scope {
            class: rust_impl_target(node),
            caller: scope.caller,
        }
    } else {
        scope.clone()
    };

    for child in node.children() {
        walk(child, language, &inner, out);
    }
}

fn line_of(node: &SyntaxNode) -> usize {
    node.start_position().row + 1
}

fn make(node: &SyntaxNode, name: String, kind: SymbolKind, parent: Option<String>) -> Definition {
    Definition {
        name,
        kind,
        start_line: node.start_position().row + 1,
        end_line: node.end_position().row + 1,
        parent,
    }
}

fn first_text(node: &SyntaxNode, kinds: &[&str]) -> Option<String> {
    node.children()
        .iter()
        .find(|c| kinds.contains(&c.kind()))
        .map(|c| c.text().to_string())
}

/// Function or method depending on the enclosing class.
fn callable(node: &SyntaxNode, name: Option<String>, scope: &Scope) -> Option<Definition> {
    let name = name?;
    Some(match &scope.class {
        Some(class) => make(node, name, SymbolKind::Method, Some(class.clone())),
        None => make(node, name, SymbolKind::Function, None),
    })
}

fn definition(node: &SyntaxNode, language: Language, scope: &Scope) -> Option<Definition> {
    match language {
        Language::Python => python_definition(node, scope),
        Language::JavaScript | Language::TypeScript => ecma_definition(node, scope),
        Language::Java => java_definition(node, scope),
        Language::Rust => rust_definition(node, scope),
        Language::C | Language::Cpp => cfamily_definition(node, scope),
    }
}

fn python_definition(node: &SyntaxNode, scope: &Scope) -> Option<Definition> {
    match node.kind() {
        "function_definition" => callable(node, first_text(node, &["identifier"]), scope),
        "class_definition" => {
            let name = first_text(node, &["identifier"])?;
            Some(make(node, name, SymbolKind::Class, scope.class.clone()))
        }
        _ => None,
    }
}

fn ecma_definition(node: &SyntaxNode, scope: &Scope) -> Option<Definition> {
    match node.kind() {
        "function_declaration" | "generator_function_declaration" => {
            callable(node, first_text(node, &["identifier"]), &Scope::default())
        }
        "method_definition" => {
            let name = first_text(
                node,
                &["property_identifier", "private_property_identifier", "identifier"],
            )?;
            Some(make(node, name, SymbolKind::Method, scope.class.clone()))
        }
        "class_declaration" | "abstract_class_declaration" | "class" => {
            let name = first_text(node, &["type_identifier", "identifier"])?;
            Some(make(node, name, SymbolKind::Class, None))
        }
        "interface_declaration" => {
            let name = first_text(node, &["type_identifier"])?;
            Some(make(node, name, SymbolKind::Interface, None))
        }
        "variable_declarator" => {
            let is_function = node.children().iter().any(|c| {
                matches!(
                    c.kind(),
                    "arrow_function" | "function_expression" | "function" | "generator_function"
                )
            });
            if !is_function {
                return None;
            }
            callable(node, first_text(node, &["identifier"]), &Scope::default())
        }
        _ => None,
    }
}

fn java_definition(node: &SyntaxNode, scope: &Scope) -> Option<Definition> {
    let kind = match node.kind() {
        "class_declaration" | "enum_declaration" | "record_declaration" => SymbolKind::Class,
        "interface_declaration" | "annotation_type_declaration" => SymbolKind::Interface,
        "method_declaration" | "constructor_declaration" => SymbolKind::Method,
        _ => return None,
    };
    let name = first_text(node, &["identifier"])?;
    let parent = if kind == SymbolKind::Method {
        scope.class.clone()
    } else {
        None
    };
    Some(make(node, name, kind, parent))
}

fn rust_definition(node: &SyntaxNode, scope: &Scope) -> Option<Definition> {
    match node.kind() {
        "function_item" | "function_signature_item" => {
            callable(node, first_text(node, &["identifier"]), scope)
        }
        "struct_item" | "enum_item" | "union_item" => {
            let name = first_text(node, &["type_identifier"])?;
            Some(make(node, name, SymbolKind::Class, None))
        }
        "trait_item" => {
            let name = first_text(node, &["type_identifier"])?;
            Some(make(node, name, SymbolKind::Interface, None))
        }
        _ => None,
    }
}

/// Type an `impl` block attaches methods to (`impl Trait for Type` -> `Type`).
fn rust_impl_target(node: &SyntaxNode) -> Option<String> {
    let children = node.children();
    let is_type = |c: &&SyntaxNode| {
        matches!(
            c.kind(),
            "type_identifier" | "generic_type" | "scoped_type_identifier"
        )
    };
    let target = match children.iter().position(|c| c.kind() == "for") {
        Some(pos) => children[pos + 1..].iter().find(is_type),
        None => children.iter().find(is_type),
    }?;
    let text = target.text();
    let base = text.split('<').next().unwrap_or(text);
    Some(base.rsplit("::").next().unwrap_or(base).trim().to_string())
}

fn cfamily_definition(node: &SyntaxNode, scope: &Scope) -> Option<Definition> {
    match node.kind() {
        "function_definition" => {
            let declarator = node
                .children()
                .iter()
                .filter(|c| c.kind() != "compound_statement")
                .flat_map(|c| c.preorder())
                .find(|n| n.kind() == "function_declarator")?;
            let name_node = declarator.children().first()?;
            let text = name_node.text();
            match text.rsplit_once("::") {
                Some((owner, name)) => {
                    let owner = owner.rsplit("::").next().unwrap_or(owner);
                    Some(make(
                        node,
                        name.to_string(),
                        SymbolKind::Method,
                        Some(owner.to_string()),
                    ))
                }
                None => callable(node, Some(text.to_string()), scope),
            }
        }
        "class_specifier" | "struct_specifier" | "union_specifier" => {
            if !node.has_child("field_declaration_list") {
                return None;
            }
            let name = first_text(node, &["type_identifier"])?;
            Some(make(node, name, SymbolKind::Class, None))
        }
        _ => None,
    }
}

/// Callee name of a call expression.
fn call_target(node: &SyntaxNode, language: Language) -> Option<String> {
    match (language, node.kind()) {
        (Language::Python, "call") => callee_name(node.children().first()?),
        (Language::Java, "method_invocation") => {
            let children = node.children();
            let args = children.iter().position(|c| c.kind() == "argument_list")?;
            children[..args]
                .iter()
                .rev()
                .find(|c| c.kind() == "identifier")
                .map(|c| c.text().to_string())
        }
        (Language::Java, _) | (Language::Python, _) => None,
        (_, "call_expression") => callee_name(node.children().first()?),
        _ => None,
    }
}

fn callee_name(node: &SyntaxNode) -> Option<String> {
    match node.kind() {
        "identifier" | "field_identifier" | "property_identifier" => Some(node.text().to_string()),
        "attribute" | "member_expression" | "field_expression" | "scoped_identifier"
        | "qualified_identifier" => node
            .children()
            .iter()
            .rev()
            .find(|c| c.kind().ends_with("identifier"))
            .and_then(callee_name),
        "generic_function" | "template_function" => callee_name(node.children().first()?),
        _ => None,
    }
}
