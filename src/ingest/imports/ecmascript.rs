//! JavaScript / TypeScript import rule.
//!
//! Covers ES module imports (default, named, namespace, side-effect,
//! `import type`), re-exports with a `from` clause, TypeScript
//! `import x = require('m')`, and CommonJS `require` bound to a variable.

use super::{unquote, Binding, Match};
use crate::syntax::SyntaxNode;

pub(super) fn match_node(node: &SyntaxNode) -> Match {
    match node.kind() {
        "import_statement" => import_statement(node),
        "export_statement" => export_statement(node),
        "variable_declarator" => require_declarator(node),
        _ => Match::Unrelated,
    }
}

fn import_statement(node: &SyntaxNode) -> Match {
    if let Some(clause) = node.child_of_kind("import_require_clause") {
        return import_require_clause(clause);
    }

    let Some(target) = node.child_of_kind("string").map(string_value) else {
        return Match::Malformed("import_statement without source string");
    };

    let Some(clause) = node.child_of_kind("import_clause") else {
        // `import 'polyfills'`
        return Match::Bindings(vec![Binding::module(target)]);
    };

    let mut bindings = Vec::new();
    for part in clause.children() {
        match part.kind() {
            "identifier" => bindings.push(Binding::default_export(target, part.text())),
            "namespace_import" => match part.child_of_kind("identifier") {
                Some(local) => bindings.push(Binding::star(target, local.text())),
                None => return Match::Malformed("namespace_import without local name"),
            },
            "named_imports" => {
                for item in part.children().iter().filter(|c| c.kind() == "import_specifier") {
                    match specifier(item) {
                        Some((exported, local)) => {
                            bindings.push(Binding::named(target, exported, local));
                        }
                        None => return Match::Malformed("import_specifier without name"),
                    }
                }
            }
            _ => {}
        }
    }

    if bindings.is_empty() {
        return Match::Malformed("import_clause without bindings");
    }
    Match::Bindings(bindings)
}

/// `import fs = require('fs')` (TypeScript).
fn import_require_clause(clause: &SyntaxNode) -> Match {
    let local = clause.child_of_kind("identifier");
    let target = clause.child_of_kind("string").map(string_value);
    match (local, target) {
        (Some(local), Some(target)) => Match::Bindings(vec![Binding::star(target, local.text())]),
        _ => Match::Malformed("import_require_clause without name or source"),
    }
}

/// `export { a, b as c } from 'm'`, `export * from 'm'`, `export * as ns from 'm'`.
///
/// Exports without a `from` clause are not imports.
fn export_statement(node: &SyntaxNode) -> Match {
    if !node.has_child("from") {
        return Match::Unrelated;
    }
    let Some(target) = node.child_of_kind("string").map(string_value) else {
        return Match::Malformed("export_statement without source string");
    };

    if let Some(ns) = node.child_of_kind("namespace_export") {
        return match ns.children().iter().rev().find(|c| c.kind() != "*" && c.kind() != "as") {
            Some(local) => Match::Bindings(vec![Binding::star(target, unquote(local.text()))]),
            None => Match::Malformed("namespace_export without name"),
        };
    }

    if let Some(clause) = node.child_of_kind("export_clause") {
        let mut bindings = Vec::new();
        for item in clause.children().iter().filter(|c| c.kind() == "export_specifier") {
            match specifier(item) {
                Some((exported, local)) => bindings.push(Binding::named(target, exported, local)),
                None => return Match::Malformed("export_specifier without name"),
            }
        }
        return Match::Bindings(bindings);
    }

    if node.has_child("*") {
        return Match::Bindings(vec![Binding::star(target, "*")]);
    }
    Match::Malformed("export_statement with source but no export clause")
}

/// `const x = require('m')` and `const { a, b: c } = require('m')`.
fn require_declarator(node: &SyntaxNode) -> Match {
    let children = node.children();
    let Some(call) = children.iter().find(|c| c.kind() == "call_expression") else {
        return Match::Unrelated;
    };
    let is_require = call
        .children()
        .first()
        .is_some_and(|callee| callee.kind() == "identifier" && callee.text() == "require");
    if !is_require {
        return Match::Unrelated;
    }

    let Some(target) = call
        .child_of_kind("arguments")
        .and_then(|args| args.child_of_kind("string"))
        .map(string_value)
    else {
        return Match::Malformed("require call without string argument");
    };

    let Some(pattern) = children.first() else {
        return Match::Malformed("variable_declarator without name");
    };

    match pattern.kind() {
        "identifier" => Match::Bindings(vec![Binding::star(target, pattern.text())]),
        "object_pattern" => {
            let mut bindings = Vec::new();
            for prop in pattern.children() {
                match prop.kind() {
                    "shorthand_property_identifier_pattern" => {
                        bindings.push(Binding::named(target, prop.text(), prop.text()));
                    }
                    "pair_pattern" => {
                        let key = prop.children().first();
                        let value = prop.children().last();
                        match (key, value) {
                            (Some(key), Some(value)) if prop.child_count() >= 3 => {
                                bindings.push(Binding::named(target, key.text(), value.text()));
                            }
                            _ => return Match::Malformed("pair_pattern without key or value"),
                        }
                    }
                    _ => {}
                }
            }
            Match::Bindings(bindings)
        }
        _ => Match::Malformed("require bound to an unsupported pattern"),
    }
}

/// `name` or `name as alias` inside `{ ... }` -> (exported, local).
fn specifier(node: &SyntaxNode) -> Option<(&str, &str)> {
    let names: Vec<&SyntaxNode> = node
        .children()
        .iter()
        .filter(|c| c.kind() != "as" && c.kind() != "type" && c.kind() != "typeof")
        .collect();
    match names.as_slice() {
        [name] => Some((unquote(name.text()), unquote(name.text()))),
        [name, alias] => Some((unquote(name.text()), unquote(alias.text()))),
        _ => None,
    }
}

fn string_value(node: &SyntaxNode) -> &str {
    match node.child_of_kind("string_fragment") {
        Some(fragment) => fragment.text(),
        None => unquote(node.text()),
    }
}
