//! Rust `use` rule.
//!
//! Use trees are flattened to one binding per leaf: `use a::{b, c as d};`
//! yields `b` and `d` from `a`. A leaf `self` binds the enclosing path itself.

use super::{Binding, Match};
use crate::syntax::SyntaxNode;

pub(super) fn match_node(node: &SyntaxNode) -> Match {
    if node.kind() != "use_declaration" {
        return Match::Unrelated;
    }

    let Some(argument) = node
        .children()
        .iter()
        .find(|c| !matches!(c.kind(), "use" | ";" | "visibility_modifier"))
    else {
        return Match::Malformed("use_declaration without argument");
    };

    let mut bindings = Vec::new();
    match flatten(argument, None, &mut bindings) {
        Ok(()) if !bindings.is_empty() => Match::Bindings(bindings),
        Ok(()) => Match::Malformed("use_declaration with an empty use list"),
        Err(reason) => Match::Malformed(reason),
    }
}

fn flatten(
    node: &SyntaxNode,
    prefix: Option<&str>,
    out: &mut Vec<Binding>,
) -> Result<(), &'static str> {
    match node.kind() {
        "self" => {
            let path = prefix.ok_or("bare `self` in use tree")?;
            out.push(Binding::aliased_module(path, last_segment(path)));
        }
        "identifier" | "scoped_identifier" | "crate" | "super" | "metavariable" => {
            out.push(path_binding(&join(prefix, node.text()), None));
        }
        "use_as_clause" => {
            let children = node.children();
            let path = children.first().ok_or("use_as_clause without path")?;
            let alias = children
                .last()
                .filter(|c| c.kind() == "identifier" && children.len() >= 3)
                .ok_or("use_as_clause without alias")?;
            out.push(path_binding(&join(prefix, path.text()), Some(alias.text())));
        }
        "scoped_use_list" => {
            let list = node.child_of_kind("use_list").ok_or("scoped_use_list without list")?;
            let path = node
                .children()
                .first()
                .filter(|c| c.kind() != "::" && c.kind() != "use_list")
                .map(|c| join(prefix, c.text()));
            let inner = path.as_deref().or(prefix);
            flatten(list, inner, out)?;
        }
        "use_list" => {
            for item in node.children() {
                if !matches!(item.kind(), "{" | "}" | ",") {
                    flatten(item, prefix, out)?;
                }
            }
        }
        "use_wildcard" => {
            let path = node
                .children()
                .first()
                .filter(|c| c.kind() != "*" && c.kind() != "::")
                .map(|c| join(prefix, c.text()))
                .or_else(|| prefix.map(str::to_string))
                .ok_or("glob import without path")?;
            out.push(Binding::star(&path, "*"));
        }
        _ => {}
    }
    Ok(())
}

/// Binding for a full path: `a::b::c` imports `c` from `a::b`; a single
/// segment imports a whole crate or module.
fn path_binding(path: &str, alias: Option<&str>) -> Binding {
    match path.rsplit_once("::") {
        Some((module, name)) => Binding::named(module, name, alias.unwrap_or(name)),
        None => Binding::aliased_module(path, alias.unwrap_or(path)),
    }
}

fn join(prefix: Option<&str>, segment: &str) -> String {
    let segment: String = segment.split_whitespace().collect();
    match prefix {
        Some(prefix) => format!("{}::{}", prefix, segment),
        None => segment,
    }
}

fn last_segment(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use crate::ingest::detect::Language;
    use crate::ingest::imports::{extract_imports, ImportRecord, ImportType};
    use crate::syntax::parse;
    use std::path::Path;

    fn imports(source: &str) -> Vec<ImportRecord> {
        let path = Path::new("src/lib.rs");
        let tree = parse(Language::Rust, path, source).unwrap();
        extract_imports(&tree, path, Language::Rust)
    }

    fn triples(records: &[ImportRecord]) -> Vec<(&str, &str, &str)> {
        records
            .iter()
            .map(|r| (r.target_file.as_str(), r.exported_name.as_str(), r.local_name.as_str()))
            .collect()
    }

    #[test]
    fn test_simple_paths() {
        let records = imports("use std::collections::HashMap;\nuse serde;\n");
        assert_eq!(
            triples(&records),
            vec![("std::collections", "HashMap", "HashMap"), ("serde", "serde", "serde")]
        );
        assert_eq!(records[0].import_type, ImportType::Named);
        assert_eq!(records[1].import_type, ImportType::Namespace);
    }

    #[test]
    fn test_use_tree() {
        let records = imports("use crate::graph::{self, Node, schema::Label as L};\n");
        assert_eq!(
            triples(&records),
            vec![
                ("crate::graph", "crate::graph", "graph"),
                ("crate::graph", "Node", "Node"),
                ("crate::graph::schema", "Label", "L"),
            ]
        );
    }

    #[test]
    fn test_glob_and_pub_use() {
        let records = imports("pub use crate::error::*;\n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].target_file, "crate::error");
        assert_eq!(records[0].exported_name, "*");
        assert_eq!(records[0].import_type, ImportType::Namespace);
    }

    #[test]
    fn test_use_inside_function() {
        let records = imports("fn f() {\n    use std::io::Write;\n}\n");
        assert_eq!(triples(&records), vec![("std::io", "Write", "Write")]);
    }
}
