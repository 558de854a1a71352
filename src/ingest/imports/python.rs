//! Python import rule.
//!
//! Handles `import a.b [as c]`, `from m import a [as b], ...`,
//! `from . import x`, `from m import *`, and `from __future__ import ...`.

use super::{Binding, Match};
use crate::syntax::SyntaxNode;

pub(super) fn match_node(node: &SyntaxNode) -> Match {
    match node.kind() {
        "import_statement" => import_statement(node),
        "import_from_statement" | "future_import_statement" => import_from_statement(node),
        _ => Match::Unrelated,
    }
}

/// `import os`, `import os, sys`, `import numpy as np`.
fn import_statement(node: &SyntaxNode) -> Match {
    let mut bindings = Vec::new();

    for child in node.children() {
        match child.kind() {
            "dotted_name" => bindings.push(Binding::module(child.text())),
            "aliased_import" => match aliased(child) {
                Some((module, alias)) => bindings.push(Binding::aliased_module(module, alias)),
                None => return Match::Malformed("aliased_import without name or alias"),
            },
            _ => {}
        }
    }

    if bindings.is_empty() {
        return Match::Malformed("import_statement without module name");
    }
    Match::Bindings(bindings)
}

/// `from m import a, b as c` and the relative / wildcard variants.
fn import_from_statement(node: &SyntaxNode) -> Match {
    let mut module: Option<&str> = None;
    let mut after_import = false;
    let mut names: Vec<(&str, &str)> = Vec::new();
    let mut wildcard = false;

    for child in node.children() {
        match child.kind() {
            "import" => after_import = true,
            "__future__" if !after_import => module = Some("__future__"),
            "dotted_name" | "relative_import" if !after_import => module = Some(child.text()),
            "dotted_name" | "identifier" if after_import => {
                names.push((child.text(), child.text()))
            }
            "aliased_import" if after_import => match aliased(child) {
                Some(pair) => names.push(pair),
                None => return Match::Malformed("aliased_import without name or alias"),
            },
            "wildcard_import" => wildcard = true,
            _ => {}
        }
    }

    let Some(module) = module else {
        return Match::Malformed("import_from_statement without module");
    };

    if wildcard {
        return Match::Bindings(vec![Binding::star(module, "*")]);
    }
    if names.is_empty() {
        return Match::Malformed("import_from_statement without imported names");
    }

    Match::Bindings(
        names
            .into_iter()
            .map(|(exported, local)| Binding::named(module, exported, local))
            .collect(),
    )
}

/// `name as alias` -> (name, alias).
fn aliased(node: &SyntaxNode) -> Option<(&str, &str)> {
    let children = node.children();
    let name = children.first().filter(|c| c.kind() != "as")?;
    let alias = children.last().filter(|c| c.kind() == "identifier" && children.len() >= 3)?;
    Some((name.text(), alias.text()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::imports::{extract_imports, ImportType};
    use crate::ingest::detect::Language;
    use crate::syntax::parse;
    use std::path::Path;

    fn imports(source: &str) -> Vec<crate::ingest::imports::ImportRecord> {
        let path = Path::new("pkg/mod.py");
        let tree = parse(Language::Python, path, source).unwrap();
        extract_imports(&tree, path, Language::Python)
    }

    #[test]
    fn test_import_and_from_import() {
        let records = imports("import os\nfrom datetime import datetime, timezone\n");
        assert_eq!(records.len(), 3);

        assert_eq!(records[0].import_type, ImportType::Namespace);
        assert_eq!(records[0].local_name, "os");
        assert_eq!(records[0].exported_name, "os");
        assert_eq!(records[0].target_file, "os");

        for (record, name) in records[1..].iter().zip(["datetime", "timezone"]) {
            assert_eq!(record.import_type, ImportType::Named);
            assert_eq!(record.target_file, "datetime");
            assert_eq!(record.exported_name, name);
            assert_eq!(record.local_name, name);
        }
    }

    #[test]
    fn test_aliased_module_and_name() {
        let records = imports("import numpy as np\nfrom a.b import c as d\n");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].local_name, "np");
        assert_eq!(records[0].exported_name, "numpy");
        assert_eq!(records[0].import_type, ImportType::Namespace);
        assert_eq!(records[1].target_file, "a.b");
        assert_eq!(records[1].exported_name, "c");
        assert_eq!(records[1].local_name, "d");
    }

    #[test]
    fn test_relative_and_wildcard() {
        let records = imports("from . import helper\nfrom ..util import *\n");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].target_file, ".");
        assert_eq!(records[0].exported_name, "helper");
        assert_eq!(records[1].target_file, "..util");
        assert_eq!(records[1].exported_name, "*");
        assert_eq!(records[1].import_type, ImportType::Namespace);
    }

    #[test]
    fn test_nested_conditional_import_is_found() {
        let source = "def load():\n    if True:\n        import json\n    return json\n";
        let records = imports(source);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].target_file, "json");
    }

    #[test]
    fn test_parenthesized_names() {
        let records = imports("from typing import (\n    Any,\n    Optional,\n)\n");
        let names: Vec<&str> = records.iter().map(|r| r.exported_name.as_str()).collect();
        assert_eq!(names, vec!["Any", "Optional"]);
    }

    #[test]
    fn test_future_import() {
        let records = imports("from __future__ import annotations\n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].target_file, "__future__");
        assert_eq!(records[0].exported_name, "annotations");
    }
}
