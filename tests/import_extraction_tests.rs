//! Import extraction properties across the public API.
//!
//! - a statement yields one record per bound name
//! - a malformed statement never hides the statements after it

use repograph::ingest::detect::Language;
use repograph::ingest::imports::{extract_imports, extract_imports_for_tag, ImportType};
use repograph::syntax::{parse, SyntaxNode};
use std::path::Path;

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(kind: &'static str, text: &str) -> SyntaxNode {
        SyntaxNode::new(kind, text, vec![])
    }

    #[test]
    fn test_module_and_named_imports() {
        let path = Path::new("app/main.py");
        let source = "import os\nfrom datetime import datetime, timezone\n";
        let tree = parse(Language::Python, path, source).expect("Failed to parse");

        let records = extract_imports(&tree, path, Language::Python);

        let os: Vec<_> = records.iter().filter(|r| r.target_file == "os").collect();
        assert_eq!(os.len(), 1);
        assert_eq!(os[0].import_type, ImportType::Namespace);
        assert_eq!(os[0].local_name, "os");

        let named: Vec<_> = records
            .iter()
            .filter(|r| r.target_file == "datetime")
            .collect();
        assert_eq!(named.len(), 2);
        assert!(named.iter().all(|r| r.import_type == ImportType::Named));
        let names: Vec<&str> = named.iter().map(|r| r.exported_name.as_str()).collect();
        assert_eq!(names, vec!["datetime", "timezone"]);

        assert!(records.iter().all(|r| r.importing_file == path));
    }

    #[test]
    fn test_malformed_statement_does_not_stop_extraction() {
        // `from <missing> import` followed by a valid `import sys`.
        let broken = SyntaxNode::new(
            "import_from_statement",
            "from import",
            vec![leaf("from", "from"), leaf("import", "import")],
        );
        let valid = SyntaxNode::new(
            "import_statement",
            "import sys",
            vec![leaf("import", "import"), leaf("dotted_name", "sys")],
        );
        let tree = SyntaxNode::new("module", "from import\nimport sys\n", vec![broken, valid]);

        let records = extract_imports(&tree, Path::new("a.py"), Language::Python);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].target_file, "sys");
        assert_eq!(records[0].import_type, ImportType::Namespace);
    }

    #[test]
    fn test_malformed_alias_does_not_stop_siblings() {
        // `import numpy as` with the alias missing, then `from json import loads`.
        let broken = SyntaxNode::new(
            "import_statement",
            "import numpy as",
            vec![
                leaf("import", "import"),
                SyntaxNode::new(
                    "aliased_import",
                    "numpy as",
                    vec![leaf("dotted_name", "numpy"), leaf("as", "as")],
                ),
            ],
        );
        let valid = SyntaxNode::new(
            "import_from_statement",
            "from json import loads",
            vec![
                leaf("from", "from"),
                leaf("dotted_name", "json"),
                leaf("import", "import"),
                leaf("dotted_name", "loads"),
            ],
        );
        let body = SyntaxNode::new("block", "", vec![valid]);
        let tree = SyntaxNode::new("module", "", vec![broken, body]);

        let records = extract_imports(&tree, Path::new("a.py"), Language::Python);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].target_file, "json");
        assert_eq!(records[0].exported_name, "loads");
    }

    #[test]
    fn test_records_follow_source_order_across_languages() {
        let cases: [(&str, Language, &str, Vec<&str>); 4] = [
            (
                "web/app.ts",
                Language::TypeScript,
                "import React from 'react';\nimport { a } from './a';\n",
                vec!["react", "./a"],
            ),
            (
                "src/Main.java",
                Language::Java,
                "import java.util.List;\nimport java.io.File;\nclass Main {}\n",
                vec!["java.util", "java.io"],
            ),
            (
                "src/lib.rs",
                Language::Rust,
                "use std::fmt;\nuse crate::graph::Node;\n",
                vec!["std", "crate::graph"],
            ),
            (
                "src/main.c",
                Language::C,
                "#include <stdio.h>\n#include \"util.h\"\n",
                vec!["stdio.h", "util.h"],
            ),
        ];

        for (file, language, source, expected) in cases {
            let path = Path::new(file);
            let tree = parse(language, path, source).expect("Failed to parse");
            let targets: Vec<String> = extract_imports(&tree, path, language)
                .into_iter()
                .map(|r| r.target_file)
                .collect();
            assert_eq!(targets, expected, "{}", file);
        }
    }

    #[test]
    fn test_dispatch_by_tag() {
        let path = Path::new("a.py");
        let tree = parse(Language::Python, path, "import os\n").expect("Failed to parse");
        assert_eq!(extract_imports_for_tag(&tree, path, "python").len(), 1);
        assert!(extract_imports_for_tag(&tree, path, "fortran").is_empty());
    }
}
