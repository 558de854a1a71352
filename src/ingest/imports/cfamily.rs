//! C / C++ `#include` rule.
//!
//! Both `"local.h"` and `<system.h>` forms bind the whole header.

use super::{unquote, Binding, Match};
use crate::syntax::SyntaxNode;

pub(super) fn match_node(node: &SyntaxNode) -> Match {
    if node.kind() != "preproc_include" {
        return Match::Unrelated;
    }

    let header = node
        .children()
        .iter()
        .find(|c| matches!(c.kind(), "string_literal" | "system_lib_string"))
        .map(|c| unquote(c.text()))
        .filter(|h| !h.is_empty());

    match header {
        Some(header) => Match::Bindings(vec![Binding::module(header)]),
        None => Match::Malformed("#include without header path"),
    }
}

#[cfg(test)]
mod tests {
    use crate::ingest::detect::Language;
    use crate::ingest::imports::{extract_imports, ImportType};
    use crate::syntax::parse;
    use std::path::Path;

    #[test]
    fn test_local_and_system_includes() {
        let path = Path::new("src/main.cpp");
        let source = "#include <vector>\n#include \"util/strings.h\"\nint main() { return 0; }\n";
        let tree = parse(Language::Cpp, path, source).unwrap();
        let records = extract_imports(&tree, path, Language::Cpp);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].target_file, "vector");
        assert_eq!(records[1].target_file, "util/strings.h");
        assert_eq!(records[1].local_name, "util/strings.h");
        assert!(records.iter().all(|r| r.import_type == ImportType::Namespace));
    }

    #[test]
    fn test_include_inside_ifdef() {
        let path = Path::new("a.c");
        let source = "#ifdef DEBUG\n#include \"debug.h\"\n#endif\n";
        let tree = parse(Language::C, path, source).unwrap();
        let records = extract_imports(&tree, path, Language::C);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].target_file, "debug.h");
    }
}
