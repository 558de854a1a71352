//! Java import rule.
//!
//! `import a.b.C;` binds `C` from package `a.b`; `import a.b.*;` binds the
//! whole package; `import static a.B.m;` binds member `m` of class `a.B`.

use super::{Binding, Match};
use crate::syntax::SyntaxNode;

pub(super) fn match_node(node: &SyntaxNode) -> Match {
    if node.kind() != "import_declaration" {
        return Match::Unrelated;
    }

    let Some(path) = node
        .children()
        .iter()
        .find(|c| c.kind() == "scoped_identifier" || c.kind() == "identifier")
    else {
        return Match::Malformed("import_declaration without name");
    };
    let path: String = path.text().split_whitespace().collect();

    if node.has_child("asterisk") {
        return Match::Bindings(vec![Binding::star(&path, "*")]);
    }

    match path.rsplit_once('.') {
        Some((package, name)) => Match::Bindings(vec![Binding::named(package, name, name)]),
        None => Match::Bindings(vec![Binding::module(&path)]),
    }
}

#[cfg(test)]
mod tests {
    use crate::ingest::detect::Language;
    use crate::ingest::imports::{extract_imports, ImportRecord, ImportType};
    use crate::syntax::parse;
    use std::path::Path;

    fn imports(source: &str) -> Vec<ImportRecord> {
        let path = Path::new("src/Main.java");
        let tree = parse(Language::Java, path, source).unwrap();
        extract_imports(&tree, path, Language::Java)
    }

    #[test]
    fn test_class_import() {
        let records = imports("import java.util.List;\nclass Main {}\n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].target_file, "java.util");
        assert_eq!(records[0].exported_name, "List");
        assert_eq!(records[0].import_type, ImportType::Named);
    }

    #[test]
    fn test_wildcard_and_static() {
        let source = "import java.util.*;\nimport static org.junit.Assert.assertEquals;\n";
        let records = imports(source);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].target_file, "java.util");
        assert_eq!(records[0].exported_name, "*");
        assert_eq!(records[0].import_type, ImportType::Namespace);
        assert_eq!(records[1].target_file, "org.junit.Assert");
        assert_eq!(records[1].exported_name, "assertEquals");
    }
}
