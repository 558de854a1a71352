//! Import target resolution.
//!
//! Maps an import specifier to one of the ingested files, using the
//! importing file's language to decide how the specifier is spelled:
//! relative paths with extension probing for JavaScript/TypeScript, dotted
//! modules and leading-dot packages for Python, packages for Java,
//! `crate::` / `self::` / `super::` paths for Rust, and include paths for
//! C/C++. Paths are repository-relative with `/` separators.

use crate::ingest::detect::{detect_language, Language};
use crate::ingest::imports::ImportRecord;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

const ECMA_EXTENSIONS: &[&str] = &[".ts", ".tsx", ".js", ".jsx", ".mjs", ".cjs", ".mts", ".cts"];

/// Index of ingested files: path -> File node id.
#[derive(Debug, Clone, Default)]
pub struct FileIndex {
    by_path: BTreeMap<String, String>,
    by_file_name: HashMap<String, Vec<String>>,
}

impl FileIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file path and its node id.
    pub fn insert(&mut self, path: &str, node_id: &str) {
        let path = normalize(path);
        if let Some(name) = path.rsplit('/').next() {
            self.by_file_name
                .entry(name.to_string())
                .or_default()
                .push(path.clone());
        }
        self.by_path.insert(path, node_id.to_string());
    }

    /// Number of indexed files.
    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    /// Node id of an indexed path.
    pub fn id_for_path(&self, path: &Path) -> Option<&str> {
        self.by_path
            .get(&normalize(&path.to_string_lossy()))
            .map(String::as_str)
    }

    /// Resolve an import record to the node id of the file it names.
    pub fn resolve(&self, record: &ImportRecord) -> Option<&str> {
        self.resolve_path(record)
            .and_then(|path| self.by_path.get(&path))
            .map(String::as_str)
    }

    /// Resolve an import record to the indexed path it names.
    pub fn resolve_path(&self, record: &ImportRecord) -> Option<String> {
        let importer = normalize(&record.importing_file.to_string_lossy());
        let dir = parent(&importer);
        let specifier = record.target_file.as_str();

        match detect_language(&record.importing_file)? {
            Language::JavaScript | Language::TypeScript => self.resolve_ecma(dir, specifier),
            Language::Python => self.resolve_python(dir, specifier, &record.exported_name),
            Language::Java => self.resolve_java(specifier, &record.exported_name),
            Language::Rust => self.resolve_rust(&importer, specifier, &record.exported_name),
            Language::C | Language::Cpp => self.resolve_include(dir, specifier),
        }
    }

    fn resolve_ecma(&self, dir: &str, specifier: &str) -> Option<String> {
        if !(specifier.starts_with("./")
            || specifier.starts_with("../")
            || specifier.starts_with('/'))
        {
            return None;
        }
        let base = join(dir, specifier);
        let mut candidates = vec![base.clone()];
        candidates.extend(ECMA_EXTENSIONS.iter().map(|ext| format!("{}{}", base, ext)));
        candidates.extend(ECMA_EXTENSIONS.iter().map(|ext| format!("{}/index{}", base, ext)));
        self.first_indexed(candidates)
    }

    fn resolve_python(&self, dir: &str, specifier: &str, exported: &str) -> Option<String> {
        let dots = specifier.chars().take_while(|c| *c == '.').count();
        let rest = specifier[dots..].replace('.', "/");

        if dots > 0 {
            let mut base = dir.to_string();
            for _ in 1..dots {
                base = parent(&base).to_string();
            }
            let module = join(&base, &rest);
            let mut candidates = Vec::new();
            // `from . import helper` names a sibling module.
            if rest.is_empty() && exported != "*" {
                candidates.push(format!("{}/{}.py", module, exported));
            }
            candidates.push(format!("{}.py", module));
            candidates.push(format!("{}/__init__.py", module));
            return self.first_indexed(candidates);
        }

        let candidates = vec![format!("{}.py", rest), format!("{}/__init__.py", rest)];
        self.first_indexed(candidates.clone())
            .or_else(|| self.first_by_suffix(&candidates))
    }

    fn resolve_java(&self, specifier: &str, exported: &str) -> Option<String> {
        let package = specifier.replace('.', "/");
        let mut candidates = Vec::new();
        if exported != "*" {
            candidates.push(format!("{}/{}.java", package, exported));
        }
        // Static imports name a member of a class: the class is the package's last segment.
        candidates.push(format!("{}.java", package));
        self.first_indexed(candidates.clone())
            .or_else(|| self.first_by_suffix(&candidates))
    }

    fn resolve_rust(&self, importer: &str, specifier: &str, exported: &str) -> Option<String> {
        let mut segments: Vec<&str> = specifier.split("::").collect();
        if exported != "*" && !specifier.ends_with(exported) {
            segments.push(exported);
        }

        let module_dir = rust_module_dir(importer);
        let base = match segments.first().copied() {
            Some("crate") => {
                segments.remove(0);
                rust_crate_src(importer)?
            }
            Some("self") => {
                segments.remove(0);
                module_dir
            }
            Some("super") => {
                let mut dir = module_dir;
                while segments.first() == Some(&"super") {
                    segments.remove(0);
                    dir = parent(&dir).to_string();
                }
                dir
            }
            // External crates never live in the ingested tree.
            _ => return None,
        };

        // Longest module path first: `crate::a::b::Item` may be item `Item` in `a/b.rs`.
        for take in (1..=segments.len()).rev() {
            let module = segments[..take].join("/");
            let candidate_base = join(&base, &module);
            let candidates = vec![
                format!("{}.rs", candidate_base),
                format!("{}/mod.rs", candidate_base),
            ];
            if let Some(hit) = self.first_indexed(candidates) {
                return Some(hit);
            }
        }

        // Item defined directly in the module root.
        self.first_indexed(rust_root_files(&base))
    }

    fn resolve_include(&self, dir: &str, specifier: &str) -> Option<String> {
        let candidates = vec![join(dir, specifier), normalize(specifier)];
        self.first_indexed(candidates.clone())
            .or_else(|| self.first_by_suffix(&candidates[1..]))
    }

    fn first_indexed(&self, candidates: Vec<String>) -> Option<String> {
        candidates
            .into_iter()
            .map(|c| normalize(&c))
            .find(|c| self.by_path.contains_key(c))
    }

    /// Unique indexed path ending in one of the candidates (source roots such as `src/`).
    fn first_by_suffix(&self, candidates: &[String]) -> Option<String> {
        for candidate in candidates {
            let candidate = normalize(candidate);
            let name = candidate.rsplit('/').next().unwrap_or(&candidate);
            let Some(paths) = self.by_file_name.get(name) else {
                continue;
            };
            let suffix = format!("/{}", candidate);
            let hits: Vec<&String> = paths.iter().filter(|p| p.ends_with(&suffix)).collect();
            if let [only] = hits.as_slice() {
                return Some((*only).clone());
            }
        }
        None
    }
}

/// Directory of a `/`-separated path ("" for top-level files).
fn parent(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(dir, _)| dir)
}

fn join(dir: &str, rel: &str) -> String {
    if dir.is_empty() || rel.starts_with('/') {
        normalize(rel)
    } else {
        normalize(&format!("{}/{}", dir, rel))
    }
}

/// Collapse `.` / `..` segments and unify separators.
pub(crate) fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// Directory that holds the children of the module defined by `file`.
fn rust_module_dir(file: &str) -> String {
    let dir = parent(file);
    let stem = file
        .rsplit('/')
        .next()
        .and_then(|name| name.strip_suffix(".rs"))
        .unwrap_or("");
    match stem {
        "mod" | "lib" | "main" => dir.to_string(),
        _ => join(dir, stem),
    }
}

/// The nearest enclosing `src` directory.
fn rust_crate_src(file: &str) -> Option<String> {
    let mut dir = parent(file);
    loop {
        if dir == "src" || dir.ends_with("/src") {
            return Some(dir.to_string());
        }
        if dir.is_empty() {
            return None;
        }
        dir = parent(dir);
    }
}

/// Files that may define the module whose children live in `dir`.
fn rust_root_files(dir: &str) -> Vec<String> {
    if dir == "src" || dir.ends_with("/src") {
        return vec![format!("{}/lib.rs", dir), format!("{}/main.rs", dir)];
    }
    vec![format!("{}.rs", dir), format!("{}/mod.rs", dir)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::imports::ImportType;
    use std::path::PathBuf;

    fn index(paths: &[&str]) -> FileIndex {
        let mut index = FileIndex::new();
        for path in paths {
            index.insert(path, &format!("id:{}", path));
        }
        index
    }

    fn record(file: &str, target: &str, exported: &str) -> ImportRecord {
        ImportRecord {
            importing_file: PathBuf::from(file),
            local_name: exported.to_string(),
            target_file: target.to_string(),
            exported_name: exported.to_string(),
            import_type: ImportType::Named,
        }
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("./a/../b/c.ts"), "b/c.ts");
        assert_eq!(normalize("src\\lib.rs"), "src/lib.rs");
    }

    #[test]
    fn test_ecma_extension_and_index_probing() {
        let idx = index(&["web/app.ts", "web/ui/button.tsx", "web/lib/index.js"]);
        let hit = |t: &str| idx.resolve_path(&record("web/app.ts", t, "x"));
        assert_eq!(hit("./ui/button").as_deref(), Some("web/ui/button.tsx"));
        assert_eq!(hit("./lib").as_deref(), Some("web/lib/index.js"));
        assert_eq!(hit("react"), None);
        assert_eq!(hit("./missing"), None);
    }

    #[test]
    fn test_python_absolute_relative_and_source_root() {
        let idx = index(&[
            "src/pkg/__init__.py",
            "src/pkg/core.py",
            "src/pkg/sub/helper.py",
            "src/pkg/sub/leaf.py",
        ]);
        let r = |file: &str, t: &str, e: &str| idx.resolve_path(&record(file, t, e));
        let helper = Some("src/pkg/sub/helper.py");
        let core = Some("src/pkg/core.py");
        assert_eq!(r("src/pkg/core.py", "pkg.sub.helper", "f").as_deref(), helper);
        assert_eq!(r("src/pkg/sub/leaf.py", ".helper", "f").as_deref(), helper);
        assert_eq!(r("src/pkg/sub/leaf.py", "..core", "f").as_deref(), core);
        assert_eq!(r("src/pkg/sub/leaf.py", "..", "core").as_deref(), core);
        assert_eq!(
            r("src/pkg/sub/leaf.py", "..", "missing").as_deref(),
            Some("src/pkg/__init__.py")
        );
        assert_eq!(r("src/pkg/core.py", "os", "os"), None);
    }

    #[test]
    fn test_java_class_and_static_member() {
        let idx = index(&["src/main/java/com/acme/Util.java"]);
        let r =
            |t: &str, e: &str| idx.resolve_path(&record("src/main/java/com/acme/App.java", t, e));
        let util = Some("src/main/java/com/acme/Util.java");
        assert_eq!(r("com.acme", "Util").as_deref(), util);
        assert_eq!(r("com.acme.Util", "helper").as_deref(), util);
        assert_eq!(r("java.util", "List"), None);
    }

    #[test]
    fn test_rust_paths() {
        let idx = index(&["src/lib.rs", "src/graph/mod.rs", "src/graph/schema.rs", "src/ids.rs"]);
        let r = |file: &str, t: &str, e: &str| idx.resolve_path(&record(file, t, e));
        let schema = Some("src/graph/schema.rs");
        let graph = Some("src/graph/mod.rs");
        assert_eq!(r("src/lib.rs", "crate::graph::schema", "Label").as_deref(), schema);
        assert_eq!(r("src/ids.rs", "crate::graph", "Node").as_deref(), graph);
        assert_eq!(r("src/graph/schema.rs", "super", "Node").as_deref(), graph);
        assert_eq!(r("src/graph/mod.rs", "self::schema", "LABEL").as_deref(), schema);
        assert_eq!(r("src/ids.rs", "crate", "Error").as_deref(), Some("src/lib.rs"));
        assert_eq!(r("src/lib.rs", "std::collections", "HashMap"), None);
    }

    #[test]
    fn test_c_includes() {
        let idx = index(&["src/main.c", "src/util.h", "include/lib/api.h"]);
        let r = |t: &str| idx.resolve_path(&record("src/main.c", t, t));
        assert_eq!(r("util.h").as_deref(), Some("src/util.h"));
        assert_eq!(r("lib/api.h").as_deref(), Some("include/lib/api.h"));
        assert_eq!(r("stdio.h"), None);
    }

    #[test]
    fn test_resolve_returns_node_id() {
        let idx = index(&["a/b.py"]);
        assert_eq!(idx.resolve(&record("a/c.py", "a.b", "x")), Some("id:a/b.py"));
        assert_eq!(idx.id_for_path(Path::new("./a/b.py")), Some("id:a/b.py"));
    }
}
