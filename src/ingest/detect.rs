//! Language detection from file extensions.
//!
//! Table-driven: unknown extensions return None, content is never sniffed.
//! The detected [`Language`] is the tag the import extractor dispatches on.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Languages with a tree-sitter grammar wired into the parser adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Rust (.rs)
    Rust,
    /// Python (.py, .pyi)
    Python,
    /// C (.c, .h)
    C,
    /// C++ (.cpp, .hpp, .cc, .cxx, .hh)
    Cpp,
    /// Java (.java)
    Java,
    /// JavaScript (.js, .jsx, .mjs, .cjs)
    JavaScript,
    /// TypeScript (.ts, .tsx, .mts, .cts)
    TypeScript,
}

impl Language {
    /// Stable tag stored on File nodes.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::Python => "python",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Java => "java",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
        }
    }

    /// Inverse of [`Language::as_str`]; also accepts a few common aliases.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let language = match tag.to_ascii_lowercase().as_str() {
            "rust" | "rs" => Language::Rust,
            "python" | "py" => Language::Python,
            "c" => Language::C,
            "cpp" | "c++" | "cxx" => Language::Cpp,
            "java" => Language::Java,
            "javascript" | "js" => Language::JavaScript,
            "typescript" | "ts" => Language::TypeScript,
            _ => return None,
        };
        Some(language)
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detect the language of a file from its extension (case-sensitive).
///
/// # Examples
///
/// ```
/// # use repograph::ingest::detect::{detect_language, Language};
/// # use std::path::Path;
/// assert_eq!(detect_language(Path::new("main.rs")), Some(Language::Rust));
/// assert_eq!(detect_language(Path::new("app.tsx")), Some(Language::TypeScript));
/// assert_eq!(detect_language(Path::new("notes.txt")), None);
/// ```
pub fn detect_language(path: &Path) -> Option<Language> {
    let extension = path.extension()?.to_str()?;

    let language = match extension {
        "rs" => Language::Rust,
        "py" | "pyi" => Language::Python,
        "c" | "h" => Language::C,
        "cpp" | "hpp" | "cc" | "cxx" | "hh" => Language::Cpp,
        "java" => Language::Java,
        "js" | "jsx" | "mjs" | "cjs" => Language::JavaScript,
        "ts" | "tsx" | "mts" | "cts" => Language::TypeScript,
        _ => return None,
    };

    Some(language)
}

/// Whether the file should be parsed with the TSX flavour of the TypeScript grammar.
pub fn is_tsx(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("tsx")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_python_stub() {
        assert_eq!(detect_language(Path::new("types.pyi")), Some(Language::Python));
    }

    #[test]
    fn test_detect_jsx_as_javascript() {
        assert_eq!(detect_language(Path::new("App.jsx")), Some(Language::JavaScript));
    }

    #[test]
    fn test_unknown_and_missing_extension() {
        assert_eq!(detect_language(Path::new("README.md")), None);
        assert_eq!(detect_language(Path::new("Makefile")), None);
        assert_eq!(detect_language(Path::new(".gitignore")), None);
    }

    #[test]
    fn test_extension_is_case_sensitive() {
        assert_eq!(detect_language(Path::new("file.PY")), None);
    }

    #[test]
    fn test_tag_round_trip() {
        for language in [
            Language::Rust,
            Language::Python,
            Language::C,
            Language::Cpp,
            Language::Java,
            Language::JavaScript,
            Language::TypeScript,
        ] {
            assert_eq!(Language::from_tag(language.as_str()), Some(language));
        }
        assert_eq!(Language::from_tag("ts"), Some(Language::TypeScript));
        assert_eq!(Language::from_tag("cobol"), None);
    }

    #[test]
    fn test_is_tsx() {
        assert!(is_tsx(Path::new("src/App.tsx")));
        assert!(!is_tsx(Path::new("src/app.ts")));
    }
}
