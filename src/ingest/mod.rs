//! Filesystem -> syntax tree -> staging graph.
//!
//! The repository is walked once (gitignore-aware), every supported file is
//! parsed and extracted on the rayon pool, and the per-file results are
//! merged into one [`GraphModel`] in path order. Merging is sequential, so
//! the same tree always produces the same model, ids included.

pub mod detect;
pub mod imports;
pub mod symbols;

use crate::config::IngestConfig;
use crate::error::{Error, Result};
use crate::graph::resolve::FileIndex;
use crate::graph::schema::{
    LABEL_FILE, LABEL_FOLDER, LABEL_PROJECT, REL_CALLS, REL_CONTAINS, REL_DEFINES, REL_HAS_METHOD,
};
use crate::graph::{GraphModel, Node, Relationship};
use crate::ids::generate_deterministic_id;
use crate::syntax;
use detect::{detect_language, Language};
use ignore::WalkBuilder;
use imports::{extract_imports, ImportRecord};
use rayon::prelude::*;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use symbols::{extract_symbols, FileSymbols, SymbolKind};

/// A file the run could not ingest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    /// Repository-relative path.
    pub path: PathBuf,
    /// Why it was skipped.
    pub reason: String,
}

/// Everything one file contributes.
#[derive(Debug, Clone)]
pub struct FileExtraction {
    /// Repository-relative path with `/` separators.
    pub path: String,
    /// Detected language.
    pub language: Language,
    /// SHA-256 of the content, lowercase hex.
    pub content_hash: String,
    /// Number of lines.
    pub line_count: usize,
    /// Size in bytes.
    pub size: usize,
    /// Import bindings in source order.
    pub imports: Vec<ImportRecord>,
    /// Definitions and call sites.
    pub symbols: FileSymbols,
}

/// Output of one ingestion pass.
#[derive(Debug)]
pub struct IngestResult {
    /// Staged graph.
    pub model: GraphModel,
    /// Id of the Project node.
    pub project_id: String,
    /// Files that made it into the model.
    pub files_indexed: usize,
    /// Files left out, with reasons.
    pub skipped_files: Vec<SkippedFile>,
    /// Every import binding found, before lowering.
    pub imports: Vec<ImportRecord>,
}

/// Builds a staging graph from a repository on disk.
#[derive(Debug, Clone)]
pub struct Ingestor {
    config: IngestConfig,
}

impl Ingestor {
    /// Ingestor for one run.
    pub fn new(config: IngestConfig) -> Self {
        Self { config }
    }

    /// Settings in effect.
    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Walk, extract and assemble the model for the repository at `root`.
    ///
    /// A file that cannot be read or parsed is reported in
    /// [`IngestResult::skipped_files`]; it never fails the run.
    pub fn ingest_repository(&self, root: &Path) -> Result<IngestResult> {
        if !root.is_dir() {
            return Err(Error::Other(format!(
                "repository root {} is not a directory",
                root.display()
            )));
        }

        let (candidates, mut skipped_files) = self.discover(root)?;
        log::info!("ingesting {} files from {}", candidates.len(), root.display());

        let extracted: Vec<(String, Result<FileExtraction>)> = candidates
            .par_iter()
            .map(|(rel, language)| (rel.clone(), self.extract_file(root, rel, *language)))
            .collect();

        let mut files = Vec::with_capacity(extracted.len());
        for (rel, result) in extracted {
            match result {
                Ok(file) => files.push(file),
                Err(e) => {
                    log::warn!("skipping {}: {}", rel, e);
                    skipped_files.push(SkippedFile {
                        path: PathBuf::from(rel),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let result = assemble(root, files, skipped_files);
        log::info!(
            "staged {} nodes and {} relationships ({} files, {} skipped)",
            result.model.node_count(),
            result.model.relationship_count(),
            result.files_indexed,
            result.skipped_files.len()
        );
        Ok(result)
    }

    /// Supported files under `root`, sorted by relative path.
    fn discover(&self, root: &Path) -> Result<(Vec<(String, Language)>, Vec<SkippedFile>)> {
        let excludes = self
            .config
            .exclude
            .iter()
            .map(|p| {
                glob::Pattern::new(p).map_err(|e| Error::Config {
                    message: format!("bad exclude pattern '{}': {}", p, e),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let walker = WalkBuilder::new(root)
            .hidden(!self.config.include_hidden)
            .git_ignore(true)
            .require_git(false)
            .build();

        let mut found = Vec::new();
        let mut skipped = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("walk error under {}: {}", root.display(), e);
                    continue;
                }
            };
            let path = entry.path();
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let Some(language) = detect_language(path) else {
                continue;
            };
            let rel = relative(root, path);
            if excludes.iter().any(|p| p.matches(&rel)) {
                log::debug!("excluded {}", rel);
                continue;
            }

            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            if size > self.config.max_file_bytes {
                skipped.push(SkippedFile {
                    path: PathBuf::from(&rel),
                    reason: format!(
                        "{} bytes exceeds the {} byte limit",
                        size, self.config.max_file_bytes
                    ),
                });
                continue;
            }
            found.push((rel, language));
        }

        found.sort();
        Ok((found, skipped))
    }

    /// Read, parse and extract one file.
    pub fn extract_file(
        &self,
        root: &Path,
        rel: &str,
        language: Language,
    ) -> Result<FileExtraction> {
        let full = root.join(rel);
        let bytes = std::fs::read(&full).map_err(|source| Error::Io {
            path: full.clone(),
            source,
        })?;
        let source = std::str::from_utf8(&bytes)?;

        let rel_path = Path::new(rel);
        let tree = syntax::parse(language, rel_path, source)?;

        Ok(FileExtraction {
            path: rel.to_string(),
            language,
            content_hash: format!("{:x}", Sha256::digest(&bytes)),
            line_count: source.lines().count(),
            size: bytes.len(),
            imports: extract_imports(&tree, rel_path, language),
            symbols: extract_symbols(&tree, rel_path, language),
        })
    }
}

/// Repository-relative path with `/` separators.
fn relative(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn project_name(root: &Path) -> String {
    root.canonicalize()
        .ok()
        .as_deref()
        .and_then(Path::file_name)
        .or_else(|| root.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string())
}

/// Node id of a definition: stable while the file, name and position are.
fn symbol_id(
    kind: SymbolKind,
    file: &str,
    parent: Option<&str>,
    name: &str,
    line: usize,
) -> String {
    let qualified = match parent {
        Some(parent) => format!("{}.{}", parent, name),
        None => name.to_string(),
    };
    generate_deterministic_id(kind.label(), &format!("{}:{}:{}", file, qualified, line))
}

struct DefinitionRef {
    id: String,
    kind: SymbolKind,
    file: usize,
}

/// Merge per-file extractions, in path order, into one model.
fn assemble(
    root: &Path,
    files: Vec<FileExtraction>,
    skipped_files: Vec<SkippedFile>,
) -> IngestResult {
    let mut model = GraphModel::new();
    let name = project_name(root);
    let project_id = generate_deterministic_id(LABEL_PROJECT, &name);
    model.add_node(
        Node::new(project_id.clone(), LABEL_PROJECT)
            .with("name", name.as_str())
            .with("root", root.display().to_string()),
    );

    // Folders.
    let folders: BTreeSet<String> = files
        .iter()
        .flat_map(|f| ancestors(&f.path))
        .collect();
    let folder_id = |path: &str| generate_deterministic_id(LABEL_FOLDER, path);
    let container_id = |path: &str| match parent_dir(path) {
        Some(dir) => folder_id(dir),
        None => project_id.clone(),
    };
    for folder in &folders {
        let id = folder_id(folder);
        model.add_node(
            Node::new(id.clone(), LABEL_FOLDER)
                .with("name", file_name(folder))
                .with("path", folder.as_str()),
        );
        model.add_relationship(Relationship::between(&container_id(folder), &id, REL_CONTAINS));
    }

    // Files.
    let mut index = FileIndex::new();
    let mut file_ids = Vec::with_capacity(files.len());
    for file in &files {
        let id = generate_deterministic_id(LABEL_FILE, &file.path);
        model.add_node(
            Node::new(id.clone(), LABEL_FILE)
                .with("name", file_name(&file.path))
                .with("path", file.path.as_str())
                .with("language", file.language.as_str())
                .with("content_hash", file.content_hash.as_str())
                .with("line_count", file.line_count)
                .with("size", file.size),
        );
        model.add_relationship(Relationship::between(&container_id(&file.path), &id, REL_CONTAINS));
        index.insert(&file.path, &id);
        file_ids.push(id);
    }

    // Definitions.
    let mut per_file: Vec<Vec<String>> = Vec::with_capacity(files.len());
    let mut by_name: HashMap<&str, Vec<DefinitionRef>> = HashMap::new();
    for (fi, file) in files.iter().enumerate() {
        let mut ids = Vec::with_capacity(file.symbols.definitions.len());
        let mut types: HashMap<&str, String> = HashMap::new();
        for def in &file.symbols.definitions {
            let id = symbol_id(
                def.kind,
                &file.path,
                def.parent.as_deref(),
                &def.name,
                def.start_line,
            );
            model.add_node(
                Node::new(id.clone(), def.kind.label())
                    .with("name", def.name.as_str())
                    .with("file_path", file.path.as_str())
                    .with("start_line", def.start_line)
                    .with("end_line", def.end_line)
                    .with("language", file.language.as_str())
                    .with("parent", def.parent.clone()),
            );
            model.add_relationship(Relationship::between(&file_ids[fi], &id, REL_DEFINES));

            if matches!(def.kind, SymbolKind::Class | SymbolKind::Interface) {
                types.entry(def.name.as_str()).or_insert_with(|| id.clone());
            }
            if def.kind == SymbolKind::Method {
                if let Some(owner) = def.parent.as_deref().and_then(|p| types.get(p)) {
                    model.add_relationship(Relationship::between(owner, &id, REL_HAS_METHOD));
                }
            }
            by_name.entry(def.name.as_str()).or_default().push(DefinitionRef {
                id: id.clone(),
                kind: def.kind,
                file: fi,
            });
            ids.push(id);
        }
        per_file.push(ids);
    }

    // Calls.
    for (fi, file) in files.iter().enumerate() {
        for call in &file.symbols.calls {
            let Some(callee) = resolve_call(&by_name, &call.callee, fi) else {
                continue;
            };
            let source = match call.caller {
                Some(i) => &per_file[fi][i],
                None => &file_ids[fi],
            };
            model.add_relationship(
                Relationship::keyed(source, callee, REL_CALLS, &call.line.to_string())
                    .with("line", call.line)
                    .with("callee_name", call.callee.as_str()),
            );
        }
    }

    // Imports.
    let imports: Vec<ImportRecord> = files.iter().flat_map(|f| f.imports.iter().cloned()).collect();
    model.add_imports(&imports, &index);

    IngestResult {
        model,
        project_id,
        files_indexed: files.len(),
        skipped_files,
        imports,
    }
}

/// Callable definition named `name`: the only one in the calling file, else
/// the only one in the repository.
fn resolve_call<'a>(
    by_name: &'a HashMap<&str, Vec<DefinitionRef>>,
    name: &str,
    file: usize,
) -> Option<&'a str> {
    let callable: Vec<&'a DefinitionRef> = by_name
        .get(name)?
        .iter()
        .filter(|d| matches!(d.kind, SymbolKind::Function | SymbolKind::Method))
        .collect();
    let local: Vec<&'a DefinitionRef> =
        callable.iter().copied().filter(|d| d.file == file).collect();

    let pick = match (local.as_slice(), callable.as_slice()) {
        ([only], _) => *only,
        ([], [only]) => *only,
        _ => return None,
    };
    Some(pick.id.as_str())
}

/// Every directory above `path`, outermost first.
fn ancestors(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = path;
    while let Some(dir) = parent_dir(current) {
        out.push(dir.to_string());
        current = dir;
    }
    out.reverse();
    out
}

fn parent_dir(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(dir, _)| dir)
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
