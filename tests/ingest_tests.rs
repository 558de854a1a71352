//! End-to-end ingestion into a SQLite store.
//!
//! Builds a small mixed-language repository on disk, ingests it, commits
//! it, and checks the persisted graph.

use repograph::commit::{CancelFlag, Strategy};
use repograph::config::IngestConfig;
use repograph::graph::schema::{
    LABEL_CLASS, LABEL_EXTERNAL, LABEL_FILE, LABEL_FOLDER, LABEL_FUNCTION, LABEL_METHOD,
    LABEL_PROJECT, REL_CALLS, REL_CONTAINS, REL_HAS_METHOD, REL_IMPORTS,
};
use repograph::graph::PropertyValue;
use repograph::ids::generate_deterministic_id;
use repograph::ingest::Ingestor;
use repograph::store::{declare_graph_schema, SqliteStore};
use std::path::Path;
use tempfile::TempDir;

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn sample_repo() -> TempDir {
        let dir = TempDir::new().expect("Failed to create temp repo");
        let root = dir.path();
        write(root, "pkg/__init__.py", b"");
        write(root, "pkg/util.py", b"def helper():\n    return 1\n");
        write(
            root,
            "pkg/main.py",
            b"import os\nfrom .util import helper\n\n\n\
              class App:\n    def run(self):\n        return helper()\n",
        );
        write(root, "web/lib.ts", b"export const x = 1;\n");
        write(
            root,
            "web/index.ts",
            b"import { x } from './lib';\n\nfunction start() {\n    return x;\n}\n",
        );
        write(root, "README.md", b"# sample\n");
        write(root, ".gitignore", b"build/\n");
        write(root, "build/generated.py", b"import sys\n");
        dir
    }

    fn config(artifacts: &Path, bulk: bool) -> IngestConfig {
        IngestConfig {
            bulk_load: bulk,
            artifact_dir: artifacts.to_path_buf(),
            ..IngestConfig::default()
        }
    }

    #[test]
    fn test_model_shape() {
        let repo = sample_repo();
        let result = Ingestor::new(IngestConfig::default())
            .ingest_repository(repo.path())
            .unwrap();

        assert_eq!(result.files_indexed, 5);
        assert!(result.skipped_files.is_empty());

        let count = |label: &str| {
            result
                .model
                .nodes()
                .iter()
                .filter(|n| n.label == label)
                .count()
        };
        assert_eq!(count(LABEL_PROJECT), 1);
        assert_eq!(count(LABEL_FOLDER), 2);
        assert_eq!(count(LABEL_FILE), 5);
        assert_eq!(count(LABEL_CLASS), 1);
        assert_eq!(count(LABEL_METHOD), 1);
        assert_eq!(count(LABEL_EXTERNAL), 1);
        assert!(count(LABEL_FUNCTION) >= 2);

        let edges = |rel_type: &str| {
            result
                .model
                .relationships()
                .iter()
                .filter(|r| r.rel_type == rel_type)
                .collect::<Vec<_>>()
        };
        // Project -> pkg, web; folders -> their five files.
        assert_eq!(edges(REL_CONTAINS).len(), 7);
        assert_eq!(edges(REL_HAS_METHOD).len(), 1);

        let imports = edges(REL_IMPORTS);
        assert_eq!(imports.len(), 3);
        let resolved: Vec<_> = imports
            .iter()
            .filter(|r| r.properties["resolved"] == PropertyValue::Bool(true))
            .collect();
        assert_eq!(resolved.len(), 2);
        let util = generate_deterministic_id(LABEL_FILE, "pkg/util.py");
        assert!(resolved.iter().any(|r| r.target == util));
        let os = generate_deterministic_id(LABEL_EXTERNAL, "os");
        assert!(imports.iter().any(|r| r.target == os));

        let calls = edges(REL_CALLS);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].properties["callee_name"], "helper".into());
    }

    #[test]
    fn test_commit_to_sqlite_is_idempotent() {
        let repo = sample_repo();
        let scratch = TempDir::new().unwrap();
        let store = SqliteStore::open(&scratch.path().join("graph.db")).unwrap();
        declare_graph_schema(&store).unwrap();

        for bulk in [false, true] {
            let summary = repograph::ingest_and_commit(
                repo.path(),
                &store,
                &config(&scratch.path().join("import"), bulk),
                &CancelFlag::new(),
            )
            .unwrap();
            assert!(summary.report.is_success());

            assert_eq!(store.count_nodes(LABEL_FILE).unwrap(), 5);
            assert_eq!(store.count_nodes(LABEL_FOLDER).unwrap(), 2);
            assert_eq!(store.count_nodes(LABEL_EXTERNAL).unwrap(), 1);
            assert_eq!(store.count_edges(REL_IMPORTS).unwrap(), 3);
            assert_eq!(store.count_edges(REL_CONTAINS).unwrap(), 7);
        }

        let util = generate_deterministic_id(LABEL_FILE, "pkg/util.py");
        let props = store.get_node(LABEL_FILE, &util).unwrap().unwrap();
        assert_eq!(props["path"], "pkg/util.py".into());
        assert_eq!(props["language"], "python".into());
        assert_eq!(props["line_count"], PropertyValue::Int(2));
    }

    #[test]
    fn test_declared_store_takes_bulk_path() {
        let repo = sample_repo();
        let scratch = TempDir::new().unwrap();
        let artifacts = scratch.path().join("import");
        let store = SqliteStore::open_in_memory().unwrap();
        declare_graph_schema(&store).unwrap();

        let summary = repograph::ingest_and_commit(
            repo.path(),
            &store,
            &config(&artifacts, true),
            &CancelFlag::new(),
        )
        .unwrap();

        let report = &summary.report;
        assert!(report.is_success());
        for group in &report.groups {
            assert_eq!(group.strategy, Some(Strategy::Bulk), "{}", group.target);
        }
        assert_eq!(
            report.rows_written(),
            summary.ingest.model.node_count() + summary.ingest.model.relationship_count()
        );
        // Every staged artifact was removed.
        let left = std::fs::read_dir(&artifacts).map(|d| d.count()).unwrap_or(0);
        assert_eq!(left, 0);
    }

    #[test]
    fn test_recent_artifact_of_another_run_survives() {
        let repo = sample_repo();
        let scratch = TempDir::new().unwrap();
        let artifacts = scratch.path().join("import");
        std::fs::create_dir_all(&artifacts).unwrap();
        let other = artifacts.join("run_0000beef__nodes__File.csv");
        std::fs::write(&other, "id\nFile_x\n").unwrap();

        let store = SqliteStore::open_in_memory().unwrap();
        declare_graph_schema(&store).unwrap();
        let summary = repograph::ingest_and_commit(
            repo.path(),
            &store,
            &config(&artifacts, true),
            &CancelFlag::new(),
        )
        .unwrap();

        assert!(summary.report.is_success());
        assert!(other.exists());
    }

    #[test]
    fn test_undeclared_store_falls_back_to_rows() {
        let repo = sample_repo();
        let scratch = TempDir::new().unwrap();
        let store = SqliteStore::open_in_memory().unwrap();

        let summary = repograph::ingest_and_commit(
            repo.path(),
            &store,
            &config(&scratch.path().join("import"), true),
            &CancelFlag::new(),
        )
        .unwrap();

        assert!(summary.report.is_success());
        assert!(summary.report.groups.iter().all(|g| g.fell_back()));
        assert_eq!(store.count_nodes(LABEL_FILE).unwrap(), 5);
    }

    #[test]
    fn test_unreadable_file_is_skipped() {
        let repo = sample_repo();
        write(repo.path(), "pkg/broken.py", &[0xff, 0xfe, 0x00, 0x41]);

        let result = Ingestor::new(IngestConfig::default())
            .ingest_repository(repo.path())
            .unwrap();
        assert_eq!(result.files_indexed, 5);
        assert_eq!(result.skipped_files.len(), 1);
        assert_eq!(result.skipped_files[0].path, Path::new("pkg/broken.py"));
    }

    #[test]
    fn test_exclude_and_size_limit() {
        let repo = sample_repo();
        write(repo.path(), "pkg/big.py", &vec![b'#'; 4096]);

        let config = IngestConfig {
            exclude: vec!["web/**".to_string()],
            max_file_bytes: 1024,
            ..IngestConfig::default()
        };
        let result = Ingestor::new(config).ingest_repository(repo.path()).unwrap();
        assert_eq!(result.files_indexed, 3);
        assert_eq!(result.skipped_files.len(), 1);
        assert!(result.skipped_files[0].reason.contains("byte limit"));
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let scratch = TempDir::new().unwrap();
        let missing = scratch.path().join("nope");
        assert!(Ingestor::new(IngestConfig::default())
            .ingest_repository(&missing)
            .is_err());
    }
}
