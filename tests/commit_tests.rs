//! Commit engine properties against the in-memory store.
//!
//! - bulk failure falls back without losing rows
//! - recommitting deterministic ids never duplicates
//! - empty groups never stage an artifact
//! - timeouts and cancellation are reported per group

use repograph::commit::{
    CancelFlag, CommitConfig, CommitEngine, CommitPhase, FailureKind, GroupTarget, Strategy,
};
use repograph::graph::schema::{node_columns, LABEL_FILE};
use repograph::graph::{GraphModel, Node, Relationship};
use repograph::ids::generate_deterministic_id;
use repograph::store::memory::StoreCalls;
use repograph::store::{declare_graph_schema, GraphStore, MemoryStore, StoreFaults, TargetKind};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

#[cfg(test)]
mod tests {
    use super::*;

    fn file_node(path: &str) -> Node {
        Node::new(generate_deterministic_id(LABEL_FILE, path), LABEL_FILE)
            .with("name", path.rsplit('/').next().unwrap())
            .with("path", path)
            .with("line_count", 10usize)
    }

    fn model(files: usize) -> GraphModel {
        let mut model = GraphModel::new();
        for i in 0..files {
            model.add_node(file_node(&format!("src/f{}.py", i)));
        }
        for i in 1..files {
            let source = generate_deterministic_id(LABEL_FILE, "src/f0.py");
            let target = generate_deterministic_id(LABEL_FILE, &format!("src/f{}.py", i));
            model.add_relationship(Relationship::between(&source, &target, "IMPORTS"));
        }
        model
    }

    fn config(dir: &Path, bulk: bool) -> CommitConfig {
        CommitConfig {
            bulk_load: bulk,
            batch_size: 4,
            artifact_dir: dir.to_path_buf(),
            ..CommitConfig::default()
        }
    }

    fn declared(faults: StoreFaults) -> MemoryStore {
        let store = MemoryStore::with_faults(faults);
        declare_graph_schema(&store).unwrap();
        store
    }

    #[test]
    fn test_bulk_failure_falls_back_without_loss() {
        let dir = tempfile::tempdir().unwrap();
        let store = declared(StoreFaults {
            fail_bulk_load: true,
            ..StoreFaults::default()
        });
        let engine = CommitEngine::new(&store, config(dir.path(), true));
        let model = model(10);

        let report = engine.commit(&model, &CancelFlag::new());

        assert!(report.is_success());
        let files = report.group(&GroupTarget::nodes(LABEL_FILE)).unwrap();
        assert!(files.fell_back());
        assert_eq!(files.strategy, Some(Strategy::RowWise));
        assert_eq!(files.bulk_error.as_ref().unwrap().kind, FailureKind::BulkLoad);
        assert_eq!(
            files.history,
            vec![
                CommitPhase::Staged,
                CommitPhase::Committing(Strategy::Bulk),
                CommitPhase::FailedBulk,
                CommitPhase::Committing(Strategy::RowWise),
                CommitPhase::Committed,
            ]
        );

        // Every member went through upsert exactly once; 10 files + 9 edges.
        assert_eq!(StoreCalls::get(&store.calls().upserted_records), 19);
        assert_eq!(store.count(TargetKind::Nodes, LABEL_FILE), 10);
        assert_eq!(store.count(TargetKind::Edges, "IMPORTS"), 9);
        for node in model.nodes() {
            assert!(store.get(TargetKind::Nodes, LABEL_FILE, &node.id).is_some());
        }
    }

    #[test]
    fn test_recommit_does_not_duplicate() {
        for bulk in [false, true] {
            let dir = tempfile::tempdir().unwrap();
            let store = declared(StoreFaults::default());
            let engine = CommitEngine::new(&store, config(dir.path(), bulk));

            let first = model(6);
            let second = model(6);
            assert!(engine.commit(&first, &CancelFlag::new()).is_success());
            assert!(engine.commit(&second, &CancelFlag::new()).is_success());

            assert_eq!(store.count(TargetKind::Nodes, LABEL_FILE), 6, "bulk={}", bulk);
            assert_eq!(store.count(TargetKind::Edges, "IMPORTS"), 5, "bulk={}", bulk);
        }
    }

    #[test]
    fn test_bulk_and_row_paths_agree_on_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = declared(StoreFaults::default());
        let model = model(3);

        let rows = CommitEngine::new(&store, config(dir.path(), false));
        assert!(rows.commit(&model, &CancelFlag::new()).is_success());
        let bulk = CommitEngine::new(&store, config(dir.path(), true));
        let report = bulk.commit(&model, &CancelFlag::new());
        assert!(report.is_success());
        assert!(report
            .groups
            .iter()
            .all(|g| g.strategy == Some(Strategy::Bulk)));

        assert_eq!(store.count(TargetKind::Nodes, LABEL_FILE), 3);
        assert_eq!(store.count(TargetKind::Edges, "IMPORTS"), 2);
    }

    #[test]
    fn test_bulk_and_row_paths_store_same_properties() {
        let node = Node::new(generate_deterministic_id("Function", "src/a.py:f:1"), "Function")
            .with("name", "")
            .with("parent", "")
            .with("file_path", "src/a.py")
            .with("start_line", 1usize);

        let mut stored = Vec::new();
        for bulk in [false, true] {
            let dir = tempfile::tempdir().unwrap();
            let store = declared(StoreFaults::default());
            let engine = CommitEngine::new(&store, config(dir.path(), bulk));
            let outcome = engine.commit_group("Function", &[&node]);
            assert!(outcome.is_committed());
            let expected = if bulk { Strategy::Bulk } else { Strategy::RowWise };
            assert_eq!(outcome.strategy, Some(expected));
            let record = store.get(TargetKind::Nodes, "Function", &node.id).unwrap();
            stored.push(record.properties);
        }

        assert_eq!(stored[0], stored[1]);
        assert!(!stored[0].contains_key("name"));
        assert_eq!(stored[0]["file_path"], "src/a.py".into());
    }

    #[test]
    fn test_empty_group_never_writes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = declared(StoreFaults::default());
        let engine = CommitEngine::new(&store, config(dir.path(), true));

        let outcome = engine.commit_group::<Node>(LABEL_FILE, &[]);
        assert!(outcome.is_committed());
        assert_eq!(outcome.rows_written, 0);
        assert_eq!(StoreCalls::get(&store.calls().artifact_writes), 0);
        assert_eq!(StoreCalls::get(&store.calls().bulk_loads), 0);
        assert_eq!(StoreCalls::get(&store.calls().upsert_batches), 0);

        let report = engine.commit(&GraphModel::new(), &CancelFlag::new());
        assert!(report.groups.is_empty());
        assert_eq!(StoreCalls::get(&store.calls().artifact_writes), 0);
    }

    #[test]
    fn test_bulk_timeout_falls_back_then_row_timeout_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = declared(StoreFaults {
            latency: Some(Duration::from_millis(60)),
            ..StoreFaults::default()
        });
        let engine = CommitEngine::new(
            &store,
            CommitConfig {
                timeout: Duration::from_millis(10),
                ..config(dir.path(), true)
            },
        );

        let report = engine.commit(&model(2), &CancelFlag::new());

        assert!(!report.is_success());
        let files = report.group(&GroupTarget::nodes(LABEL_FILE)).unwrap();
        assert!(files.is_failed());
        let bulk_error = files.bulk_error.as_ref().unwrap();
        assert!(bulk_error.timed_out);
        assert_eq!(bulk_error.kind, FailureKind::BulkLoad);
        let error = files.error.as_ref().unwrap();
        assert!(error.timed_out);
        assert_eq!(error.kind, FailureKind::RowUpsert);
        assert_eq!(store.total(), 0);
    }

    #[test]
    fn test_failed_group_does_not_block_others() {
        let dir = tempfile::tempdir().unwrap();
        let store = declared(StoreFaults {
            fail_upsert_for: HashSet::from(["IMPORTS".to_string()]),
            ..StoreFaults::default()
        });
        let engine = CommitEngine::new(&store, config(dir.path(), false));
        let model = model(4);

        let report = engine.commit(&model, &CancelFlag::new());
        assert_eq!(report.committed_groups().len(), 1);
        assert_eq!(report.failed_groups().len(), 1);
        assert_eq!(report.failed_groups()[0].target, GroupTarget::edges("IMPORTS"));
        assert_eq!(store.count(TargetKind::Nodes, LABEL_FILE), 4);
        assert_eq!(store.count(TargetKind::Edges, "IMPORTS"), 0);
    }

    #[test]
    fn test_cancelled_run_skips_every_group() {
        let dir = tempfile::tempdir().unwrap();
        let store = declared(StoreFaults::default());
        let engine = CommitEngine::new(&store, config(dir.path(), true));
        let cancel = CancelFlag::new();
        cancel.cancel();

        let report = engine.commit(&model(3), &cancel);
        assert_eq!(report.skipped_groups().len(), 2);
        assert!(report.groups.iter().all(|g| g.phase == CommitPhase::Skipped));
        assert!(!report.is_success());
        assert_eq!(store.total(), 0);
        assert_eq!(StoreCalls::get(&store.calls().artifact_writes), 0);
    }

    #[test]
    fn test_parallel_groups_commit_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = declared(StoreFaults::default());
        let mut model = model(5);
        model.add_node(
            Node::new(generate_deterministic_id("Function", "src/f0.py:main:1"), "Function")
                .with("name", "main")
                .with("file_path", "src/f0.py")
                .with("start_line", 1usize)
                .with("end_line", 3usize),
        );
        let engine = CommitEngine::new(
            &store,
            CommitConfig {
                parallel_groups: true,
                ..config(dir.path(), true)
            },
        );

        let report = engine.commit(&model, &CancelFlag::new());
        assert!(report.is_success());
        assert_eq!(report.groups.len(), 3);
        // Node groups always precede relationship groups.
        assert_eq!(report.groups[2].target.kind, TargetKind::Edges);
        assert_eq!(store.total(), 5 + 1 + 4);
    }

    #[test]
    fn test_schema_declarations_cover_file_columns() {
        let store = declared(StoreFaults::default());
        let columns: Vec<String> = node_columns(LABEL_FILE)
            .unwrap()
            .iter()
            .map(|c| c.name.to_string())
            .collect();
        assert!(store.has_schema(TargetKind::Nodes, LABEL_FILE, &columns));
        assert!(!store.has_schema(TargetKind::Nodes, LABEL_FILE, &["owner".to_string()]));
    }
}
