//! Repograph: repository ingestion into a property graph.
//!
//! This library walks a source repository, extracts imports, definitions and
//! call sites with tree-sitter, stages them as a graph of labeled nodes and
//! typed relationships, and commits that graph to a store group by group,
//! bulk-loading from CSV artifacts when it can and falling back to row-wise
//! upserts when it cannot.

#![warn(missing_docs)]

pub mod cli;
pub mod commit;
pub mod config;
pub mod error;
pub mod graph;
pub mod ids;
pub mod ingest;
pub mod store;
pub mod syntax;

/// Re-export common error types for convenience.
pub use error::{Error, Result};

/// Re-export model types for convenience.
pub use graph::{GraphModel, Node, PropertyValue, Relationship};

use commit::{CancelFlag, CommitEngine, CommitReport};
use config::IngestConfig;
use ingest::{IngestResult, Ingestor};
use std::path::Path;
use store::GraphStore;

/// Repograph version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Output of [`ingest_and_commit`].
#[derive(Debug)]
pub struct RunSummary {
    /// Staged model and extraction details.
    pub ingest: IngestResult,
    /// Per-group commit results.
    pub report: CommitReport,
}

/// Ingest the repository at `root` and commit its graph to `store`.
///
/// Artifacts left in the configured artifact directory by crashed runs are
/// swept first; artifacts younger than [`IngestConfig::stale_artifact_age`]
/// are kept. Group failures are reported in [`RunSummary::report`]; only
/// errors that stop the run before any group is attempted are returned as
/// `Err`.
pub fn ingest_and_commit(
    root: &Path,
    store: &dyn GraphStore,
    config: &IngestConfig,
    cancel: &CancelFlag,
) -> Result<RunSummary> {
    config.validate()?;
    if config.bulk_load {
        let swept = commit::artifact::sweep_stale_artifacts(
            &config.artifact_dir,
            None,
            config.stale_artifact_age(),
        )?;
        if swept > 0 {
            log::info!("removed {} stale artifacts", swept);
        }
    }

    let ingest = Ingestor::new(config.clone()).ingest_repository(root)?;
    log::info!(
        "ingested {} files ({} skipped): {} nodes, {} relationships",
        ingest.files_indexed,
        ingest.skipped_files.len(),
        ingest.model.node_count(),
        ingest.model.relationship_count()
    );

    let engine = CommitEngine::new(store, config.commit_config());
    let report = engine.commit(&ingest.model, cancel);
    Ok(RunSummary { ingest, report })
}
