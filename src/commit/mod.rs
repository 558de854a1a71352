//! Graph commit engine.
//!
//! Applies a staged [`GraphModel`] to a [`GraphStore`] one group at a time,
//! nodes before relationships. Each group runs the strategy machine
//!
//! ```text
//! Staged -> Committing(Bulk) -> Committed
//!                            -> FailedBulk -> Committing(RowWise) -> Committed | Failed
//! Staged -> Committing(RowWise) -> Committed | Failed
//! ```
//!
//! The bulk path is tried only when it is enabled in [`CommitConfig`] and the
//! store's capability probe reports a bulk surface. Any bulk failure,
//! timeouts included, reruns the same group row-wise. Both paths are
//! all-or-nothing per group and keyed by id, so a group can be committed
//! again without duplicating anything.

pub mod artifact;

use crate::graph::{GraphModel, Group};
use crate::ids::generate_id;
use crate::store::{Deadline, GraphStore, StoreError, StoreRecord, TargetKind};
use artifact::{build_artifact, ArtifactName, GroupMember};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Commit settings, read once per run.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitConfig {
    /// Attempt the bulk path at all.
    pub bulk_load: bool,
    /// Records per upsert batch on the row-wise path.
    pub batch_size: usize,
    /// Bound for each group's store work on one path.
    pub timeout: Duration,
    /// Directory for staged artifacts.
    pub artifact_dir: PathBuf,
    /// Commit groups of one phase concurrently when the store allows it.
    pub parallel_groups: bool,
}

impl Default for CommitConfig {
    fn default() -> Self {
        CommitConfig {
            bulk_load: false,
            batch_size: 500,
            timeout: Duration::from_secs(30),
            artifact_dir: PathBuf::from(".repograph/import"),
            parallel_groups: false,
        }
    }
}

/// Shared cancellation signal for a commit run.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// A flag that is not set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the run to stop before its next group.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Label or relationship type being committed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupTarget {
    /// Node or relationship group.
    pub kind: TargetKind,
    /// Label or relationship type.
    pub name: String,
}

impl GroupTarget {
    /// Node group for `label`.
    pub fn nodes(label: &str) -> Self {
        GroupTarget {
            kind: TargetKind::Nodes,
            name: label.to_string(),
        }
    }

    /// Relationship group for `rel_type`.
    pub fn edges(rel_type: &str) -> Self {
        GroupTarget {
            kind: TargetKind::Edges,
            name: rel_type.to_string(),
        }
    }
}

impl fmt::Display for GroupTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.kind)
    }
}

/// Loading mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// One artifact, one bulk-load instruction.
    Bulk,
    /// Batched create-or-overwrite by id.
    RowWise,
}

/// State of a group in the commit machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitPhase {
    /// Waiting to be committed.
    Staged,
    /// Store work in progress.
    Committing(Strategy),
    /// Bulk attempt failed; nothing of it was applied.
    FailedBulk,
    /// Durable.
    Committed,
    /// Row-wise attempt failed; nothing of the group was applied.
    Failed,
    /// Not attempted because the run was cancelled.
    Skipped,
}

/// Which path produced a group error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Bulk path failure; recovered by the row-wise path.
    BulkLoad,
    /// Row-wise failure; fatal for the group.
    RowUpsert,
}

/// A classified group failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupError {
    /// Path that was active.
    pub kind: FailureKind,
    /// Human-readable cause.
    pub message: String,
    /// Whether the cause was an expired deadline.
    pub timed_out: bool,
}

impl GroupError {
    fn from_store(kind: FailureKind, err: &StoreError) -> Self {
        GroupError {
            kind,
            message: err.to_string(),
            timed_out: matches!(err, StoreError::Timeout { .. }),
        }
    }

    fn bulk(message: String) -> Self {
        GroupError {
            kind: FailureKind::BulkLoad,
            message,
            timed_out: false,
        }
    }
}

impl fmt::Display for GroupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Result of committing one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupOutcome {
    /// Group identity.
    pub target: GroupTarget,
    /// Members staged for the group.
    pub members: usize,
    /// Records the successful path wrote.
    pub rows_written: usize,
    /// Path that committed the group.
    pub strategy: Option<Strategy>,
    /// Final state.
    pub phase: CommitPhase,
    /// Every state the group passed through, in order.
    pub history: Vec<CommitPhase>,
    /// Why the bulk path was abandoned, if it was.
    pub bulk_error: Option<GroupError>,
    /// Fatal error, if the group failed.
    pub error: Option<GroupError>,
    /// Wall time spent on the group.
    pub elapsed_ms: u64,
}

impl GroupOutcome {
    fn staged(target: GroupTarget, members: usize) -> Self {
        GroupOutcome {
            target,
            members,
            rows_written: 0,
            strategy: None,
            phase: CommitPhase::Staged,
            history: vec![CommitPhase::Staged],
            bulk_error: None,
            error: None,
            elapsed_ms: 0,
        }
    }

    fn enter(&mut self, phase: CommitPhase) {
        self.phase = phase;
        self.history.push(phase);
    }

    fn skipped(target: GroupTarget, members: usize) -> Self {
        let mut outcome = Self::staged(target, members);
        outcome.enter(CommitPhase::Skipped);
        outcome
    }

    /// Whether the group is durable.
    pub fn is_committed(&self) -> bool {
        self.phase == CommitPhase::Committed
    }

    /// Whether the group failed on every path.
    pub fn is_failed(&self) -> bool {
        self.phase == CommitPhase::Failed
    }

    /// Whether the bulk path failed and the row-wise path took over.
    pub fn fell_back(&self) -> bool {
        self.history.contains(&CommitPhase::FailedBulk)
    }
}

/// Per-group results of one commit run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitReport {
    /// Run-scoped id, also embedded in artifact names.
    pub run_id: String,
    /// One outcome per group, nodes first.
    pub groups: Vec<GroupOutcome>,
    /// Run start.
    pub started_at: DateTime<Utc>,
    /// Run end.
    pub finished_at: DateTime<Utc>,
}

impl CommitReport {
    /// Groups that are durable.
    pub fn committed_groups(&self) -> Vec<&GroupOutcome> {
        self.groups.iter().filter(|g| g.is_committed()).collect()
    }

    /// Groups that failed; each can be retried alone.
    pub fn failed_groups(&self) -> Vec<&GroupOutcome> {
        self.groups.iter().filter(|g| g.is_failed()).collect()
    }

    /// Groups not attempted because of cancellation.
    pub fn skipped_groups(&self) -> Vec<&GroupOutcome> {
        self.groups
            .iter()
            .filter(|g| g.phase == CommitPhase::Skipped)
            .collect()
    }

    /// Whether every group was committed.
    pub fn is_success(&self) -> bool {
        self.groups.iter().all(GroupOutcome::is_committed)
    }

    /// Records written across all committed groups.
    pub fn rows_written(&self) -> usize {
        self.groups.iter().map(|g| g.rows_written).sum()
    }

    /// Outcome for one group.
    pub fn group(&self, target: &GroupTarget) -> Option<&GroupOutcome> {
        self.groups.iter().find(|g| &g.target == target)
    }
}

/// Removes a staged artifact on every exit path.
struct StagedArtifact<'a> {
    store: &'a dyn GraphStore,
    path: PathBuf,
}

impl StagedArtifact<'_> {
    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedArtifact<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.store.remove_artifact(&self.path) {
            log::warn!("could not remove artifact {}: {}", self.path.display(), e);
        }
    }
}

/// Commits staged groups to a store.
pub struct CommitEngine<'a> {
    store: &'a dyn GraphStore,
    config: CommitConfig,
}

impl<'a> CommitEngine<'a> {
    /// Engine over `store` with the settings of one run.
    pub fn new(store: &'a dyn GraphStore, config: CommitConfig) -> Self {
        CommitEngine { store, config }
    }

    /// Settings in effect.
    pub fn config(&self) -> &CommitConfig {
        &self.config
    }

    /// Commit every group of `model`: all node labels, then all relationship types.
    ///
    /// Cancellation is checked before each group; groups not yet started are
    /// reported as skipped and leave the store untouched.
    pub fn commit(&self, model: &GraphModel, cancel: &CancelFlag) -> CommitReport {
        let run_id = generate_id("run");
        let started_at = Utc::now();
        log::info!(
            "commit run {}: {} nodes, {} relationships (bulk {})",
            run_id,
            model.node_count(),
            model.relationship_count(),
            if self.bulk_selected() { "on" } else { "off" }
        );

        let mut groups = self.commit_phase(&run_id, &model.group_by_label(), cancel);
        groups.extend(self.commit_phase(&run_id, &model.group_by_type(), cancel));

        let report = CommitReport {
            run_id,
            groups,
            started_at,
            finished_at: Utc::now(),
        };
        log::info!(
            "commit run {} finished: {} committed, {} failed, {} skipped",
            report.run_id,
            report.committed_groups().len(),
            report.failed_groups().len(),
            report.skipped_groups().len()
        );
        report
    }

    /// Commit one group on its own.
    pub fn commit_group<T: GroupMember>(&self, name: &str, members: &[&T]) -> GroupOutcome {
        self.run_group(&generate_id("run"), name, members)
    }

    /// Recommit one group of `model`, typically one a report listed as failed.
    pub fn retry_group(&self, target: &GroupTarget, model: &GraphModel) -> GroupOutcome {
        log::info!("retrying {}", target);
        match target.kind {
            TargetKind::Nodes => {
                let members = find_members(model.group_by_label(), &target.name);
                self.commit_group(&target.name, &members)
            }
            TargetKind::Edges => {
                let members = find_members(model.group_by_type(), &target.name);
                self.commit_group(&target.name, &members)
            }
        }
    }

    fn bulk_selected(&self) -> bool {
        self.config.bulk_load && self.store.supports_bulk_load()
    }

    fn commit_phase<T: GroupMember>(
        &self,
        run_id: &str,
        groups: &[Group<'_, T>],
        cancel: &CancelFlag,
    ) -> Vec<GroupOutcome> {
        let one = |group: &Group<'_, T>| {
            if cancel.is_cancelled() {
                log::info!("skipping {} ({}): run cancelled", group.key, T::KIND);
                return GroupOutcome::skipped(
                    GroupTarget {
                        kind: T::KIND,
                        name: group.key.to_string(),
                    },
                    group.members.len(),
                );
            }
            self.run_group(run_id, group.key, &group.members)
        };

        if self.config.parallel_groups && self.store.supports_concurrent_writers() {
            groups.par_iter().map(one).collect()
        } else {
            groups.iter().map(one).collect()
        }
    }

    fn run_group<T: GroupMember>(&self, run_id: &str, name: &str, members: &[&T]) -> GroupOutcome {
        let started = Instant::now();
        let target = GroupTarget {
            kind: T::KIND,
            name: name.to_string(),
        };
        let mut outcome = GroupOutcome::staged(target, members.len());

        if members.is_empty() {
            outcome.enter(CommitPhase::Committed);
            return outcome;
        }

        if self.bulk_selected() {
            outcome.enter(CommitPhase::Committing(Strategy::Bulk));
            match self.commit_bulk(run_id, name, members) {
                Ok(rows) => {
                    log::info!("{}: {} rows bulk-loaded", outcome.target, rows);
                    outcome.rows_written = rows;
                    outcome.strategy = Some(Strategy::Bulk);
                    outcome.enter(CommitPhase::Committed);
                    outcome.elapsed_ms = elapsed_ms(started);
                    return outcome;
                }
                Err(err) => {
                    log::warn!(
                        "{}: bulk load failed, falling back to row-wise upsert: {}",
                        outcome.target,
                        err
                    );
                    outcome.bulk_error = Some(err);
                    outcome.enter(CommitPhase::FailedBulk);
                }
            }
        }

        outcome.enter(CommitPhase::Committing(Strategy::RowWise));
        match self.commit_rows(name, members) {
            Ok(rows) => {
                log::info!("{}: {} rows upserted", outcome.target, rows);
                outcome.rows_written = rows;
                outcome.strategy = Some(Strategy::RowWise);
                outcome.enter(CommitPhase::Committed);
            }
            Err(err) => {
                log::error!("{}: row-wise upsert failed: {}", outcome.target, err);
                outcome.error = Some(GroupError::from_store(FailureKind::RowUpsert, &err));
                outcome.enter(CommitPhase::Failed);
            }
        }
        outcome.elapsed_ms = elapsed_ms(started);
        outcome
    }

    fn commit_bulk<T: GroupMember>(
        &self,
        run_id: &str,
        name: &str,
        members: &[&T],
    ) -> Result<usize, GroupError> {
        let artifact = build_artifact(members);
        if !artifact.dropped.is_empty() {
            return Err(GroupError::bulk(format!(
                "{} member(s) cannot be encoded in an artifact",
                artifact.dropped.len()
            )));
        }
        if artifact.is_empty() {
            return Ok(0);
        }

        let columns = artifact.property_columns();
        if !self.store.has_schema(T::KIND, name, columns) {
            return Err(GroupError::from_store(
                FailureKind::BulkLoad,
                &StoreError::SchemaMismatch {
                    target: name.to_string(),
                    message: format!("columns [{}] are not all declared", columns.join(", ")),
                },
            ));
        }

        let deadline = Deadline::after(self.config.timeout);
        let staged = StagedArtifact {
            store: self.store,
            path: ArtifactName::new(run_id, T::KIND, name).path_in(&self.config.artifact_dir),
        };
        let bulk_err = |e: StoreError| GroupError::from_store(FailureKind::BulkLoad, &e);

        self.store
            .write_artifact(staged.path(), &artifact.payload)
            .map_err(bulk_err)?;
        deadline.check("artifact write").map_err(bulk_err)?;
        self.store
            .load_from_artifact(T::KIND, name, staged.path(), deadline)
            .map_err(bulk_err)
    }

    fn commit_rows<T: GroupMember>(&self, name: &str, members: &[&T]) -> Result<usize, StoreError> {
        let deadline = Deadline::after(self.config.timeout);
        let records: Vec<StoreRecord> = members.iter().map(|m| m.to_record()).collect();

        let mut session = self.store.begin_upsert(T::KIND, name, deadline)?;
        for batch in records.chunks(self.config.batch_size.max(1)) {
            session.upsert(batch, deadline)?;
        }
        session.commit(deadline)?;
        Ok(records.len())
    }
}

fn find_members<'m, T>(groups: Vec<Group<'m, T>>, name: &str) -> Vec<&'m T> {
    groups
        .into_iter()
        .find(|g| g.key == name)
        .map(|g| g.members)
        .unwrap_or_default()
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
