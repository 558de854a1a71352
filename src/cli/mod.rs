//! Command-line interface for Repograph.
//!
//! This module handles argument parsing and output payloads only.
//! NO ingestion or store operations are performed here.

use crate::commit::{CommitReport, GroupOutcome};
use crate::config::IngestConfig;
use clap::Parser;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;

/// Repograph: ingest a repository into a property graph.
#[derive(Parser, Debug)]
#[command(name = "repograph")]
#[command(author, version, about, long_about = None)]
#[command(subcommand_required = true)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available Repograph commands.
#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Walk a repository, build its graph and commit it to a store.
    Ingest(IngestArgs),

    /// Print the import bindings of one source file.
    Imports {
        /// Source file to analyze.
        file: PathBuf,

        /// Language tag overriding extension detection (python, javascript, ...).
        #[arg(long, value_name = "LANG")]
        language: Option<String>,
    },

    /// Remove artifacts left behind by interrupted runs.
    Sweep {
        /// Directory holding staged artifacts.
        #[arg(long, value_name = "DIR")]
        artifact_dir: Option<PathBuf>,

        /// Optional JSON config file providing the artifact directory.
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Only remove artifacts unmodified for this many seconds.
        #[arg(long, value_name = "SECS")]
        older_than_secs: Option<u64>,
    },
}

/// Arguments of `repograph ingest`.
#[derive(clap::Args, Debug)]
pub struct IngestArgs {
    /// Repository root to ingest.
    pub root: PathBuf,

    /// SQLite database receiving the graph.
    #[arg(long, value_name = "FILE", default_value = "repograph.db")]
    pub db: PathBuf,

    /// Optional JSON config file (flags and REPOGRAPH_* variables win).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Try the bulk path before falling back to row-wise upserts.
    #[arg(long)]
    pub bulk_load: bool,

    /// Records per row-wise upsert batch.
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// Per-group timeout in milliseconds.
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Directory for staged bulk artifacts.
    #[arg(long, value_name = "DIR")]
    pub artifact_dir: Option<PathBuf>,

    /// Commit independent groups concurrently when the store allows it.
    #[arg(long)]
    pub parallel_groups: bool,

    /// Glob pattern to leave out (repeatable).
    #[arg(long, value_name = "GLOB")]
    pub exclude: Vec<String>,

    /// Walk hidden files and directories.
    #[arg(long)]
    pub include_hidden: bool,

    /// Emit the commit report as JSON.
    #[arg(long)]
    pub json: bool,
}

impl IngestArgs {
    /// Layer the flags that were given over `config`.
    pub fn apply_to(&self, config: &mut IngestConfig) {
        if self.bulk_load {
            config.bulk_load = true;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.timeout_ms = timeout_ms;
        }
        if let Some(dir) = &self.artifact_dir {
            config.artifact_dir = dir.clone();
        }
        if self.parallel_groups {
            config.parallel_groups = true;
        }
        config.exclude.extend(self.exclude.iter().cloned());
        if self.include_hidden {
            config.include_hidden = true;
        }
    }
}

/// Parse command-line arguments.
///
/// Returns the parsed Cli struct or exits on error.
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// JSON success payload for CLI responses.
#[derive(Serialize)]
pub struct CliSuccessPayload {
    /// Status indicator ("ok" or "partial").
    pub status: &'static str,
    /// Human-readable message.
    pub message: String,
    /// Optional structured data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CliSuccessPayload {
    /// Construct a payload containing only the message.
    pub fn message_only(message: String) -> Self {
        Self {
            status: "ok",
            message,
            data: None,
        }
    }

    /// Construct a payload with structured data.
    pub fn with_data(message: String, data: Value) -> Self {
        Self {
            status: "ok",
            message,
            data: Some(data),
        }
    }

    /// Mark the payload as a partially failed run.
    pub fn partial(mut self) -> Self {
        self.status = "partial";
        self
    }
}

/// JSON error payload for CLI responses.
#[derive(Serialize)]
pub struct CliErrorPayload {
    /// Status indicator ("error").
    pub status: &'static str,
    /// Structured error details.
    pub error: ErrorDetails,
}

/// Details for a CLI error payload.
#[derive(Serialize)]
pub struct ErrorDetails {
    /// Error kind identifier (Io, Config, Store, ...).
    pub kind: &'static str,
    /// Human-readable message.
    pub message: String,
    /// Optional file context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl CliErrorPayload {
    /// Build payload from an error.
    pub fn from_error(error: &crate::Error) -> Self {
        CliErrorPayload {
            status: "error",
            error: ErrorDetails {
                kind: error.kind(),
                message: error.to_string(),
                file: error
                    .file_path()
                    .map(|path| path.to_string_lossy().to_string()),
            },
        }
    }
}

/// One line of the human-readable commit summary.
pub fn describe_group(outcome: &GroupOutcome) -> String {
    let path = match outcome.strategy {
        Some(strategy) if outcome.fell_back() => format!("{:?} after bulk failure", strategy),
        Some(strategy) => format!("{:?}", strategy),
        None => "-".to_string(),
    };
    let mut line = format!(
        "{:<6} {:<12} {:>7} members  {:?} via {} in {} ms",
        outcome.target.kind.as_str(),
        outcome.target.name,
        outcome.members,
        outcome.phase,
        path,
        outcome.elapsed_ms
    );
    if let Some(error) = &outcome.error {
        line.push_str(&format!("  error: {}", error));
    }
    line
}

/// Human-readable commit summary, one group per line.
pub fn describe_report(report: &CommitReport) -> String {
    let mut out = format!(
        "run {}: {} committed, {} failed, {} skipped, {} rows written\n",
        report.run_id,
        report.committed_groups().len(),
        report.failed_groups().len(),
        report.skipped_groups().len(),
        report.rows_written()
    );
    for outcome in &report.groups {
        out.push_str(&describe_group(outcome));
        out.push('\n');
    }
    out
}
