//! Repograph CLI binary
//!
//! This is the main entry point for the repograph command-line interface.
//! The CLI is a thin adapter over the library - NO logic is implemented here.

use repograph::cli::{CliErrorPayload, CliSuccessPayload, Commands, IngestArgs};
use repograph::config::IngestConfig;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

/// Exit code for a run where some groups failed or were skipped.
const EXIT_PARTIAL: u8 = 2;

enum Outcome {
    Done(String),
    Partial(String),
}

fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = repograph::cli::parse_args();

    // Verbose forces debug; otherwise RUST_LOG decides, defaulting to warn
    let mut logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if cli.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    let json = matches!(&cli.command, Commands::Ingest(args) if args.json);

    // Execute command
    let result = match cli.command {
        Commands::Ingest(args) => execute_ingest(&args),
        Commands::Imports { file, language } => execute_imports(&file, language.as_deref()),
        Commands::Sweep {
            artifact_dir,
            config,
            older_than_secs,
        } => execute_sweep(artifact_dir, config.as_deref(), older_than_secs),
    };

    // Handle result
    match result {
        Ok(Outcome::Done(msg)) => {
            println!("{}", msg);
            ExitCode::SUCCESS
        }
        Ok(Outcome::Partial(msg)) => {
            println!("{}", msg);
            ExitCode::from(EXIT_PARTIAL)
        }
        Err(e) => {
            if json {
                let payload = CliErrorPayload::from_error(&e);
                match serde_json::to_string_pretty(&payload) {
                    Ok(text) => println!("{}", text),
                    Err(_) => eprintln!("Error: {}", e),
                }
            } else {
                eprintln!("Error: {}", e);
            }
            ExitCode::from(1)
        }
    }
}

/// Resolve the run configuration: file, then environment, then flags.
fn load_config(path: Option<&Path>) -> repograph::Result<IngestConfig> {
    let mut config = match path {
        Some(path) => IngestConfig::load(path)?,
        None => IngestConfig::default(),
    };
    config.apply_env()?;
    Ok(config)
}

/// Execute the ingest command.
///
/// This function is a thin adapter that:
/// 1. Resolves the run configuration
/// 2. Opens the SQLite store and declares the graph schema
/// 3. Ingests and commits through the library
/// 4. Renders the commit report
fn execute_ingest(args: &IngestArgs) -> repograph::Result<Outcome> {
    use repograph::commit::CancelFlag;
    use repograph::store::{declare_graph_schema, SqliteStore};

    let mut config = load_config(args.config.as_deref())?;
    args.apply_to(&mut config);
    config.validate()?;

    let store = SqliteStore::open(&args.db)?;
    declare_graph_schema(&store)?;

    let summary = repograph::ingest_and_commit(&args.root, &store, &config, &CancelFlag::new())?;
    let report = &summary.report;
    let message = format!(
        "Ingested {} files into {} ({} committed, {} failed groups)",
        summary.ingest.files_indexed,
        args.db.display(),
        report.committed_groups().len(),
        report.failed_groups().len()
    );

    let text = if args.json {
        let data = serde_json::json!({
            "files_indexed": summary.ingest.files_indexed,
            "skipped_files": summary.ingest.skipped_files,
            "nodes": summary.ingest.model.node_count(),
            "relationships": summary.ingest.model.relationship_count(),
            "report": report,
        });
        let payload = CliSuccessPayload::with_data(message, data);
        let payload = if report.is_success() {
            payload
        } else {
            payload.partial()
        };
        serde_json::to_string_pretty(&payload)?
    } else {
        format!(
            "{}\n{}",
            message,
            repograph::cli::describe_report(report).trim_end()
        )
    };

    if report.is_success() {
        Ok(Outcome::Done(text))
    } else {
        Ok(Outcome::Partial(text))
    }
}

/// Execute the imports command: parse one file and print its bindings as JSON.
fn execute_imports(file: &Path, language: Option<&str>) -> repograph::Result<Outcome> {
    use repograph::ingest::detect::{detect_language, Language};
    use repograph::ingest::imports::extract_imports;

    let language = match language {
        Some(tag) => Language::from_tag(tag)
            .ok_or_else(|| repograph::Error::Other(format!("unknown language '{}'", tag)))?,
        None => detect_language(file).ok_or_else(|| {
            repograph::Error::Other(format!(
                "cannot detect language of {}; pass --language",
                file.display()
            ))
        })?,
    };
    let source = std::fs::read_to_string(file).map_err(|source| repograph::Error::Io {
        path: file.to_path_buf(),
        source,
    })?;
    let tree = repograph::syntax::parse(language, file, &source)?;
    let records = extract_imports(&tree, file, language);
    Ok(Outcome::Done(serde_json::to_string_pretty(&records)?))
}

/// Execute the sweep command.
fn execute_sweep(
    artifact_dir: Option<PathBuf>,
    config: Option<&Path>,
    older_than_secs: Option<u64>,
) -> repograph::Result<Outcome> {
    let config = load_config(config)?;
    let older_than = older_than_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.stale_artifact_age());
    let dir = artifact_dir.unwrap_or(config.artifact_dir);
    let removed = repograph::commit::artifact::sweep_stale_artifacts(&dir, None, older_than)?;
    Ok(Outcome::Done(format!(
        "Removed {} stale artifacts from {}",
        removed,
        dir.display()
    )))
}
