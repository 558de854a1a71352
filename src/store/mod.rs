//! Persisted graph store boundary.
//!
//! The commit engine talks to a store only through [`GraphStore`]: a
//! capability probe, an artifact write/remove pair, a bulk load scoped to
//! one label or relationship type, and row-wise upserts grouped into an
//! [`UpsertSession`]. Every call that may block takes a [`Deadline`].

pub mod memory;
pub mod sqlite;

use crate::graph::schema::{Column, NODE_SCHEMAS, RELATIONSHIP_SCHEMAS};
use crate::graph::{Node, Properties, PropertyValue, Relationship};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

pub use memory::{MemoryStore, StoreFaults};
pub use sqlite::SqliteStore;

/// Errors raised by a graph store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store (or one of its surfaces) cannot be used right now.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The target's declared schema does not cover the artifact columns.
    #[error("schema mismatch for {target}: {message}")]
    SchemaMismatch {
        /// Label or relationship type.
        target: String,
        /// Which column or declaration is missing.
        message: String,
    },

    /// The store refused a load or an upsert.
    #[error("{target} rejected: {message}")]
    Rejected {
        /// Label or relationship type.
        target: String,
        /// Store-provided reason.
        message: String,
    },

    /// The operation's deadline passed before it finished.
    #[error("{operation} timed out")]
    Timeout {
        /// Operation that was running.
        operation: &'static str,
    },

    /// Artifact file I/O failure.
    #[error("I/O error for artifact {path}: {source}")]
    Io {
        /// Artifact path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// SQLite failure.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Artifact could not be read as CSV.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Whether a group holds nodes or relationships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// Node group, keyed by label.
    Nodes,
    /// Relationship group, keyed by type.
    Edges,
}

impl TargetKind {
    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Nodes => "nodes",
            TargetKind::Edges => "edges",
        }
    }

    /// Parse a name produced by [`TargetKind::as_str`].
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "nodes" => Some(TargetKind::Nodes),
            "edges" => Some(TargetKind::Edges),
            _ => None,
        }
    }

    /// Columns every artifact of this kind starts with.
    ///
    /// Relationship artifacts carry the relationship id after the endpoints,
    /// so both commit paths key a relationship the same way.
    pub fn mandatory_columns(&self) -> &'static [&'static str] {
        match self {
            TargetKind::Nodes => &["id"],
            TargetKind::Edges => &["source", "target", "id"],
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One node or relationship as the store sees it.
///
/// Null values are not stored: a record never carries a
/// [`PropertyValue::Null`], and non-finite floats count as null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreRecord {
    /// Unique key within the target.
    pub id: String,
    /// Source node id (relationships only).
    pub source: Option<String>,
    /// Target node id (relationships only).
    pub target: Option<String>,
    /// Stored properties.
    pub properties: Properties,
}

impl StoreRecord {
    /// Record for a node.
    pub fn from_node(node: &Node) -> Self {
        StoreRecord {
            id: node.id.clone(),
            source: None,
            target: None,
            properties: storable(&node.properties),
        }
    }

    /// Record for a relationship.
    pub fn from_relationship(rel: &Relationship) -> Self {
        StoreRecord {
            id: rel.id.clone(),
            source: Some(rel.source.clone()),
            target: Some(rel.target.clone()),
            properties: storable(&rel.properties),
        }
    }
}

/// Properties as persisted by either commit path.
///
/// An artifact field cannot tell empty text from null, so both are absent.
fn storable(properties: &Properties) -> Properties {
    properties
        .iter()
        .filter(|(_, value)| match value {
            PropertyValue::Null => false,
            PropertyValue::Text(text) => !text.is_empty(),
            PropertyValue::Float(f) => f.is_finite(),
            _ => true,
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Point in time after which a store call must give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// Deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Deadline {
            at: Instant::now().checked_add(timeout),
        }
    }

    /// A deadline that never expires.
    pub fn never() -> Self {
        Deadline { at: None }
    }

    /// Time left, `None` for an unbounded deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.at.map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Whether the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// `Err(Timeout)` once the deadline has passed.
    pub fn check(&self, operation: &'static str) -> Result<(), StoreError> {
        if self.is_expired() {
            return Err(StoreError::Timeout { operation });
        }
        Ok(())
    }
}

/// Row-wise writes for one group, applied atomically.
///
/// Nothing written through a session is visible until [`UpsertSession::commit`]
/// succeeds; dropping the session without committing discards every write.
pub trait UpsertSession {
    /// Create-or-overwrite each record by id.
    fn upsert(&mut self, records: &[StoreRecord], deadline: Deadline) -> Result<(), StoreError>;

    /// Make all writes of this session durable.
    fn commit(self: Box<Self>, deadline: Deadline) -> Result<(), StoreError>;
}

/// A persisted property-graph store.
pub trait GraphStore: Send + Sync {
    /// Capability probe for the bulk-import surface.
    fn supports_bulk_load(&self) -> bool;

    /// Whether groups with different targets may be written concurrently.
    fn supports_concurrent_writers(&self) -> bool {
        false
    }

    /// Whether `target` is declared and declares every one of `columns`.
    ///
    /// `columns` excludes the mandatory id / source / target columns.
    fn has_schema(&self, kind: TargetKind, target: &str, columns: &[String]) -> bool;

    /// Declare the bulk-loadable schema of a target.
    fn ensure_schema(
        &self,
        kind: TargetKind,
        target: &str,
        columns: &[Column],
    ) -> Result<(), StoreError>;

    /// Write an artifact where the bulk surface can read it.
    fn write_artifact(&self, path: &Path, payload: &str) -> Result<(), StoreError> {
        write_local_artifact(path, payload)
    }

    /// Remove a staged artifact. Missing files are not an error.
    fn remove_artifact(&self, path: &Path) -> Result<(), StoreError> {
        remove_local_artifact(path)
    }

    /// Load every row of an artifact into `target`, all or nothing.
    ///
    /// Returns the number of rows loaded.
    fn load_from_artifact(
        &self,
        kind: TargetKind,
        target: &str,
        path: &Path,
        deadline: Deadline,
    ) -> Result<usize, StoreError>;

    /// Open a row-wise session for one target.
    fn begin_upsert<'a>(
        &'a self,
        kind: TargetKind,
        target: &str,
        deadline: Deadline,
    ) -> Result<Box<dyn UpsertSession + 'a>, StoreError>;
}

/// Declare every known node label and relationship type on `store`.
pub fn declare_graph_schema(store: &dyn GraphStore) -> Result<(), StoreError> {
    for (label, columns) in NODE_SCHEMAS {
        store.ensure_schema(TargetKind::Nodes, label, columns)?;
    }
    for (rel_type, columns) in RELATIONSHIP_SCHEMAS {
        store.ensure_schema(TargetKind::Edges, rel_type, columns)?;
    }
    Ok(())
}

/// Write an artifact file, creating its directory.
pub fn write_local_artifact(path: &Path, payload: &str) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(io_err)?;
    }
    std::fs::write(path, payload).map_err(io_err)
}

/// Remove an artifact file, ignoring one that is already gone.
pub fn remove_local_artifact(path: &Path) -> Result<(), StoreError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Rows of an artifact, decoded against a declared schema.
///
/// Shared by stores whose bulk surface is a local CSV file: the header must
/// start with the kind's mandatory columns and every other column must be
/// declared; each field is coerced to its declared type.
pub(crate) fn read_artifact(
    kind: TargetKind,
    target: &str,
    path: &Path,
    declared: &[(String, crate::graph::schema::ColumnType)],
    deadline: Deadline,
) -> Result<Vec<StoreRecord>, StoreError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| match e.into_kind() {
            csv::ErrorKind::Io(source) => StoreError::Io {
                path: path.to_path_buf(),
                source,
            },
            other => StoreError::Rejected {
                target: target.to_string(),
                message: format!("unreadable artifact: {:?}", other),
            },
        })?;

    let headers = reader.headers()?.clone();
    let mandatory = kind.mandatory_columns();
    let mismatch = |message: String| StoreError::SchemaMismatch {
        target: target.to_string(),
        message,
    };

    if headers.len() < mandatory.len()
        || headers.iter().zip(mandatory.iter()).any(|(h, m)| h != *m)
    {
        return Err(mismatch(format!(
            "header must start with {}",
            mandatory.join(",")
        )));
    }

    let mut columns = Vec::new();
    for name in headers.iter().skip(mandatory.len()) {
        let ty = declared
            .iter()
            .find(|(declared_name, _)| declared_name == name)
            .map(|(_, ty)| *ty)
            .ok_or_else(|| mismatch(format!("column '{}' is not declared", name)))?;
        columns.push((name.to_string(), ty));
    }

    let mut records = Vec::new();
    for row in reader.records() {
        deadline.check("bulk load")?;
        let row = row?;
        let field = |i: usize| row.get(i).unwrap_or_default().to_string();

        let mut properties = Properties::new();
        for (offset, (name, ty)) in columns.iter().enumerate() {
            let raw = row.get(mandatory.len() + offset).unwrap_or_default();
            let value = ty.coerce(raw).map_err(|message| StoreError::Rejected {
                target: target.to_string(),
                message: format!("column '{}': {}", name, message),
            })?;
            if value != PropertyValue::Null {
                properties.insert(name.clone(), value);
            }
        }

        let record = match kind {
            TargetKind::Nodes => StoreRecord {
                id: field(0),
                source: None,
                target: None,
                properties,
            },
            TargetKind::Edges => StoreRecord {
                id: field(2),
                source: Some(field(0)),
                target: Some(field(1)),
                properties,
            },
        };
        if record.id.is_empty() {
            return Err(StoreError::Rejected {
                target: target.to_string(),
                message: "row without id".to_string(),
            });
        }
        records.push(record);
    }

    Ok(records)
}
