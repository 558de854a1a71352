//! Durable graph store on SQLite.
//!
//! Nodes and relationships live in two tables keyed by `(label, id)` and
//! `(rel_type, id)` with properties as a JSON object. `schema_columns`
//! declares which targets and columns the bulk surface accepts. Writes go
//! through `INSERT ... ON CONFLICT DO UPDATE`, so every path is an upsert.

use super::{
    read_artifact, Deadline, GraphStore, StoreError, StoreRecord, TargetKind, UpsertSession,
};
use crate::graph::schema::{Column, ColumnType};
use crate::graph::Properties;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const SCHEMA_SQL: &str = "\
CREATE TABLE IF NOT EXISTS nodes (
  label TEXT NOT NULL,
  id TEXT NOT NULL,
  properties TEXT NOT NULL,
  PRIMARY KEY (label, id)
);
CREATE TABLE IF NOT EXISTS edges (
  rel_type TEXT NOT NULL,
  id TEXT NOT NULL,
  source TEXT NOT NULL,
  target TEXT NOT NULL,
  properties TEXT NOT NULL,
  PRIMARY KEY (rel_type, id)
);
CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source);
CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target);
CREATE TABLE IF NOT EXISTS schema_columns (
  kind TEXT NOT NULL,
  target TEXT NOT NULL,
  name TEXT NOT NULL,
  ty TEXT NOT NULL,
  PRIMARY KEY (kind, target, name)
);";

const UPSERT_NODE_SQL: &str = "\
INSERT INTO nodes (label, id, properties) VALUES (?1, ?2, ?3)
ON CONFLICT(label, id) DO UPDATE SET properties = excluded.properties";

const UPSERT_EDGE_SQL: &str = "\
INSERT INTO edges (rel_type, id, source, target, properties) VALUES (?1, ?2, ?3, ?4, ?5)
ON CONFLICT(rel_type, id) DO UPDATE SET
  source = excluded.source,
  target = excluded.target,
  properties = excluded.properties";

/// Upper bound for waiting on a locked database without a deadline.
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Graph store backed by one SQLite database file.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    bulk_enabled: bool,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("bulk_enabled", &self.bulk_enabled)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open or create a store at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| StoreError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    /// Store in a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA_SQL)?;
        log::debug!("sqlite store ready");
        Ok(SqliteStore {
            conn: Mutex::new(conn),
            bulk_enabled: true,
        })
    }

    /// Turn the bulk surface off (the capability probe then reports false).
    pub fn without_bulk_surface(mut self) -> Self {
        self.bulk_enabled = false;
        self
    }

    /// Number of stored nodes with `label`.
    pub fn count_nodes(&self, label: &str) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM nodes WHERE label = ?1",
            params![label],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    /// Number of stored relationships of `rel_type`.
    pub fn count_edges(&self, rel_type: &str) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM edges WHERE rel_type = ?1",
            params![rel_type],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    /// Properties of one stored node.
    pub fn get_node(&self, label: &str, id: &str) -> Result<Option<Properties>, StoreError> {
        let conn = self.lock()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT properties FROM nodes WHERE label = ?1 AND id = ?2",
                params![label, id],
                |row| row.get(0),
            )
            .optional()?;
        json.map(|j| decode_properties(&j)).transpose()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("sqlite connection lock poisoned".to_string()))
    }

    fn declared(
        &self,
        conn: &Connection,
        kind: TargetKind,
        target: &str,
    ) -> Result<Option<Vec<(String, ColumnType)>>, StoreError> {
        let known: i64 = conn.query_row(
            "SELECT COUNT(*) FROM schema_columns WHERE kind = ?1 AND target = ?2",
            params![kind.as_str(), target],
            |row| row.get(0),
        )?;
        if known == 0 {
            return Ok(None);
        }

        let mut stmt = conn.prepare_cached(
            "SELECT name, ty FROM schema_columns WHERE kind = ?1 AND target = ?2 AND name <> ''",
        )?;
        let rows = stmt.query_map(params![kind.as_str(), target], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut columns = Vec::new();
        for row in rows {
            let (name, ty) = row?;
            let ty = ColumnType::from_name(&ty).ok_or_else(|| StoreError::SchemaMismatch {
                target: target.to_string(),
                message: format!("column '{}' has unknown type '{}'", name, ty),
            })?;
            columns.push((name, ty));
        }
        Ok(Some(columns))
    }
}

fn busy_timeout(conn: &Connection, deadline: Deadline) -> Result<(), StoreError> {
    conn.busy_timeout(deadline.remaining().unwrap_or(DEFAULT_BUSY_TIMEOUT))?;
    Ok(())
}

fn encode_properties(properties: &Properties) -> Result<String, StoreError> {
    serde_json::to_string(properties).map_err(|e| StoreError::Rejected {
        target: String::new(),
        message: format!("properties not encodable: {}", e),
    })
}

fn decode_properties(json: &str) -> Result<Properties, StoreError> {
    serde_json::from_str(json).map_err(|e| StoreError::Rejected {
        target: String::new(),
        message: format!("stored properties unreadable: {}", e),
    })
}

fn upsert_rows(
    conn: &Connection,
    kind: TargetKind,
    target: &str,
    records: &[StoreRecord],
    deadline: Deadline,
) -> Result<(), StoreError> {
    match kind {
        TargetKind::Nodes => {
            let mut stmt = conn.prepare_cached(UPSERT_NODE_SQL)?;
            for record in records {
                deadline.check("upsert")?;
                stmt.execute(params![target, record.id, encode_properties(&record.properties)?])?;
            }
        }
        TargetKind::Edges => {
            let mut stmt = conn.prepare_cached(UPSERT_EDGE_SQL)?;
            for record in records {
                deadline.check("upsert")?;
                let (Some(source), Some(dest)) = (&record.source, &record.target) else {
                    return Err(StoreError::Rejected {
                        target: target.to_string(),
                        message: format!("relationship {} without endpoints", record.id),
                    });
                };
                stmt.execute(params![
                    target,
                    record.id,
                    source,
                    dest,
                    encode_properties(&record.properties)?
                ])?;
            }
        }
    }
    Ok(())
}

impl GraphStore for SqliteStore {
    fn supports_bulk_load(&self) -> bool {
        self.bulk_enabled
    }

    fn has_schema(&self, kind: TargetKind, target: &str, columns: &[String]) -> bool {
        let Ok(conn) = self.lock() else {
            return false;
        };
        match self.declared(&conn, kind, target) {
            Ok(Some(declared)) => columns
                .iter()
                .all(|c| declared.iter().any(|(name, _)| name == c)),
            Ok(None) => false,
            Err(e) => {
                log::warn!("schema probe for {} failed: {}", target, e);
                false
            }
        }
    }

    fn ensure_schema(
        &self,
        kind: TargetKind,
        target: &str,
        columns: &[Column],
    ) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO schema_columns (kind, target, name, ty) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(kind, target, name) DO UPDATE SET ty = excluded.ty",
            )?;
            // Empty name marks a declared target with no property columns.
            stmt.execute(params![kind.as_str(), target, "", ColumnType::Text.as_str()])?;
            for column in columns {
                stmt.execute(params![kind.as_str(), target, column.name, column.ty.as_str()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn load_from_artifact(
        &self,
        kind: TargetKind,
        target: &str,
        path: &Path,
        deadline: Deadline,
    ) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        busy_timeout(&conn, deadline)?;

        let declared = self
            .declared(&conn, kind, target)?
            .ok_or_else(|| StoreError::SchemaMismatch {
                target: target.to_string(),
                message: "target is not declared".to_string(),
            })?;
        let records = read_artifact(kind, target, path, &declared, deadline)?;

        conn.execute_batch("BEGIN IMMEDIATE")?;
        let outcome = upsert_rows(&conn, kind, target, &records, deadline)
            .and_then(|()| deadline.check("bulk load"))
            .and_then(|()| conn.execute_batch("COMMIT").map_err(StoreError::from));
        match outcome {
            Ok(()) => Ok(records.len()),
            Err(e) => {
                // A failed COMMIT leaves the transaction open.
                if let Err(rollback) = conn.execute_batch("ROLLBACK") {
                    log::error!("rollback of bulk load into {} failed: {}", target, rollback);
                }
                Err(e)
            }
        }
    }

    fn begin_upsert<'a>(
        &'a self,
        kind: TargetKind,
        target: &str,
        deadline: Deadline,
    ) -> Result<Box<dyn UpsertSession + 'a>, StoreError> {
        let conn = self.lock()?;
        busy_timeout(&conn, deadline)?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(Box::new(SqliteSession {
            conn,
            kind,
            target: target.to_string(),
            open: true,
        }))
    }
}

/// One `IMMEDIATE` transaction holding the connection until commit or drop.
struct SqliteSession<'a> {
    conn: MutexGuard<'a, Connection>,
    kind: TargetKind,
    target: String,
    open: bool,
}

impl UpsertSession for SqliteSession<'_> {
    fn upsert(&mut self, records: &[StoreRecord], deadline: Deadline) -> Result<(), StoreError> {
        upsert_rows(&self.conn, self.kind, &self.target, records, deadline)
    }

    fn commit(mut self: Box<Self>, deadline: Deadline) -> Result<(), StoreError> {
        deadline.check("commit")?;
        self.conn.execute_batch("COMMIT")?;
        self.open = false;
        Ok(())
    }
}

impl Drop for SqliteSession<'_> {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                log::error!("rollback of {} upserts failed: {}", self.target, e);
            }
        }
    }
}
