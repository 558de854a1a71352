//! In-process graph store.
//!
//! Holds records in maps keyed by `(kind, target)` then id. Faults can be
//! injected per store to exercise the commit engine's fallback, timeout and
//! atomicity paths, and every surface call is counted.

use super::{
    read_artifact, write_local_artifact, Deadline, GraphStore, StoreError, StoreRecord, TargetKind,
    UpsertSession,
};
use crate::graph::schema::{Column, ColumnType};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

type TargetKey = (TargetKind, String);

/// Failures to inject into a [`MemoryStore`].
#[derive(Debug, Clone, Default)]
pub struct StoreFaults {
    /// Report the bulk surface as unavailable.
    pub no_bulk_surface: bool,
    /// Every artifact write fails.
    pub fail_artifact_write: bool,
    /// Every bulk load fails after reading the artifact.
    pub fail_bulk_load: bool,
    /// Row upserts into these targets fail.
    pub fail_upsert_for: HashSet<String>,
    /// Row upserts fail once this many records were written in one session.
    pub fail_upsert_after: Option<usize>,
    /// Sleep before each load and each upsert batch.
    pub latency: Option<Duration>,
    /// Accept any columns for any target without declarations.
    pub open_schema: bool,
}

/// Surface call counters.
#[derive(Debug, Default)]
pub struct StoreCalls {
    /// `write_artifact` calls.
    pub artifact_writes: AtomicUsize,
    /// `remove_artifact` calls.
    pub artifact_removals: AtomicUsize,
    /// `load_from_artifact` calls.
    pub bulk_loads: AtomicUsize,
    /// Upsert batches received.
    pub upsert_batches: AtomicUsize,
    /// Records received through upsert batches.
    pub upserted_records: AtomicUsize,
}

impl StoreCalls {
    fn bump(counter: &AtomicUsize, by: usize) {
        counter.fetch_add(by, Ordering::SeqCst);
    }

    /// Read a counter.
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct State {
    schemas: HashMap<TargetKey, Vec<(String, ColumnType)>>,
    records: HashMap<TargetKey, BTreeMap<String, StoreRecord>>,
}

/// Graph store kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    faults: StoreFaults,
    calls: StoreCalls,
}

impl MemoryStore {
    /// Empty store with a working bulk surface.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty store with injected faults.
    pub fn with_faults(faults: StoreFaults) -> Self {
        MemoryStore {
            faults,
            ..Self::default()
        }
    }

    /// Surface call counters.
    pub fn calls(&self) -> &StoreCalls {
        &self.calls
    }

    /// Number of records stored for a target.
    pub fn count(&self, kind: TargetKind, target: &str) -> usize {
        self.lock()
            .map(|state| {
                state
                    .records
                    .get(&(kind, target.to_string()))
                    .map_or(0, BTreeMap::len)
            })
            .unwrap_or(0)
    }

    /// Number of records stored across every target.
    pub fn total(&self) -> usize {
        self.lock()
            .map(|state| state.records.values().map(BTreeMap::len).sum())
            .unwrap_or(0)
    }

    /// A stored record by id.
    pub fn get(&self, kind: TargetKind, target: &str, id: &str) -> Option<StoreRecord> {
        let state = self.lock().ok()?;
        state
            .records
            .get(&(kind, target.to_string()))
            .and_then(|records| records.get(id))
            .cloned()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    fn pause(&self, deadline: Deadline, operation: &'static str) -> Result<(), StoreError> {
        if let Some(latency) = self.faults.latency {
            std::thread::sleep(latency);
        }
        deadline.check(operation)
    }

    fn apply(
        &self,
        kind: TargetKind,
        target: &str,
        records: Vec<StoreRecord>,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let table = state.records.entry((kind, target.to_string())).or_default();
        for record in records {
            table.insert(record.id.clone(), record);
        }
        Ok(())
    }
}

impl GraphStore for MemoryStore {
    fn supports_bulk_load(&self) -> bool {
        !self.faults.no_bulk_surface
    }

    fn supports_concurrent_writers(&self) -> bool {
        true
    }

    fn has_schema(&self, kind: TargetKind, target: &str, columns: &[String]) -> bool {
        if self.faults.open_schema {
            return true;
        }
        let Ok(state) = self.lock() else {
            return false;
        };
        match state.schemas.get(&(kind, target.to_string())) {
            Some(declared) => columns
                .iter()
                .all(|c| declared.iter().any(|(name, _)| name == c)),
            None => false,
        }
    }

    fn ensure_schema(
        &self,
        kind: TargetKind,
        target: &str,
        columns: &[Column],
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let declared = state.schemas.entry((kind, target.to_string())).or_default();
        for column in columns {
            if !declared.iter().any(|(name, _)| name == column.name) {
                declared.push((column.name.to_string(), column.ty));
            }
        }
        Ok(())
    }

    fn write_artifact(&self, path: &Path, payload: &str) -> Result<(), StoreError> {
        StoreCalls::bump(&self.calls.artifact_writes, 1);
        if self.faults.fail_artifact_write {
            return Err(StoreError::Unavailable("artifact surface is read-only".to_string()));
        }
        write_local_artifact(path, payload)
    }

    fn remove_artifact(&self, path: &Path) -> Result<(), StoreError> {
        StoreCalls::bump(&self.calls.artifact_removals, 1);
        super::remove_local_artifact(path)
    }

    fn load_from_artifact(
        &self,
        kind: TargetKind,
        target: &str,
        path: &Path,
        deadline: Deadline,
    ) -> Result<usize, StoreError> {
        StoreCalls::bump(&self.calls.bulk_loads, 1);
        self.pause(deadline, "bulk load")?;

        let declared = if self.faults.open_schema {
            open_columns(path)?
        } else {
            self.lock()?
                .schemas
                .get(&(kind, target.to_string()))
                .cloned()
                .ok_or_else(|| StoreError::SchemaMismatch {
                    target: target.to_string(),
                    message: "target is not declared".to_string(),
                })?
        };

        let records = read_artifact(kind, target, path, &declared, deadline)?;
        if self.faults.fail_bulk_load {
            return Err(StoreError::Rejected {
                target: target.to_string(),
                message: "bulk load refused".to_string(),
            });
        }

        let loaded = records.len();
        self.apply(kind, target, records)?;
        Ok(loaded)
    }

    fn begin_upsert<'a>(
        &'a self,
        kind: TargetKind,
        target: &str,
        deadline: Deadline,
    ) -> Result<Box<dyn UpsertSession + 'a>, StoreError> {
        deadline.check("begin upsert")?;
        Ok(Box::new(MemorySession {
            store: self,
            kind,
            target: target.to_string(),
            pending: Vec::new(),
        }))
    }
}

/// Every header column as text, for stores without declarations.
fn open_columns(path: &Path) -> Result<Vec<(String, ColumnType)>, StoreError> {
    let mut reader = csv::Reader::from_path(path)?;
    Ok(reader
        .headers()?
        .iter()
        .map(|name| (name.to_string(), ColumnType::Text))
        .collect())
}

struct MemorySession<'a> {
    store: &'a MemoryStore,
    kind: TargetKind,
    target: String,
    pending: Vec<StoreRecord>,
}

impl UpsertSession for MemorySession<'_> {
    fn upsert(&mut self, records: &[StoreRecord], deadline: Deadline) -> Result<(), StoreError> {
        let calls = &self.store.calls;
        StoreCalls::bump(&calls.upsert_batches, 1);
        StoreCalls::bump(&calls.upserted_records, records.len());
        self.store.pause(deadline, "upsert")?;

        let faults = &self.store.faults;
        if faults.fail_upsert_for.contains(&self.target) {
            return Err(StoreError::Rejected {
                target: self.target.clone(),
                message: "upsert refused".to_string(),
            });
        }
        if let Some(limit) = faults.fail_upsert_after {
            if self.pending.len() + records.len() > limit {
                return Err(StoreError::Rejected {
                    target: self.target.clone(),
                    message: format!("session limit of {} records exceeded", limit),
                });
            }
        }

        self.pending.extend_from_slice(records);
        Ok(())
    }

    fn commit(self: Box<Self>, deadline: Deadline) -> Result<(), StoreError> {
        deadline.check("commit")?;
        let MemorySession {
            store,
            kind,
            target,
            pending,
        } = *self;
        store.apply(kind, &target, pending)
    }
}
