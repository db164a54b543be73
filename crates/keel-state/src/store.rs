//! StateStore: redb-backed persistence of task descriptors, statuses and
//! executors.
//!
//! All values are JSON-serialized into redb's `&[u8]` value columns. The
//! store supports both on-disk and in-memory backends (the latter for
//! testing). Writes are last-write-wins per key.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use keel_core::{ExecutorInfo, TaskInfo, TaskStatus};

use crate::error::{StateError, StateResult};
use crate::tables::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

type Table = TableDefinition<'static, &'static str, &'static [u8]>;

/// Read access to persisted task state, as consumed by requirement
/// construction.
pub trait TaskStore {
    /// Last launched descriptor of a task, by task instance name.
    fn fetch_task(&self, name: &str) -> StateResult<Option<TaskInfo>>;

    /// Last observed status of a task, by task instance name.
    fn fetch_status(&self, name: &str) -> StateResult<Option<TaskStatus>>;

    /// Every persisted task descriptor.
    fn fetch_tasks(&self) -> StateResult<Vec<TaskInfo>>;

    /// Executor descriptor of a pod instance, by pod instance name.
    fn fetch_executor(&self, pod_instance: &str) -> StateResult<Option<ExecutorInfo>>;
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(TASKS).map_err(map_err!(Table))?;
        txn.open_table(STATUSES).map_err(map_err!(Table))?;
        txn.open_table(EXECUTORS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn put_all<T: Serialize>(&self, table: Table, entries: &[(&str, &T)]) -> StateResult<()> {
        let encoded = entries
            .iter()
            .map(|(key, value)| {
                serde_json::to_vec(value)
                    .map(|bytes| (*key, bytes))
                    .map_err(map_err!(Serialize))
            })
            .collect::<StateResult<Vec<_>>>()?;

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            for (key, value) in &encoded {
                table
                    .insert(*key, value.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, table: Table, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let value: T =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn list<T: DeserializeOwned>(&self, table: Table) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let item: T = serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(item);
        }
        Ok(results)
    }

    // ── Tasks ──────────────────────────────────────────────────────

    /// Insert or replace task descriptors in one transaction.
    pub fn store_tasks(&self, tasks: &[TaskInfo]) -> StateResult<()> {
        let entries: Vec<(&str, &TaskInfo)> = tasks.iter().map(|t| (t.name.as_str(), t)).collect();
        self.put_all(TASKS, &entries)?;
        debug!(count = tasks.len(), "tasks stored");
        Ok(())
    }

    // ── Statuses ───────────────────────────────────────────────────

    pub fn store_status(&self, name: &str, status: &TaskStatus) -> StateResult<()> {
        self.put_all(STATUSES, &[(name, status)])?;
        debug!(task = name, state = ?status.state, "status stored");
        Ok(())
    }

    // ── Executors ──────────────────────────────────────────────────

    pub fn store_executor(&self, pod_instance: &str, executor: &ExecutorInfo) -> StateResult<()> {
        self.put_all(EXECUTORS, &[(pod_instance, executor)])?;
        debug!(pod = pod_instance, executor_id = %executor.executor_id, "executor stored");
        Ok(())
    }
}

impl TaskStore for StateStore {
    fn fetch_task(&self, name: &str) -> StateResult<Option<TaskInfo>> {
        self.get(TASKS, name)
    }

    fn fetch_status(&self, name: &str) -> StateResult<Option<TaskStatus>> {
        self.get(STATUSES, name)
    }

    fn fetch_tasks(&self) -> StateResult<Vec<TaskInfo>> {
        self.list(TASKS)
    }

    fn fetch_executor(&self, pod_instance: &str) -> StateResult<Option<ExecutorInfo>> {
        self.get(EXECUTORS, pod_instance)
    }
}
