//! StateStore: redb-backed system of record for procgrid.
//!
//! Provides typed operations over apps, processes, audit events and the
//! convergence outbox. All values are JSON-serialized into redb's `&[u8]`
//! value columns. The store supports both on-disk and in-memory backends
//! (the latter for testing).
//!
//! redb serializes write transactions, so [`StateStore::modify_process`]
//! performs its read-modify-write inside a single write transaction and two
//! concurrent mutations of the same process cannot lose each other's fields.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use redb::{Database, ReadableDatabase, ReadableTable};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

fn encode<T: Serialize>(value: &T) -> StateResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(map_err!(Serialize))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StateResult<T> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

fn check(process: &ProcessRecord) -> StateResult<()> {
    process
        .check_invariants()
        .map_err(|reason| StateError::Invalid {
            guid: process.guid.clone(),
            reason,
        })
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
        txn.open_table(APPS).map_err(map_err!(Table))?;
        txn.open_table(PROCESSES).map_err(map_err!(Table))?;
        txn.open_table(EVENTS).map_err(map_err!(Table))?;
        txn.open_table(PENDING_SYNC).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Apps ───────────────────────────────────────────────────────

    /// Insert or update an app.
    pub fn put_app(&self, app: &AppRecord) -> StateResult<()> {
        let value = encode(app)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(APPS).map_err(map_err!(Table))?;
            table
                .insert(app.guid.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(app_guid = %app.guid, name = %app.name, "app stored");
        Ok(())
    }

    pub fn get_app(&self, app_guid: &str) -> StateResult<Option<AppRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(APPS).map_err(map_err!(Table))?;
        match table.get(app_guid).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    pub fn list_apps(&self) -> StateResult<Vec<AppRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(APPS).map_err(map_err!(Table))?;
        let mut results: Vec<AppRecord> = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(decode(value.value())?);
        }
        results.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(results)
    }

    /// Delete an app and cascade to every process it owns.
    ///
    /// Returns false if the app did not exist.
    pub fn delete_app(&self, app_guid: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        let mut cascaded = 0u32;
        {
            let mut apps = txn.open_table(APPS).map_err(map_err!(Table))?;
            existed = apps.remove(app_guid).map_err(map_err!(Write))?.is_some();

            let mut processes = txn.open_table(PROCESSES).map_err(map_err!(Table))?;
            let mut owned = Vec::new();
            for entry in processes.iter().map_err(map_err!(Read))? {
                let (key, value) = entry.map_err(map_err!(Read))?;
                let process: ProcessRecord = decode(value.value())?;
                if process.app_guid == app_guid {
                    owned.push(key.value().to_string());
                }
            }

            let mut pending = txn.open_table(PENDING_SYNC).map_err(map_err!(Table))?;
            for key in &owned {
                processes.remove(key.as_str()).map_err(map_err!(Write))?;
                pending.remove(key.as_str()).map_err(map_err!(Write))?;
                cascaded += 1;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%app_guid, existed, processes_removed = cascaded, "app deleted");
        Ok(existed)
    }

    // ── Processes ──────────────────────────────────────────────────

    /// Materialize a new process for an existing app.
    ///
    /// Fails with `Conflict` if the app already has a process of the same type.
    pub fn create_process(&self, process: &ProcessRecord) -> StateResult<()> {
        check(process)?;
        let value = encode(process)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let apps = txn.open_table(APPS).map_err(map_err!(Table))?;
            if apps
                .get(process.app_guid.as_str())
                .map_err(map_err!(Read))?
                .is_none()
            {
                return Err(StateError::NotFound(format!("app {}", process.app_guid)));
            }

            let mut table = txn.open_table(PROCESSES).map_err(map_err!(Table))?;
            for entry in table.iter().map_err(map_err!(Read))? {
                let (key, value) = entry.map_err(map_err!(Read))?;
                if key.value() == process.guid {
                    return Err(StateError::Conflict(format!(
                        "process {} already exists",
                        process.guid
                    )));
                }
                let existing: ProcessRecord = decode(value.value())?;
                if existing.app_guid == process.app_guid
                    && existing.process_type == process.process_type
                {
                    return Err(StateError::Conflict(format!(
                        "app {} already has a '{}' process",
                        process.app_guid, process.process_type
                    )));
                }
            }
            table
                .insert(process.guid.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(
            process_guid = %process.guid,
            app_guid = %process.app_guid,
            process_type = %process.process_type,
            "process created"
        );
        Ok(())
    }

    /// Insert or replace a process record without side effects.
    pub fn put_process(&self, process: &ProcessRecord) -> StateResult<()> {
        check(process)?;
        let value = encode(process)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(PROCESSES).map_err(map_err!(Table))?;
            table
                .insert(process.guid.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    pub fn get_process(&self, process_guid: &str) -> StateResult<Option<ProcessRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(PROCESSES).map_err(map_err!(Table))?;
        match table.get(process_guid).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    /// List all processes, oldest first.
    pub fn list_processes(&self) -> StateResult<Vec<ProcessRecord>> {
        self.scan_processes(|_| true)
    }

    /// List the processes of one app, oldest first.
    pub fn list_processes_for_app(&self, app_guid: &str) -> StateResult<Vec<ProcessRecord>> {
        self.scan_processes(|p| p.app_guid == app_guid)
    }

    /// Find an app's process by type (e.g. "web").
    pub fn find_process(
        &self,
        app_guid: &str,
        process_type: &str,
    ) -> StateResult<Option<ProcessRecord>> {
        Ok(self
            .scan_processes(|p| p.app_guid == app_guid && p.process_type == process_type)?
            .into_iter()
            .next())
    }

    fn scan_processes(
        &self,
        keep: impl Fn(&ProcessRecord) -> bool,
    ) -> StateResult<Vec<ProcessRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(PROCESSES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let process: ProcessRecord = decode(value.value())?;
            if keep(&process) {
                results.push(process);
            }
        }
        results.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(results)
    }

    /// Apply a mutation to a process and commit it together with its effects.
    ///
    /// The process row, the audit event and (when requested) the outbox entry
    /// are written in one transaction: either all of them land or none do.
    /// `updated_at` is stamped here. If the mutated record breaks an
    /// invariant the transaction is abandoned and nothing is written.
    pub fn modify_process<F>(&self, process_guid: &str, apply: F) -> StateResult<ProcessRecord>
    where
        F: FnOnce(&mut ProcessRecord) -> Effects,
    {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let (process, event, enqueued) = {
            let mut processes = txn.open_table(PROCESSES).map_err(map_err!(Table))?;
            let mut process: ProcessRecord = {
                let guard = processes
                    .get(process_guid)
                    .map_err(map_err!(Read))?
                    .ok_or_else(|| StateError::NotFound(format!("process {process_guid}")))?;
                decode(guard.value())?
            };

            let effects = apply(&mut process);
            process.updated_at = Some(Utc::now());
            check(&process)?;

            let value = encode(&process)?;
            processes
                .insert(process_guid, value.as_slice())
                .map_err(map_err!(Write))?;

            let mut events = txn.open_table(EVENTS).map_err(map_err!(Table))?;
            let event_value = encode(&effects.event)?;
            events
                .insert(effects.event.table_key().as_str(), event_value.as_slice())
                .map_err(map_err!(Write))?;

            if effects.enqueue_sync {
                let pending = PendingSync {
                    process_guid: process.guid.clone(),
                    version: process.version.clone(),
                    enqueued_at: Utc::now(),
                    attempts: 0,
                    parked: None,
                };
                let mut outbox = txn.open_table(PENDING_SYNC).map_err(map_err!(Table))?;
                outbox
                    .insert(process_guid, encode(&pending)?.as_slice())
                    .map_err(map_err!(Write))?;
            }
            (process, effects.event, effects.enqueue_sync)
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(
            %process_guid,
            event_type = %event.event_type,
            version = %process.version,
            enqueued,
            "process change committed"
        );
        Ok(process)
    }

    // ── Events ─────────────────────────────────────────────────────

    /// Append an audit event that has no accompanying process mutation.
    pub fn append_event(&self, event: &AuditEvent) -> StateResult<()> {
        let key = event.table_key();
        let value = encode(event)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(EVENTS).map_err(map_err!(Table))?;
            if table.get(key.as_str()).map_err(map_err!(Read))?.is_some() {
                return Err(StateError::Conflict(format!("event {} already recorded", event.guid)));
            }
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(event_type = %event.event_type, actee = %event.actee, "audit event appended");
        Ok(())
    }

    /// All audit events in commit order.
    pub fn list_events(&self) -> StateResult<Vec<AuditEvent>> {
        self.scan_events(|_| true)
    }

    /// Audit events recorded for one actor, in commit order.
    pub fn list_events_for_actor(&self, actor: &str) -> StateResult<Vec<AuditEvent>> {
        self.scan_events(|e| e.actor == actor)
    }

    fn scan_events(&self, keep: impl Fn(&AuditEvent) -> bool) -> StateResult<Vec<AuditEvent>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(EVENTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let event: AuditEvent = decode(value.value())?;
            if keep(&event) {
                results.push(event);
            }
        }
        Ok(results)
    }

    // ── Convergence outbox ─────────────────────────────────────────

    /// Queue a desired-state update for a process at its current version,
    /// replacing any entry already queued or parked for it.
    pub fn enqueue_sync(&self, process_guid: &str) -> StateResult<PendingSync> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let pending = {
            let processes = txn.open_table(PROCESSES).map_err(map_err!(Table))?;
            let process: ProcessRecord = {
                let guard = processes
                    .get(process_guid)
                    .map_err(map_err!(Read))?
                    .ok_or_else(|| StateError::NotFound(format!("process {process_guid}")))?;
                decode(guard.value())?
            };
            let pending = PendingSync {
                process_guid: process.guid,
                version: process.version,
                enqueued_at: Utc::now(),
                attempts: 0,
                parked: None,
            };
            let mut outbox = txn.open_table(PENDING_SYNC).map_err(map_err!(Table))?;
            outbox
                .insert(process_guid, encode(&pending)?.as_slice())
                .map_err(map_err!(Write))?;
            pending
        };
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(pending)
    }

    pub fn get_pending_sync(&self, process_guid: &str) -> StateResult<Option<PendingSync>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(PENDING_SYNC).map_err(map_err!(Table))?;
        match table.get(process_guid).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    /// All undelivered updates, oldest first.
    pub fn list_pending_sync(&self) -> StateResult<Vec<PendingSync>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(PENDING_SYNC).map_err(map_err!(Table))?;
        let mut results: Vec<PendingSync> = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(decode(value.value())?);
        }
        results.sort_by(|a, b| a.enqueued_at.cmp(&b.enqueued_at));
        Ok(results)
    }

    /// Remove an outbox entry once the scheduler accepted `version`.
    ///
    /// An entry re-enqueued at a newer version is left in place. Returns true
    /// if the entry was removed.
    pub fn ack_sync(&self, process_guid: &str, version: &str) -> StateResult<bool> {
        self.update_pending(process_guid, version, |_| None)
    }

    /// Count a failed delivery attempt against an outbox entry.
    pub fn record_sync_attempt(&self, process_guid: &str, version: &str) -> StateResult<bool> {
        self.update_pending(process_guid, version, |mut pending| {
            pending.attempts += 1;
            Some(pending)
        })
    }

    /// Stop retrying an outbox entry whose delivery cannot succeed as is.
    pub fn park_sync(&self, process_guid: &str, version: &str, reason: &str) -> StateResult<bool> {
        self.update_pending(process_guid, version, |mut pending| {
            pending.attempts += 1;
            pending.parked = Some(reason.to_string());
            Some(pending)
        })
    }

    /// Drop an outbox entry regardless of version.
    pub fn discard_sync(&self, process_guid: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(PENDING_SYNC).map_err(map_err!(Table))?;
            existed = table.remove(process_guid).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    fn update_pending(
        &self,
        process_guid: &str,
        version: &str,
        change: impl FnOnce(PendingSync) -> Option<PendingSync>,
    ) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let touched = {
            let mut table = txn.open_table(PENDING_SYNC).map_err(map_err!(Table))?;
            let current: Option<PendingSync> = match table.get(process_guid).map_err(map_err!(Read))? {
                Some(guard) => Some(decode(guard.value())?),
                None => None,
            };
            match current {
                Some(pending) if pending.version == version => {
                    match change(pending) {
                        Some(updated) => {
                            table
                                .insert(process_guid, encode(&updated)?.as_slice())
                                .map_err(map_err!(Write))?;
                        }
                        None => {
                            table.remove(process_guid).map_err(map_err!(Write))?;
                        }
                    }
                    true
                }
                _ => false,
            }
        };
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(touched)
    }
}
