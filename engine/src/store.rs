//! Durable local store.
//!
//! Key-value persistence for cached snapshots and pending operation logs.
//! Every operation is synchronous and best-effort: a failing backend is
//! logged and reported as `false`/absent, never as an error, so the engine can
//! keep running purely in memory for the rest of the session.

use crate::{
    CacheEntry, CollectionSnapshot, OperationId, PendingOperation, Resource, ResourceKind,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Version of the pending log format. Logs with any other version are ignored.
pub const PENDING_LOG_FORMAT_VERSION: u32 = 1;

/// Failure of a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Raw key-value persistence.
pub trait Backend: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn write(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// In-process backend. Can be switched into a failing mode to simulate
/// storage pressure.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, String>>,
    failing: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Store a raw value, bypassing the failure switch.
    pub fn insert_raw(&self, key: impl Into<String>, value: impl Into<String>) {
        self.lock().insert(key.into(), value.into());
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("quota exceeded".into()))
        } else {
            Ok(())
        }
    }
}

impl Backend for MemoryBackend {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check()?;
        Ok(self.lock().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check()?;
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check()?;
        self.lock().remove(key);
        Ok(())
    }
}

/// One JSON file per key inside a cache directory.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Open (and create if needed) the cache directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl Backend for FileBackend {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Serialized pending operation list for one collection.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PendingLog {
    format_version: u32,
    ops: Vec<PendingOperation>,
}

/// Typed access to cached snapshots and pending logs.
///
/// Cheap to clone; clones share the same backend.
#[derive(Clone)]
pub struct LocalStore {
    backend: Arc<dyn Backend>,
}

impl LocalStore {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Persist a snapshot. Returns whether it was written.
    pub fn write_snapshot<R: Resource>(&self, snapshot: &CollectionSnapshot<R>) -> bool {
        let key = R::KIND.cache_key();
        match serde_json::to_string(&snapshot.to_cache_entry()) {
            Ok(raw) => self.put(&key, &raw),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to serialize snapshot");
                false
            }
        }
    }

    /// Read the cached snapshot, if a compatible one exists.
    pub fn read_snapshot<R: Resource>(&self) -> Option<CollectionSnapshot<R>> {
        let raw = self.get(&R::KIND.cache_key())?;
        CacheEntry::<R>::decode(&raw).map(CacheEntry::into_snapshot)
    }

    /// Append to the pending log of the operation's collection.
    pub fn append_pending_op(&self, op: &PendingOperation) -> bool {
        let mut ops = self.list_pending_ops(op.resource);
        ops.push(op.clone());
        self.write_pending(op.resource, ops)
    }

    /// Pending operations for a collection, oldest first.
    pub fn list_pending_ops(&self, kind: ResourceKind) -> Vec<PendingOperation> {
        let Some(raw) = self.get(&kind.pending_key()) else {
            return Vec::new();
        };
        match serde_json::from_str::<PendingLog>(&raw) {
            Ok(log) if log.format_version == PENDING_LOG_FORMAT_VERSION => log.ops,
            Ok(log) => {
                tracing::warn!(
                    resource = %kind,
                    format_version = log.format_version,
                    "Discarding incompatible pending log"
                );
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(resource = %kind, error = %e, "Discarding unreadable pending log");
                Vec::new()
            }
        }
    }

    /// Remove one operation from a collection's pending log.
    pub fn remove_pending_op(&self, kind: ResourceKind, op_id: &OperationId) -> bool {
        let mut ops = self.list_pending_ops(kind);
        ops.retain(|op| &op.op_id != op_id);
        self.write_pending(kind, ops)
    }

    fn write_pending(&self, kind: ResourceKind, ops: Vec<PendingOperation>) -> bool {
        let key = kind.pending_key();
        if ops.is_empty() {
            return match self.backend.delete(&key) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Local store delete failed");
                    false
                }
            };
        }
        let log = PendingLog {
            format_version: PENDING_LOG_FORMAT_VERSION,
            ops,
        };
        match serde_json::to_string(&log) {
            Ok(raw) => self.put(&key, &raw),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to serialize pending log");
                false
            }
        }
    }

    fn get(&self, key: &str) -> Option<String> {
        match self.backend.read(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Local store read failed");
                None
            }
        }
    }

    fn put(&self, key: &str, value: &str) -> bool {
        match self.backend.write(key, value) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Local store write failed");
                false
            }
        }
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Notification, Patch};

    fn notification(id: i64) -> Notification {
        Notification {
            id,
            plant_id: None,
            title: "Water due".into(),
            message: String::new(),
            is_read: false,
            created_at: None,
        }
    }

    #[test]
    fn snapshot_round_trip() {
        let store = LocalStore::in_memory();
        assert!(store.read_snapshot::<Notification>().is_none());

        let snapshot = CollectionSnapshot::from_records(vec![notification(1)]);
        assert!(store.write_snapshot(&snapshot));
        assert_eq!(store.read_snapshot::<Notification>(), Some(snapshot));
    }

    #[test]
    fn pending_log_keeps_order() {
        let store = LocalStore::in_memory();
        let first = PendingOperation::update(
            ResourceKind::Notifications,
            5,
            Patch::new().set("title", "a"),
        );
        let second = PendingOperation::delete(ResourceKind::Notifications, 5);
        store.append_pending_op(&first);
        store.append_pending_op(&second);

        let ops = store.list_pending_ops(ResourceKind::Notifications);
        assert_eq!(ops, vec![first.clone(), second.clone()]);
        assert!(store.list_pending_ops(ResourceKind::Plants).is_empty());

        store.remove_pending_op(ResourceKind::Notifications, &first.op_id);
        assert_eq!(
            store.list_pending_ops(ResourceKind::Notifications),
            vec![second]
        );
    }

    #[test]
    fn corrupt_entries_are_absent() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert_raw("cache.notifications", "{\"records\": 12}");
        backend.insert_raw("pending.notifications", "[");
        let store = LocalStore::new(backend);

        assert!(store.read_snapshot::<Notification>().is_none());
        assert!(store
            .list_pending_ops(ResourceKind::Notifications)
            .is_empty());
    }

    #[test]
    fn failing_backend_never_errors() {
        let backend = Arc::new(MemoryBackend::new());
        let store = LocalStore::new(backend.clone());
        backend.set_failing(true);

        let snapshot = CollectionSnapshot::from_records(vec![notification(1)]);
        assert!(!store.write_snapshot(&snapshot));
        assert!(store.read_snapshot::<Notification>().is_none());
        assert!(!store.append_pending_op(&PendingOperation::delete(
            ResourceKind::Notifications,
            1
        )));

        backend.set_failing(false);
        assert!(store.write_snapshot(&snapshot));
    }

    #[test]
    fn file_backend_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = CollectionSnapshot::from_records(vec![notification(3)]);

        {
            let store = LocalStore::new(Arc::new(FileBackend::open(dir.path()).unwrap()));
            assert!(store.write_snapshot(&snapshot));
        }

        let store = LocalStore::new(Arc::new(FileBackend::open(dir.path()).unwrap()));
        assert_eq!(store.read_snapshot::<Notification>(), Some(snapshot));
    }

    #[test]
    fn file_backend_delete_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        assert!(backend.delete("nothing").is_ok());
        assert_eq!(backend.read("nothing").unwrap(), None);
    }
}
