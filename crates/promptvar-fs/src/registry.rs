//! Registry of live handles keyed by stable string ids.
//!
//! Live handles are never serialized. Their metadata (name, kind, timestamp
//! and an optional provider locator) goes through a [`RegistryStore`] so a
//! later session can list, look up and, where the provider allows,
//! rehydrate them.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use promptvar_core::{
    Clock, FsError, FsResult, HandleKind, HandleRef, SharedHandle, SystemClock,
};

/// Metadata kept for a registered handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHandleRegistryEntry {
    /// Registry id.
    pub id: String,
    /// Handle display name.
    pub name: CompactString,
    /// File or directory.
    pub kind: HandleKind,
    /// When the handle was registered.
    pub timestamp: DateTime<Utc>,
    /// Provider locator able to reopen the handle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
}

/// Durable storage for registry metadata.
pub trait RegistryStore: fmt::Debug + Send + Sync {
    /// Load all persisted entries.
    fn load(&self) -> FsResult<Vec<FileHandleRegistryEntry>>;

    /// Replace the persisted entries.
    fn save(&self, entries: &[FileHandleRegistryEntry]) -> FsResult<()>;
}

/// Store that keeps nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRegistryStore;

impl RegistryStore for NoopRegistryStore {
    fn load(&self) -> FsResult<Vec<FileHandleRegistryEntry>> {
        Ok(Vec::new())
    }

    fn save(&self, _entries: &[FileHandleRegistryEntry]) -> FsResult<()> {
        Ok(())
    }
}

/// Store backed by a JSON file.
#[derive(Debug)]
pub struct JsonRegistryStore {
    path: PathBuf,
    // Serializes writers within this process.
    write_lock: Mutex<()>,
}

impl JsonRegistryStore {
    /// Store at an explicit path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Default location in the user data directory.
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("promptvar")
            .join("handles.json")
    }

    /// Store at [`Self::default_path`].
    pub fn at_default_path() -> Self {
        Self::new(Self::default_path())
    }

    /// The backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RegistryStore for JsonRegistryStore {
    fn load(&self) -> FsResult<Vec<FileHandleRegistryEntry>> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(FsError::registry(format!(
                    "cannot read {}: {err}",
                    self.path.display()
                )));
            }
        };
        serde_json::from_str(&data).map_err(|err| {
            FsError::registry(format!("corrupt registry {}: {err}", self.path.display()))
        })
    }

    fn save(&self, entries: &[FileHandleRegistryEntry]) -> FsResult<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| {
                FsError::registry(format!("cannot create {}: {err}", parent.display()))
            })?;
        }
        let json = serde_json::to_string_pretty(entries)
            .map_err(|err| FsError::registry(err.to_string()))?;

        // Write to a sibling then rename, so readers never see half a file.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .and_then(|()| std::fs::rename(&tmp, &self.path))
            .map_err(|err| {
                FsError::registry(format!("cannot write {}: {err}", self.path.display()))
            })
    }
}

/// Opens a live handle from a persisted entry.
pub type HandleOpener<'a> = dyn Fn(&FileHandleRegistryEntry) -> FsResult<SharedHandle> + 'a;

/// Maps registry ids to live handles.
pub struct HandleRegistry {
    live: DashMap<String, SharedHandle>,
    metadata: DashMap<String, FileHandleRegistryEntry>,
    store: Arc<dyn RegistryStore>,
    clock: Arc<dyn Clock>,
    counter: AtomicU64,
}

impl fmt::Debug for HandleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("live", &self.live.len())
            .field("entries", &self.metadata.len())
            .field("store", &self.store)
            .finish()
    }
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl HandleRegistry {
    /// A registry that persists nothing.
    pub fn in_memory() -> Self {
        Self {
            live: DashMap::new(),
            metadata: DashMap::new(),
            store: Arc::new(NoopRegistryStore),
            clock: Arc::new(SystemClock),
            counter: AtomicU64::new(0),
        }
    }

    /// Open a registry over `store`, loading persisted metadata.
    pub fn open(store: Arc<dyn RegistryStore>, clock: Arc<dyn Clock>) -> FsResult<Self> {
        let metadata = DashMap::new();
        for entry in store.load()? {
            metadata.insert(entry.id.clone(), entry);
        }
        tracing::debug!(entries = metadata.len(), "opened handle registry");
        Ok(Self {
            live: DashMap::new(),
            metadata,
            store,
            clock,
            counter: AtomicU64::new(0),
        })
    }

    fn persist(&self) -> FsResult<()> {
        let entries = self.entries();
        self.store.save(&entries)
    }

    /// Register a live handle and return its id.
    ///
    /// Ids have the form `{kind}-{name}-{millis}-{n}` and are unique per
    /// process.
    pub fn register_handle(&self, handle: SharedHandle) -> FsResult<String> {
        let now = self.clock.now();
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let kind = handle.kind();
        let id = format!("{kind}-{}-{}-{n}", handle.name(), now.timestamp_millis());

        let entry = FileHandleRegistryEntry {
            id: id.clone(),
            name: CompactString::from(handle.name()),
            kind,
            timestamp: now,
            locator: handle.locator(),
        };
        self.metadata.insert(id.clone(), entry);
        self.live.insert(id.clone(), handle);
        if let Err(e) = self.persist() {
            self.live.remove(&id);
            self.metadata.remove(&id);
            return Err(e);
        }

        tracing::debug!(%id, "registered handle");
        Ok(id)
    }

    /// Look up a live handle by id.
    pub fn get_handle(&self, id: &str) -> Option<SharedHandle> {
        self.live.get(id).map(|h| Arc::clone(h.value()))
    }

    /// Metadata for an id.
    pub fn entry(&self, id: &str) -> Option<FileHandleRegistryEntry> {
        self.metadata.get(id).map(|e| e.value().clone())
    }

    /// Remove a handle and its metadata. Returns whether it existed.
    pub fn remove_handle(&self, id: &str) -> FsResult<bool> {
        let had_live = self.live.remove(id).is_some();
        let had_meta = self.metadata.remove(id).is_some();
        if had_meta {
            self.persist()?;
        }
        Ok(had_live || had_meta)
    }

    /// Forget every handle.
    pub fn clear_handles(&self) -> FsResult<()> {
        self.live.clear();
        self.metadata.clear();
        self.persist()
    }

    /// All metadata entries, oldest first.
    pub fn entries(&self) -> Vec<FileHandleRegistryEntry> {
        let mut entries: Vec<_> = self.metadata.iter().map(|e| e.value().clone()).collect();
        entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        entries
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    /// Check if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    /// Most recently registered live handle with this name and kind.
    pub fn find_by_name(&self, name: &str, kind: HandleKind) -> Option<SharedHandle> {
        self.metadata
            .iter()
            .filter(|e| e.name == name && e.kind == kind && self.live.contains_key(e.key()))
            .max_by(|a, b| {
                a.timestamp
                    .cmp(&b.timestamp)
                    .then_with(|| a.id.cmp(&b.id))
            })
            .and_then(|e| self.get_handle(e.key()))
    }

    /// Resolve a reference to a live handle: by id first, then by name.
    pub fn reacquire(
        &self,
        handle_ref: &HandleRef,
        name: &str,
        kind: HandleKind,
    ) -> Option<SharedHandle> {
        handle_ref
            .id
            .as_deref()
            .and_then(|id| self.get_handle(id))
            .filter(|h| h.kind() == kind)
            .or_else(|| self.find_by_name(name, kind))
    }

    /// Reopen live handles for persisted entries using `opener`.
    ///
    /// Entries that fail to open stay as metadata only. Returns the number
    /// of handles made live.
    pub fn rehydrate(&self, opener: &HandleOpener<'_>) -> usize {
        let mut opened = 0;
        for entry in self.entries() {
            if self.live.contains_key(&entry.id) {
                continue;
            }
            match opener(&entry) {
                Ok(handle) => {
                    self.live.insert(entry.id.clone(), handle);
                    opened += 1;
                }
                Err(err) => {
                    tracing::warn!(id = %entry.id, "could not reopen handle: {err}");
                }
            }
        }
        opened
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryHandle;
    use promptvar_core::ManualClock;

    fn registry() -> (HandleRegistry, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let registry = HandleRegistry::open(Arc::new(NoopRegistryStore), clock.clone()).unwrap();
        (registry, clock)
    }

    #[test]
    fn test_register_and_get() {
        let (registry, _) = registry();
        let handle: SharedHandle = Arc::new(MemoryHandle::file("a.md", "x"));
        let id = registry.register_handle(handle).unwrap();

        assert!(id.starts_with("file-a.md-"));
        assert_eq!(registry.get_handle(&id).unwrap().name(), "a.md");
        assert_eq!(registry.entry(&id).unwrap().kind, HandleKind::File);
    }

    #[test]
    fn test_ids_are_unique_at_same_instant() {
        let (registry, _) = registry();
        let a = registry
            .register_handle(Arc::new(MemoryHandle::file("a.md", "")))
            .unwrap();
        let b = registry
            .register_handle(Arc::new(MemoryHandle::file("a.md", "")))
            .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_find_by_name_prefers_most_recent() {
        let (registry, clock) = registry();
        registry
            .register_handle(Arc::new(MemoryHandle::file("a.md", "old")))
            .unwrap();
        clock.advance(chrono::Duration::seconds(5));
        let newer: SharedHandle = Arc::new(MemoryHandle::file("a.md", "new"));
        let identity = newer.identity().to_string();
        registry.register_handle(newer).unwrap();

        let found = registry.find_by_name("a.md", HandleKind::File).unwrap();
        assert_eq!(found.identity(), identity);
        assert!(registry.find_by_name("a.md", HandleKind::Directory).is_none());
    }

    #[test]
    fn test_reacquire_falls_back_to_name() {
        let (registry, _) = registry();
        let id = registry
            .register_handle(Arc::new(MemoryHandle::file("a.md", "")))
            .unwrap();

        let by_id = HandleRef::registered(id);
        assert!(registry.reacquire(&by_id, "a.md", HandleKind::File).is_some());

        let stale = HandleRef::registered("file-a.md-0-99");
        assert!(registry.reacquire(&stale, "a.md", HandleKind::File).is_some());
        assert!(registry.reacquire(&stale, "b.md", HandleKind::File).is_none());
    }

    #[derive(Debug)]
    struct FailingStore;

    impl RegistryStore for FailingStore {
        fn load(&self) -> FsResult<Vec<FileHandleRegistryEntry>> {
            Ok(Vec::new())
        }

        fn save(&self, _entries: &[FileHandleRegistryEntry]) -> FsResult<()> {
            Err(FsError::registry("disk full"))
        }
    }

    #[test]
    fn test_failed_persist_leaves_no_entry() {
        let clock = Arc::new(ManualClock::default());
        let registry = HandleRegistry::open(Arc::new(FailingStore), clock).unwrap();

        let err = registry
            .register_handle(Arc::new(MemoryHandle::file("a.md", "x")))
            .unwrap_err();
        assert!(matches!(err, FsError::Registry { .. }));
        assert!(registry.is_empty());
        assert!(registry.entries().is_empty());
        assert!(registry.find_by_name("a.md", HandleKind::File).is_none());
    }

    #[test]
    fn test_remove_and_clear() {
        let (registry, _) = registry();
        let id = registry
            .register_handle(Arc::new(MemoryHandle::file("a.md", "")))
            .unwrap();
        assert!(registry.remove_handle(&id).unwrap());
        assert!(!registry.remove_handle(&id).unwrap());

        registry
            .register_handle(Arc::new(MemoryHandle::file("b.md", "")))
            .unwrap();
        registry.clear_handles().unwrap();
        assert!(registry.is_empty());
    }
}
