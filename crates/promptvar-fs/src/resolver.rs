//! Turns file and directory variable entries into text.
//!
//! A resolve pass runs in three steps: stale handles are reacquired through
//! the registry, read access is verified for every distinct handle, then all
//! readable handles are fetched through the cache in one bounded batch.
//! Failures are never raised; the entry is simply left without content and
//! [`FileResolver::diagnose`] explains why.

use std::collections::HashMap;
use std::sync::Arc;

use promptvar_core::{
    AccessMode, FileSystemHandle, FsError, FsResult, HandleEntry, HandleKind, PermissionState,
    ResolverConfig, SharedHandle, VariableEntry,
};

use crate::batch::{execute_batch, task, BatchOptions, BatchTask};
use crate::cache::{CacheKey, HandleCache};
use crate::diagnostics::{DiagnosisIssue, EntryDiagnosis};
use crate::listing::format_listing;
use crate::permission::PermissionGate;
use crate::registry::HandleRegistry;

/// Per-call resolve switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Read through the cache.
    pub use_cache: bool,
    /// Skip cached results for this call; fresh results are still stored.
    pub force_reacquire: bool,
    /// Re-resolve stale handles through the registry.
    pub auto_reacquire_handles: bool,
}

impl ResolveOptions {
    /// Options matching a resolver configuration.
    pub fn from_config(config: &ResolverConfig) -> Self {
        Self {
            use_cache: config.use_cache,
            force_reacquire: false,
            auto_reacquire_handles: config.auto_reacquire_handles,
        }
    }

    /// Bypass cached reads for this call.
    pub fn forced(mut self) -> Self {
        self.force_reacquire = true;
        self
    }
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self::from_config(&ResolverConfig::default())
    }
}

/// Resolves file and directory entries with permission checks, caching and
/// bounded concurrency.
#[derive(Debug, Clone)]
pub struct FileResolver {
    gate: PermissionGate,
    cache: Arc<HandleCache<String>>,
    registry: Arc<HandleRegistry>,
    config: ResolverConfig,
}

fn handle_entries_mut(
    entries: &mut [VariableEntry],
) -> impl Iterator<Item = (HandleKind, &mut HandleEntry)> {
    entries.iter_mut().filter_map(|entry| {
        let kind = entry.handle_kind()?;
        entry.handle_entry_mut().map(|handle| (kind, handle))
    })
}

fn handle_entries(entries: &[VariableEntry]) -> impl Iterator<Item = (HandleKind, &HandleEntry)> {
    entries.iter().filter_map(|entry| {
        let kind = entry.handle_kind()?;
        entry.handle_entry().map(|handle| (kind, handle))
    })
}

impl FileResolver {
    /// Create a resolver over explicitly constructed collaborators.
    pub fn new(
        gate: PermissionGate,
        cache: Arc<HandleCache<String>>,
        registry: Arc<HandleRegistry>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            gate,
            cache,
            registry,
            config,
        }
    }

    /// The permission gate.
    pub fn gate(&self) -> &PermissionGate {
        &self.gate
    }

    /// The content cache.
    pub fn cache(&self) -> &Arc<HandleCache<String>> {
        &self.cache
    }

    /// The handle registry.
    pub fn registry(&self) -> &Arc<HandleRegistry> {
        &self.registry
    }

    /// The resolver configuration.
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Default per-call options for this resolver.
    pub fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions::from_config(&self.config)
    }

    /// Resolve every file and directory entry in place.
    ///
    /// Returns true when every handle entry ended up with content. Text
    /// entries are left alone.
    pub async fn resolve_all(&self, entries: &mut [VariableEntry], options: &ResolveOptions) -> bool {
        if options.auto_reacquire_handles {
            self.reacquire_stale(entries).await;
        }

        let grants = self.check_permissions(entries).await;

        let mut targets: Vec<usize> = Vec::new();
        let mut ops: Vec<BatchTask<'_, String>> = Vec::new();

        for (index, entry) in entries.iter_mut().enumerate() {
            let Some(kind) = entry.handle_kind() else {
                continue;
            };
            let Some(handle_entry) = entry.handle_entry_mut() else {
                continue;
            };
            handle_entry.content = None;

            let Some(handle) = handle_entry.value.handle.clone() else {
                tracing::debug!(entry = %handle_entry.name, "no live handle");
                continue;
            };
            if !grants.get(handle.identity()).copied().unwrap_or(false) {
                continue;
            }

            targets.push(index);
            ops.push(task(move || self.fetch(handle, kind, *options)));
        }

        let batch = BatchOptions::concurrent(self.config.max_concurrent_reads).continue_on_error(true);
        let result = execute_batch(ops, &batch).await;

        for failed in &result.failed_operations {
            tracing::warn!(error = %failed.error, "could not resolve variable entry");
        }
        for (index, content) in targets.into_iter().zip(result.results) {
            if let Some(handle_entry) = entries[index].handle_entry_mut() {
                handle_entry.content = content;
            }
        }

        handle_entries(entries).all(|(_, entry)| entry.is_resolved())
    }

    /// Request read access for every distinct handle referenced by
    /// `entries`. Every handle is tried even after a refusal.
    pub async fn ensure_file_permissions(&self, entries: &[VariableEntry]) -> bool {
        let grants = self.check_permissions(entries).await;
        let all_live = handle_entries(entries).all(|(_, e)| e.value.handle.is_some());
        all_live && grants.values().all(|granted| *granted)
    }

    /// Inspect each file and directory entry without prompting or mutating.
    ///
    /// Intended after a failed [`Self::resolve_all`]: a reachable, granted
    /// entry that still has no content is reported as a failed read.
    pub async fn diagnose(&self, entries: &[VariableEntry]) -> Vec<EntryDiagnosis> {
        let mut report = Vec::new();
        for (kind, entry) in handle_entries(entries) {
            let handle = entry
                .value
                .handle
                .clone()
                .or_else(|| self.registry.reacquire(&entry.value, &entry.name, kind));
            report.push(self.diagnose_entry(kind, entry, handle).await);
        }
        report
    }

    async fn diagnose_entry(
        &self,
        kind: HandleKind,
        entry: &HandleEntry,
        handle: Option<SharedHandle>,
    ) -> EntryDiagnosis {
        let mut diagnosis = EntryDiagnosis {
            name: entry.name.clone(),
            kind,
            handle_available: handle.is_some(),
            exists: false,
            permission: None,
            issue: None,
        };

        let Some(handle) = handle else {
            diagnosis.issue = Some(DiagnosisIssue::MissingHandle);
            return diagnosis;
        };

        diagnosis.exists = handle.exists().await;
        if !diagnosis.exists {
            diagnosis.issue = Some(DiagnosisIssue::NotFound);
            return diagnosis;
        }

        diagnosis.issue = match self.gate.query(handle.as_ref(), AccessMode::Read).await {
            Ok(state) => {
                diagnosis.permission = Some(state);
                match state {
                    PermissionState::Denied => Some(DiagnosisIssue::PermissionDenied),
                    PermissionState::Prompt => Some(DiagnosisIssue::PermissionPrompt),
                    PermissionState::Granted if !entry.is_resolved() => {
                        Some(DiagnosisIssue::ReadFailed)
                    }
                    PermissionState::Granted => None,
                }
            }
            Err(err) if err.is_capability() => Some(DiagnosisIssue::CapabilityUnavailable),
            Err(err) if err.is_permission_denied() => Some(DiagnosisIssue::PermissionDenied),
            Err(FsError::NotFound { .. }) => {
                diagnosis.exists = false;
                Some(DiagnosisIssue::NotFound)
            }
            Err(_) => Some(DiagnosisIssue::ReadFailed),
        };
        diagnosis
    }

    /// Verify read access once per handle identity.
    async fn check_permissions(&self, entries: &[VariableEntry]) -> HashMap<String, bool> {
        let mut grants: HashMap<String, bool> = HashMap::new();
        for (_, entry) in handle_entries(entries) {
            let Some(handle) = &entry.value.handle else {
                continue;
            };
            if grants.contains_key(handle.identity()) {
                continue;
            }
            let granted = match self.gate.verify(handle.as_ref(), AccessMode::Read, true).await {
                Ok(granted) => granted,
                Err(err) => {
                    tracing::warn!(entry = %entry.name, "permission check failed: {err}");
                    false
                }
            };
            grants.insert(handle.identity().to_string(), granted);
        }
        grants
    }

    async fn reacquire_stale(&self, entries: &mut [VariableEntry]) {
        for (kind, entry) in handle_entries_mut(entries) {
            let stale = match &entry.value.handle {
                Some(handle) => !handle.exists().await,
                None => true,
            };
            if !stale {
                continue;
            }

            match self.registry.reacquire(&entry.value, &entry.name, kind) {
                Some(fresh) if fresh.exists().await => {
                    tracing::debug!(entry = %entry.name, "reacquired stale handle");
                    entry.value.handle = Some(fresh);
                }
                _ => tracing::debug!(entry = %entry.name, "stale handle could not be reacquired"),
            }
        }
    }

    fn cache_key(&self, handle: &dyn FileSystemHandle, kind: HandleKind) -> CacheKey {
        match kind {
            HandleKind::File => CacheKey::for_handle(handle, &self.config.read),
            HandleKind::Directory => CacheKey::for_handle(handle, &self.config.list),
        }
    }

    async fn fetch(
        &self,
        handle: SharedHandle,
        kind: HandleKind,
        options: ResolveOptions,
    ) -> FsResult<String> {
        let key = self.cache_key(handle.as_ref(), kind);
        if options.use_cache && !options.force_reacquire {
            if let Some(hit) = self.cache.get(&key) {
                return Ok(hit);
            }
        }

        let content = match kind {
            HandleKind::File => {
                let bytes = handle.read_bytes().await?;
                self.config.read.decode(handle.name(), bytes)?
            }
            HandleKind::Directory => {
                let listing = handle.list(self.config.list.clone()).await?;
                format_listing(&listing)
            }
        };

        if options.use_cache {
            self.cache.set(key, content.clone(), None);
        }
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryHandle;
    use promptvar_core::{CacheConfig, HandleRef};

    fn resolver() -> FileResolver {
        FileResolver::new(
            PermissionGate::new(),
            Arc::new(HandleCache::new(CacheConfig::default())),
            Arc::new(HandleRegistry::in_memory()),
            ResolverConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_resolves_files_and_directories() {
        let resolver = resolver();
        let dir = MemoryHandle::directory("docs").with_child(MemoryHandle::file("a.md", ""));
        let mut entries = vec![
            VariableEntry::text("intro"),
            VariableEntry::file(Arc::new(MemoryHandle::file("a.txt", "abc"))),
            VariableEntry::directory(Arc::new(dir)),
        ];

        assert!(resolver.resolve_all(&mut entries, &ResolveOptions::default()).await);
        assert_eq!(entries[1].materialized(), Some("abc"));
        assert_eq!(entries[2].materialized(), Some("a.md"));
    }

    #[tokio::test]
    async fn test_cache_serves_repeat_reads() {
        let resolver = resolver();
        let file = Arc::new(MemoryHandle::file("a.txt", "v1"));
        let mut entries = vec![VariableEntry::file(file.clone())];

        resolver.resolve_all(&mut entries, &ResolveOptions::default()).await;
        file.set_content("v2");
        resolver.resolve_all(&mut entries, &ResolveOptions::default()).await;
        assert_eq!(entries[0].materialized(), Some("v1"));
        assert_eq!(file.read_count(), 1);

        let forced = ResolveOptions::default().forced();
        resolver.resolve_all(&mut entries, &forced).await;
        assert_eq!(entries[0].materialized(), Some("v2"));
        // The forced read refreshed the cache.
        resolver.resolve_all(&mut entries, &ResolveOptions::default()).await;
        assert_eq!(file.read_count(), 2);
    }

    #[tokio::test]
    async fn test_denied_entry_is_left_unresolved() {
        let resolver = resolver();
        let denied = Arc::new(MemoryHandle::file("b.txt", "b").with_permission(PermissionState::Denied));
        let mut entries = vec![
            VariableEntry::file(Arc::new(MemoryHandle::file("a.txt", "a"))),
            VariableEntry::file(denied.clone()),
        ];

        assert!(!resolver.resolve_all(&mut entries, &ResolveOptions::default()).await);
        assert_eq!(entries[0].materialized(), Some("a"));
        assert_eq!(entries[1].materialized(), None);
        assert_eq!(denied.read_count(), 0);

        let report = resolver.diagnose(&entries).await;
        assert!(report[0].is_healthy());
        assert_eq!(report[1].issue, Some(DiagnosisIssue::PermissionDenied));
    }

    #[tokio::test]
    async fn test_permissions_checked_once_per_identity() {
        let resolver = resolver();
        let _gesture = resolver.gate().user_gesture();
        let shared = Arc::new(MemoryHandle::file("a.txt", "a").with_permission(PermissionState::Prompt));
        let entries = vec![VariableEntry::file(shared.clone()), VariableEntry::file(shared.clone())];

        assert!(resolver.ensure_file_permissions(&entries).await);
        assert_eq!(shared.request_count(), 1);
    }

    #[tokio::test]
    async fn test_ensure_collects_all_refusals() {
        let resolver = resolver();
        let _gesture = resolver.gate().user_gesture();
        let refused = Arc::new(
            MemoryHandle::file("a.txt", "a")
                .with_permission(PermissionState::Prompt)
                .with_request_answer(PermissionState::Denied),
        );
        let pending =
            Arc::new(MemoryHandle::file("b.txt", "b").with_permission(PermissionState::Prompt));
        let entries = vec![
            VariableEntry::file(refused.clone()),
            VariableEntry::file(pending.clone()),
        ];

        assert!(!resolver.ensure_file_permissions(&entries).await);
        // The first refusal did not stop the second request.
        assert_eq!(refused.request_count(), 1);
        assert_eq!(pending.request_count(), 1);
    }

    #[tokio::test]
    async fn test_stale_handle_is_reacquired_from_registry() {
        let resolver = resolver();
        let fresh: SharedHandle = Arc::new(MemoryHandle::file("a.md", "fresh"));
        let id = resolver.registry().register_handle(fresh).unwrap();

        let gone = Arc::new(MemoryHandle::file("a.md", "old").missing());
        let mut entries = vec![VariableEntry::File(HandleEntry::new(
            "a.md",
            HandleRef::live(gone).with_id(id),
        ))];

        assert!(resolver.resolve_all(&mut entries, &ResolveOptions::default()).await);
        assert_eq!(entries[0].materialized(), Some("fresh"));

        let mut no_reacquire = vec![VariableEntry::file(Arc::new(
            MemoryHandle::file("x.md", "").missing(),
        ))];
        let options = ResolveOptions {
            auto_reacquire_handles: false,
            ..ResolveOptions::default()
        };
        assert!(!resolver.resolve_all(&mut no_reacquire, &options).await);
        let report = resolver.diagnose(&no_reacquire).await;
        assert_eq!(report[0].issue, Some(DiagnosisIssue::NotFound));
    }

    #[tokio::test]
    async fn test_diagnose_never_prompts() {
        let resolver = resolver();
        let _gesture = resolver.gate().user_gesture();
        let handle = Arc::new(MemoryHandle::file("a.txt", "a").with_permission(PermissionState::Prompt));
        let entries = vec![
            VariableEntry::file(handle.clone()),
            VariableEntry::File(HandleEntry::new("lost.md", Default::default())),
        ];

        let report = resolver.diagnose(&entries).await;
        assert_eq!(report[0].issue, Some(DiagnosisIssue::PermissionPrompt));
        assert_eq!(report[1].issue, Some(DiagnosisIssue::MissingHandle));
        assert!(!report[1].handle_available);
        assert_eq!(handle.request_count(), 0);
    }
}
