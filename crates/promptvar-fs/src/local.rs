//! Handles backed by the local filesystem.
//!
//! The operating system has no per-handle consent model, so grants live in a
//! shared [`GrantTable`]. Its [`ConsentPolicy`] stands in for the user's answer
//! when a request is made during a gesture.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use jwalk::{Parallelism, WalkDir};
use serde::{Deserialize, Serialize};

use promptvar_core::{
    AccessMode, BoxFuture, DirectoryEntry, FileSystemHandle, FsError, FsResult, HandleKind,
    ListOptions, PermissionState, SharedHandle,
};

use crate::listing::ListFilter;

/// How permission requests on local handles are answered.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ConsentPolicy {
    /// Grant every request.
    #[default]
    GrantAll,
    /// Grant reads, decline writes.
    ReadOnly,
    /// Decline every request.
    DenyAll,
}

impl ConsentPolicy {
    fn answer(self, mode: AccessMode) -> PermissionState {
        match (self, mode) {
            (Self::GrantAll, _) | (Self::ReadOnly, AccessMode::Read) => PermissionState::Granted,
            _ => PermissionState::Denied,
        }
    }
}

/// Permission decisions recorded per handle identity.
#[derive(Debug, Default)]
pub struct GrantTable {
    grants: DashMap<(String, AccessMode), PermissionState>,
    policy: ConsentPolicy,
}

impl GrantTable {
    /// Create a table answering requests with `policy`.
    pub fn new(policy: ConsentPolicy) -> Self {
        Self {
            grants: DashMap::new(),
            policy,
        }
    }

    /// The consent policy.
    pub fn policy(&self) -> ConsentPolicy {
        self.policy
    }

    /// Recorded state for `identity`, if any.
    pub fn state(&self, identity: &str, mode: AccessMode) -> Option<PermissionState> {
        let write_granted = self
            .grants
            .get(&(identity.to_string(), AccessMode::ReadWrite))
            .is_some_and(|s| s.is_granted());
        if write_granted {
            return Some(PermissionState::Granted);
        }
        self.grants.get(&(identity.to_string(), mode)).map(|s| *s)
    }

    /// Record a grant without asking.
    pub fn grant(&self, identity: &str, mode: AccessMode) {
        self.grants
            .insert((identity.to_string(), mode), PermissionState::Granted);
    }

    /// Forget all decisions for `identity`.
    pub fn revoke(&self, identity: &str) {
        self.grants.retain(|(id, _), _| id != identity);
    }

    fn request(&self, identity: &str, mode: AccessMode) -> PermissionState {
        let answer = self.policy.answer(mode);
        self.grants.insert((identity.to_string(), mode), answer);
        answer
    }
}

/// A file or directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalHandle {
    path: PathBuf,
    kind: HandleKind,
    name: String,
    identity: String,
    grants: Arc<GrantTable>,
}

async fn blocking<T, F>(name: &str, f: F) -> FsResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> FsResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| FsError::read(name, io::Error::other(e)))?
}

impl LocalHandle {
    /// Open the file or directory at `path`.
    pub fn open(path: impl AsRef<Path>, grants: Arc<GrantTable>) -> FsResult<Self> {
        let requested = path.as_ref();
        let display = requested.display().to_string();
        let path = requested
            .canonicalize()
            .map_err(|e| FsError::read(&display, e))?;
        let metadata = std::fs::metadata(&path).map_err(|e| FsError::read(&display, e))?;

        let kind = if metadata.is_dir() {
            HandleKind::Directory
        } else {
            HandleKind::File
        };
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            identity: path.display().to_string(),
            path,
            kind,
            name,
            grants,
        })
    }

    /// Open and share.
    pub fn shared(path: impl AsRef<Path>, grants: Arc<GrantTable>) -> FsResult<SharedHandle> {
        Ok(Arc::new(Self::open(path, grants)?))
    }

    /// Canonical path of the handle.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn expect_kind(&self, expected: HandleKind) -> FsResult<()> {
        if self.kind == expected {
            Ok(())
        } else {
            Err(FsError::KindMismatch {
                name: self.name.clone(),
                expected,
                actual: self.kind,
            })
        }
    }

    fn child_path(&self, name: &str) -> FsResult<PathBuf> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(std::path::Component::Normal(_)), None) => Ok(self.path.join(name)),
            _ => Err(FsError::InvalidOptions {
                message: format!("'{name}' is not a plain entry name"),
            }),
        }
    }
}

fn walk(root: &Path, filter: &ListFilter) -> FsResult<Vec<DirectoryEntry>> {
    let name = root.display().to_string();
    let walker = WalkDir::new(root)
        .parallelism(Parallelism::Serial)
        .sort(true)
        // Hidden entries are filtered by `ListFilter` on the relative path.
        .skip_hidden(false)
        .min_depth(1)
        .max_depth(filter.max_depth());

    let mut entries = Vec::new();
    let mut pruned: Vec<String> = Vec::new();

    for entry in walker {
        let entry = entry.map_err(|err| {
            let source = err
                .io_error()
                .map(|e| io::Error::new(e.kind(), err.to_string()))
                .unwrap_or_else(|| io::Error::other(err.to_string()));
            FsError::read(&name, source)
        })?;

        let path = entry.path();
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if pruned
            .iter()
            .any(|prefix| relative.starts_with(prefix.as_str()))
        {
            continue;
        }

        let kind = if entry.file_type().is_dir() {
            HandleKind::Directory
        } else {
            HandleKind::File
        };
        if !filter.accepts(&relative, entry.depth()) {
            if kind == HandleKind::Directory {
                pruned.push(format!("{relative}/"));
            }
            continue;
        }
        entries.push(DirectoryEntry::new(relative, kind, entry.depth()));
    }

    Ok(entries)
}

impl FileSystemHandle for LocalHandle {
    fn kind(&self) -> HandleKind {
        self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn identity(&self) -> &str {
        &self.identity
    }

    fn locator(&self) -> Option<String> {
        Some(self.path.display().to_string())
    }

    fn query_permission(&self, mode: AccessMode) -> BoxFuture<'_, FsResult<PermissionState>> {
        Box::pin(async move {
            if let Some(state) = self.grants.state(&self.identity, mode) {
                return Ok(state);
            }

            let path = self.path.clone();
            let metadata = blocking(&self.name, move || Ok(std::fs::metadata(path))).await?;
            Ok(match metadata {
                Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
                    PermissionState::Denied
                }
                Ok(meta) if mode == AccessMode::ReadWrite && meta.permissions().readonly() => {
                    PermissionState::Denied
                }
                _ => PermissionState::Prompt,
            })
        })
    }

    fn request_permission(&self, mode: AccessMode) -> BoxFuture<'_, FsResult<PermissionState>> {
        Box::pin(async move {
            let state = self.grants.request(&self.identity, mode);
            tracing::debug!(handle = %self.name, %mode, %state, "local permission request");
            Ok(state)
        })
    }

    fn exists(&self) -> BoxFuture<'_, bool> {
        let path = self.path.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || path.exists())
                .await
                .unwrap_or(false)
        })
    }

    fn read_bytes(&self) -> BoxFuture<'_, FsResult<Vec<u8>>> {
        Box::pin(async move {
            self.expect_kind(HandleKind::File)?;
            let path = self.path.clone();
            let name = self.name.clone();
            blocking(&self.name, move || {
                std::fs::read(&path).map_err(|e| FsError::read(name, e))
            })
            .await
        })
    }

    fn list(&self, options: ListOptions) -> BoxFuture<'_, FsResult<Vec<DirectoryEntry>>> {
        Box::pin(async move {
            self.expect_kind(HandleKind::Directory)?;
            let filter = ListFilter::new(&options)?;
            let root = self.path.clone();
            blocking(&self.name, move || walk(&root, &filter)).await
        })
    }

    fn write_bytes(&self, data: Vec<u8>) -> BoxFuture<'_, FsResult<()>> {
        Box::pin(async move {
            self.expect_kind(HandleKind::File)?;
            let path = self.path.clone();
            let name = self.name.clone();
            blocking(&self.name, move || {
                std::fs::write(&path, data).map_err(|e| FsError::write(name, e))
            })
            .await
        })
    }

    fn child(
        &self,
        name: String,
        kind: HandleKind,
        create: bool,
    ) -> BoxFuture<'_, FsResult<SharedHandle>> {
        Box::pin(async move {
            self.expect_kind(HandleKind::Directory)?;
            let path = self.child_path(&name)?;
            let grants = Arc::clone(&self.grants);

            blocking(&self.name, move || {
                if !path.exists() {
                    if !create {
                        return Err(FsError::NotFound { name });
                    }
                    let created = match kind {
                        HandleKind::File => std::fs::File::create(&path).map(drop),
                        HandleKind::Directory => std::fs::create_dir(&path),
                    };
                    created.map_err(|e| FsError::write(&name, e))?;
                }

                let handle = LocalHandle::open(&path, grants)?;
                if handle.kind != kind {
                    return Err(FsError::KindMismatch {
                        name,
                        expected: kind,
                        actual: handle.kind,
                    });
                }
                Ok(Arc::new(handle) as SharedHandle)
            })
            .await
        })
    }

    fn remove_entry(&self, name: String) -> BoxFuture<'_, FsResult<()>> {
        Box::pin(async move {
            self.expect_kind(HandleKind::Directory)?;
            let path = self.child_path(&name)?;
            blocking(&self.name, move || {
                let metadata =
                    std::fs::symlink_metadata(&path).map_err(|e| FsError::write(&name, e))?;
                let removed = if metadata.is_dir() {
                    std::fs::remove_dir_all(&path)
                } else {
                    std::fs::remove_file(&path)
                };
                removed.map_err(|e| FsError::write(name, e))
            })
            .await
        })
    }
}
