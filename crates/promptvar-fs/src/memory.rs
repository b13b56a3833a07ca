//! In-memory file and directory handles.
//!
//! Used by tests and by hosts that have no real filesystem. Permission
//! states, request answers and failures are programmable, and every
//! request/read is counted.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use promptvar_core::{
    AccessMode, BoxFuture, DirectoryEntry, FileSystemHandle, FsError, FsResult, HandleKind,
    ListOptions, PermissionState, SharedHandle,
};

use crate::listing::ListFilter;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
enum Node {
    File(Vec<u8>),
    Directory(BTreeMap<String, Arc<MemoryHandle>>),
}

/// A file or directory held in memory.
#[derive(Debug)]
pub struct MemoryHandle {
    name: String,
    identity: String,
    node: Mutex<Node>,
    permissions: Mutex<HashMap<AccessMode, PermissionState>>,
    request_answer: PermissionState,
    query_supported: bool,
    exists: AtomicBool,
    read_failure: Option<io::ErrorKind>,
    requests: AtomicUsize,
    reads: AtomicUsize,
}

impl MemoryHandle {
    fn with_node(name: &str, node: Node) -> Self {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            name: name.to_string(),
            identity: format!("memory:{id}:{name}"),
            node: Mutex::new(node),
            permissions: Mutex::new(HashMap::from([
                (AccessMode::Read, PermissionState::Granted),
                (AccessMode::ReadWrite, PermissionState::Prompt),
            ])),
            request_answer: PermissionState::Granted,
            query_supported: true,
            exists: AtomicBool::new(true),
            read_failure: None,
            requests: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
        }
    }

    /// A file with the given text content.
    ///
    /// Read access starts granted, read-write starts at `prompt`.
    pub fn file(name: &str, content: impl Into<Vec<u8>>) -> Self {
        Self::with_node(name, Node::File(content.into()))
    }

    /// An empty directory.
    pub fn directory(name: &str) -> Self {
        Self::with_node(name, Node::Directory(BTreeMap::new()))
    }

    /// Add a child entry to a directory.
    pub fn with_child(self, child: MemoryHandle) -> Self {
        if let Node::Directory(children) = &mut *self.lock_node() {
            children.insert(child.name.clone(), Arc::new(child));
        }
        self
    }

    /// Set the state reported for every access mode.
    pub fn with_permission(self, state: PermissionState) -> Self {
        {
            let mut permissions = self.lock_permissions();
            permissions.insert(AccessMode::Read, state);
            permissions.insert(AccessMode::ReadWrite, state);
        }
        self
    }

    /// Set the answer given to permission requests.
    pub fn with_request_answer(mut self, state: PermissionState) -> Self {
        self.request_answer = state;
        self
    }

    /// Make permission queries fail with a capability error.
    pub fn without_query_support(mut self) -> Self {
        self.query_supported = false;
        self
    }

    /// Make every read fail with an I/O error of `kind`.
    pub fn failing(mut self, kind: io::ErrorKind) -> Self {
        self.read_failure = Some(kind);
        self
    }

    /// Share an identity with another handle to the same object.
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    /// A handle whose object has already been deleted.
    pub fn missing(self) -> Self {
        self.exists.store(false, Ordering::SeqCst);
        self
    }

    /// Mark the underlying object as deleted or restored.
    pub fn set_exists(&self, exists: bool) {
        self.exists.store(exists, Ordering::SeqCst);
    }

    /// Replace the content of a file.
    pub fn set_content(&self, content: impl Into<Vec<u8>>) {
        if let Node::File(data) = &mut *self.lock_node() {
            *data = content.into();
        }
    }

    /// Current text content of a file, if any.
    pub fn content(&self) -> Option<String> {
        match &*self.lock_node() {
            Node::File(data) => Some(String::from_utf8_lossy(data).into_owned()),
            Node::Directory(_) => None,
        }
    }

    /// Names of the direct children of a directory.
    pub fn child_names(&self) -> Vec<String> {
        match &*self.lock_node() {
            Node::Directory(children) => children.keys().cloned().collect(),
            Node::File(_) => Vec::new(),
        }
    }

    /// Number of permission requests received.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Number of reads and listings performed.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn lock_node(&self) -> MutexGuard<'_, Node> {
        self.node.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_permissions(&self) -> MutexGuard<'_, HashMap<AccessMode, PermissionState>> {
        self.permissions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_readable(&self) -> FsResult<()> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if !self.exists.load(Ordering::SeqCst) {
            return Err(FsError::NotFound {
                name: self.name.clone(),
            });
        }
        if let Some(kind) = self.read_failure {
            return Err(FsError::read(&self.name, io::Error::from(kind)));
        }
        Ok(())
    }

    fn kind_mismatch(&self, expected: HandleKind, actual: HandleKind) -> FsError {
        FsError::KindMismatch {
            name: self.name.clone(),
            expected,
            actual,
        }
    }

    fn collect_entries(
        children: &BTreeMap<String, Arc<MemoryHandle>>,
        prefix: &str,
        depth: usize,
        filter: &ListFilter,
        out: &mut Vec<DirectoryEntry>,
    ) {
        for (name, child) in children {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}/{name}")
            };
            if !filter.accepts(&path, depth) {
                continue;
            }
            out.push(DirectoryEntry::new(path.clone(), child.kind(), depth));
            if let Node::Directory(grandchildren) = &*child.lock_node() {
                Self::collect_entries(grandchildren, &path, depth + 1, filter, out);
            }
        }
    }
}

impl FileSystemHandle for MemoryHandle {
    fn kind(&self) -> HandleKind {
        match &*self.lock_node() {
            Node::File(_) => HandleKind::File,
            Node::Directory(_) => HandleKind::Directory,
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn identity(&self) -> &str {
        &self.identity
    }

    fn query_permission(&self, mode: AccessMode) -> BoxFuture<'_, FsResult<PermissionState>> {
        Box::pin(async move {
            if !self.query_supported {
                return Err(FsError::capability(&self.name, "permission query"));
            }
            let permissions = self.lock_permissions();
            let write_granted = permissions
                .get(&AccessMode::ReadWrite)
                .is_some_and(|state| state.is_granted());
            if write_granted && AccessMode::ReadWrite.covers(mode) {
                return Ok(PermissionState::Granted);
            }
            Ok(permissions
                .get(&mode)
                .copied()
                .unwrap_or(PermissionState::Prompt))
        })
    }

    fn request_permission(&self, mode: AccessMode) -> BoxFuture<'_, FsResult<PermissionState>> {
        Box::pin(async move {
            self.requests.fetch_add(1, Ordering::SeqCst);
            let answer = self.request_answer;
            let mut permissions = self.lock_permissions();
            permissions.insert(mode, answer);
            if answer.is_granted() && mode == AccessMode::ReadWrite {
                permissions.insert(AccessMode::Read, answer);
            }
            Ok(answer)
        })
    }

    fn exists(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move { self.exists.load(Ordering::SeqCst) })
    }

    fn read_bytes(&self) -> BoxFuture<'_, FsResult<Vec<u8>>> {
        Box::pin(async move {
            self.check_readable()?;
            match &*self.lock_node() {
                Node::File(data) => Ok(data.clone()),
                Node::Directory(_) => {
                    Err(self.kind_mismatch(HandleKind::File, HandleKind::Directory))
                }
            }
        })
    }

    fn list(&self, options: ListOptions) -> BoxFuture<'_, FsResult<Vec<DirectoryEntry>>> {
        Box::pin(async move {
            self.check_readable()?;
            let filter = ListFilter::new(&options)?;
            match &*self.lock_node() {
                Node::Directory(children) => {
                    let mut entries = Vec::new();
                    Self::collect_entries(children, "", 1, &filter, &mut entries);
                    Ok(entries)
                }
                Node::File(_) => Err(self.kind_mismatch(HandleKind::Directory, HandleKind::File)),
            }
        })
    }

    fn write_bytes(&self, data: Vec<u8>) -> BoxFuture<'_, FsResult<()>> {
        Box::pin(async move {
            if !self.exists.load(Ordering::SeqCst) {
                return Err(FsError::NotFound {
                    name: self.name.clone(),
                });
            }
            match &mut *self.lock_node() {
                Node::File(content) => {
                    *content = data;
                    Ok(())
                }
                Node::Directory(_) => {
                    Err(self.kind_mismatch(HandleKind::File, HandleKind::Directory))
                }
            }
        })
    }

    fn child(
        &self,
        name: String,
        kind: HandleKind,
        create: bool,
    ) -> BoxFuture<'_, FsResult<SharedHandle>> {
        Box::pin(async move {
            let mut node = self.lock_node();
            let Node::Directory(children) = &mut *node else {
                return Err(self.kind_mismatch(HandleKind::Directory, HandleKind::File));
            };

            if let Some(existing) = children.get(&name) {
                let actual = existing.kind();
                if actual != kind {
                    return Err(existing.kind_mismatch(kind, actual));
                }
                let handle: SharedHandle = existing.clone();
                return Ok(handle);
            }
            if !create {
                return Err(FsError::NotFound { name });
            }

            let created = Arc::new(match kind {
                HandleKind::File => MemoryHandle::file(&name, Vec::new()),
                HandleKind::Directory => MemoryHandle::directory(&name),
            });
            children.insert(name, created.clone());
            let handle: SharedHandle = created;
            Ok(handle)
        })
    }

    fn remove_entry(&self, name: String) -> BoxFuture<'_, FsResult<()>> {
        Box::pin(async move {
            let mut node = self.lock_node();
            let Node::Directory(children) = &mut *node else {
                return Err(self.kind_mismatch(HandleKind::Directory, HandleKind::File));
            };
            match children.remove(&name) {
                Some(removed) => {
                    removed.set_exists(false);
                    Ok(())
                }
                None => Err(FsError::NotFound { name }),
            }
        })
    }
}
