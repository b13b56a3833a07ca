//! Permission-checked batch file operations.
//!
//! Each wrapper verifies access per handle, runs the work through
//! [`execute_batch`] and turns any failure into a single
//! [`FsError::BatchOperation`].

use promptvar_core::{
    AccessMode, FileSystemHandle, FsError, FsResult, HandleKind, ReadOptions, SharedHandle,
};

use crate::batch::{execute_batch, task, BatchOptions, BatchTask};
use crate::permission::PermissionGate;

/// Batch read/write/delete/copy over handles.
#[derive(Debug, Clone)]
pub struct BatchFileOps {
    gate: PermissionGate,
    options: BatchOptions,
}

impl BatchFileOps {
    /// Create batch operations bound to a permission gate.
    pub fn new(gate: PermissionGate, options: BatchOptions) -> Self {
        Self { gate, options }
    }

    /// The batch options in use.
    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    async fn ensure(&self, handle: &dyn FileSystemHandle, mode: AccessMode) -> FsResult<()> {
        if self.gate.verify(handle, mode, true).await? {
            Ok(())
        } else {
            Err(FsError::PermissionDenied {
                name: handle.name().to_string(),
                mode,
                reason: "access not granted".to_string(),
            })
        }
    }

    /// Read several files as text.
    pub async fn read_files(
        &self,
        handles: &[SharedHandle],
        read: &ReadOptions,
    ) -> FsResult<Vec<String>> {
        let ops: Vec<BatchTask<'_, String>> = handles
            .iter()
            .cloned()
            .map(|handle| {
                task(move || async move {
                    self.ensure(handle.as_ref(), AccessMode::Read).await?;
                    let bytes = handle.read_bytes().await?;
                    read.decode(handle.name(), bytes)
                })
            })
            .collect();

        execute_batch(ops, &self.options).await.into_result()
    }

    /// Replace the contents of several files, upgrading to read-write
    /// access where needed. Returns the number of files written.
    pub async fn write_files(&self, writes: Vec<(SharedHandle, String)>) -> FsResult<usize> {
        let ops: Vec<BatchTask<'_, ()>> = writes
            .into_iter()
            .map(|(handle, content)| {
                task(move || async move {
                    self.ensure(handle.as_ref(), AccessMode::ReadWrite).await?;
                    handle.write_bytes(content.into_bytes()).await
                })
            })
            .collect();

        execute_batch(ops, &self.options)
            .await
            .into_result()
            .map(|written| written.len())
    }

    /// Remove named children of a directory. Returns the number removed.
    pub async fn delete_entries(&self, dir: &SharedHandle, names: &[String]) -> FsResult<usize> {
        if dir.kind() != HandleKind::Directory {
            return Err(FsError::KindMismatch {
                name: dir.name().to_string(),
                expected: HandleKind::Directory,
                actual: dir.kind(),
            });
        }
        self.ensure(dir.as_ref(), AccessMode::ReadWrite).await?;

        let ops: Vec<BatchTask<'_, ()>> = names
            .iter()
            .cloned()
            .map(|name| task(move || async move { dir.remove_entry(name).await }))
            .collect();

        execute_batch(ops, &self.options)
            .await
            .into_result()
            .map(|removed| removed.len())
    }

    /// Copy files into a directory, creating or overwriting same-named
    /// children. Returns handles to the copies in source order.
    pub async fn copy_files(
        &self,
        sources: &[SharedHandle],
        dest_dir: &SharedHandle,
    ) -> FsResult<Vec<SharedHandle>> {
        if dest_dir.kind() != HandleKind::Directory {
            return Err(FsError::KindMismatch {
                name: dest_dir.name().to_string(),
                expected: HandleKind::Directory,
                actual: dest_dir.kind(),
            });
        }
        self.ensure(dest_dir.as_ref(), AccessMode::ReadWrite).await?;

        let ops: Vec<BatchTask<'_, SharedHandle>> = sources
            .iter()
            .cloned()
            .map(|source| {
                task(move || async move {
                    self.ensure(source.as_ref(), AccessMode::Read).await?;
                    let bytes = source.read_bytes().await?;
                    let target = dest_dir
                        .child(source.name().to_string(), HandleKind::File, true)
                        .await?;
                    target.write_bytes(bytes).await?;
                    Ok(target)
                })
            })
            .collect();

        execute_batch(ops, &self.options).await.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryHandle;
    use promptvar_core::PermissionState;
    use std::sync::Arc;

    fn ops(gate: &PermissionGate) -> BatchFileOps {
        BatchFileOps::new(gate.clone(), BatchOptions::concurrent(4))
    }

    #[tokio::test]
    async fn test_read_files_in_order() {
        let gate = PermissionGate::new();
        let handles: Vec<SharedHandle> = vec![
            Arc::new(MemoryHandle::file("a.txt", "A")),
            Arc::new(MemoryHandle::file("b.txt", "B")),
        ];
        let texts = ops(&gate)
            .read_files(&handles, &ReadOptions::default())
            .await
            .unwrap();
        assert_eq!(texts, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_read_files_reports_denied_entries() {
        let gate = PermissionGate::new();
        let handles: Vec<SharedHandle> = vec![
            Arc::new(MemoryHandle::file("a.txt", "A")),
            Arc::new(MemoryHandle::file("b.txt", "B").with_permission(PermissionState::Denied)),
        ];
        let options = BatchOptions::concurrent(4).continue_on_error(true);
        let err = BatchFileOps::new(gate, options)
            .read_files(&handles, &ReadOptions::default())
            .await
            .unwrap_err();

        match err {
            FsError::BatchOperation { total, failed } => {
                assert_eq!(total, 2);
                assert_eq!(failed.len(), 1);
                assert_eq!(failed[0].index, 1);
                assert!(failed[0].error.is_permission_denied());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_write_files_upgrades_access() {
        let gate = PermissionGate::new();
        let file = Arc::new(MemoryHandle::file("out.txt", "old"));
        let handle: SharedHandle = file.clone();
        let _gesture = gate.user_gesture();

        let written = ops(&gate)
            .write_files(vec![(handle, "new".to_string())])
            .await
            .unwrap();
        assert_eq!(written, 1);
        assert_eq!(file.content().as_deref(), Some("new"));
        assert_eq!(file.request_count(), 1);
    }

    #[tokio::test]
    async fn test_write_without_gesture_fails() {
        let gate = PermissionGate::new();
        let file: SharedHandle = Arc::new(MemoryHandle::file("out.txt", "old"));
        let err = ops(&gate)
            .write_files(vec![(file, "new".to_string())])
            .await
            .unwrap_err();
        assert!(matches!(err, FsError::BatchOperation { .. }));
    }

    #[tokio::test]
    async fn test_copy_and_delete() {
        let gate = PermissionGate::new();
        let _gesture = gate.user_gesture();
        let sources: Vec<SharedHandle> = vec![
            Arc::new(MemoryHandle::file("a.txt", "A")),
            Arc::new(MemoryHandle::file("b.txt", "B")),
        ];
        let dest = Arc::new(MemoryHandle::directory("backup"));
        let dest_handle: SharedHandle = dest.clone();

        let copies = ops(&gate).copy_files(&sources, &dest_handle).await.unwrap();
        assert_eq!(copies.len(), 2);
        assert_eq!(copies[1].read_bytes().await.unwrap(), b"B");
        assert_eq!(dest.child_names(), vec!["a.txt", "b.txt"]);

        let removed = ops(&gate)
            .delete_entries(&dest_handle, &["a.txt".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(dest.child_names(), vec!["b.txt"]);
    }

    #[tokio::test]
    async fn test_delete_requires_directory() {
        let gate = PermissionGate::new();
        let file: SharedHandle = Arc::new(MemoryHandle::file("a.txt", "A"));
        let err = ops(&gate)
            .delete_entries(&file, &["x".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, FsError::KindMismatch { .. }));
    }
}
