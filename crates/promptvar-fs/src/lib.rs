//! Permission-gated, cached and batched access to file and directory handles.
//!
//! This crate turns the `file` and `directory` entries of a variable value into
//! text. Its pieces compose bottom-up:
//!
//! - [`PermissionGate`] queries and requests access; requests need an active
//!   [`UserGesture`].
//! - [`HandleCache`] keeps read results under a TTL with LRU eviction.
//! - [`execute_batch`] runs fallible async operations with bounded concurrency
//!   and positional results.
//! - [`HandleRegistry`] maps stable ids to live handles and persists metadata
//!   through a [`RegistryStore`].
//! - [`FileResolver`] orchestrates all of the above and [`FileResolver::diagnose`]
//!   reports why an entry could not be resolved.
//!
//! Handles are provided by [`LocalHandle`] for the local filesystem and by
//! [`MemoryHandle`] for in-memory content.

mod batch;
mod cache;
mod diagnostics;
mod listing;
mod local;
mod memory;
mod ops;
mod permission;
mod registry;
mod resolver;

pub use batch::{
    execute_batch, task, BatchOptions, BatchProgress, BatchResult, BatchTask, ProgressCallback,
};
pub use cache::{CacheKey, CacheStats, HandleCache};
pub use diagnostics::{DiagnosisIssue, EntryDiagnosis};
pub use listing::{format_listing, ListFilter};
pub use local::{ConsentPolicy, GrantTable, LocalHandle};
pub use memory::MemoryHandle;
pub use ops::BatchFileOps;
pub use permission::{PermissionGate, UserGesture};
pub use registry::{
    FileHandleRegistryEntry, HandleOpener, HandleRegistry, JsonRegistryStore, NoopRegistryStore,
    RegistryStore,
};
pub use resolver::{FileResolver, ResolveOptions};

// Re-export core types for convenience
pub use promptvar_core::{
    AccessMode, FileSystemHandle, FsError, FsResult, HandleKind, PermissionState, SharedHandle,
};
