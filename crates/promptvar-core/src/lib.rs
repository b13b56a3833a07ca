//! Core types and traits for promptvar.
//!
//! This crate provides the data model shared by the parser, the filesystem
//! layer and the variable engine: parsed template variables, variable value
//! entries, the file-handle capability trait, errors and configuration.

mod clock;
mod config;
mod error;
mod handle;
mod variable;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheConfig, CacheConfigBuilder, ResolverConfig, ResolverConfigBuilder};
pub use error::{
    FailedOperation, FsError, FsResult, ParseError, ValidationError, ValidationErrorKind,
};
pub use handle::{
    AccessMode, BoxFuture, DirectoryEntry, FileSystemHandle, HandleKind, ListOptions,
    PermissionState, ReadOptions, SharedHandle, TextEncoding,
};
pub use variable::{
    GlobalVariable, HandleEntry, HandleRef, SourcePosition, TemplateParseResult,
    TemplateRecord, TemplateVariable, VariableEntry, VariableValue,
};
