//! File-handle capability trait and the option types used to read handles.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{FsError, FsResult};

/// Boxed future returned by handle methods.
pub use futures::future::BoxFuture;

/// Shared, dynamically typed handle.
pub type SharedHandle = Arc<dyn FileSystemHandle>;

/// Whether a handle points at a file or a directory.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HandleKind {
    File,
    Directory,
}

/// Access mode a permission is requested for.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AccessMode {
    Read,
    ReadWrite,
}

impl AccessMode {
    /// Whether a grant for `self` also covers `other`.
    pub fn covers(self, other: AccessMode) -> bool {
        matches!(
            (self, other),
            (Self::ReadWrite, _) | (Self::Read, Self::Read)
        )
    }
}

/// Live permission state of a handle.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PermissionState {
    Granted,
    Denied,
    Prompt,
}

impl PermissionState {
    /// Check if access is granted.
    pub fn is_granted(self) -> bool {
        self == Self::Granted
    }
}

/// Text decoding applied to file bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextEncoding {
    /// Strict UTF-8; invalid data is a read error.
    #[default]
    Utf8,
    /// UTF-8 with invalid sequences replaced.
    Utf8Lossy,
}

/// Options for reading a file handle as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ReadOptions {
    /// Decoding applied to the bytes.
    #[serde(default)]
    pub encoding: TextEncoding,
    /// Truncate content after this many bytes (None = unlimited).
    #[serde(default)]
    pub max_bytes: Option<usize>,
}

impl ReadOptions {
    /// Decode raw bytes according to these options.
    pub fn decode(&self, name: &str, mut bytes: Vec<u8>) -> FsResult<String> {
        let truncated = match self.max_bytes {
            Some(max) if bytes.len() > max => {
                bytes.truncate(max);
                true
            }
            _ => false,
        };

        match self.encoding {
            TextEncoding::Utf8Lossy => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            TextEncoding::Utf8 => match String::from_utf8(bytes) {
                Ok(text) => Ok(text),
                Err(err) => {
                    let utf8 = err.utf8_error();
                    // A cut through a multi-byte char is not a decoding error.
                    if truncated && utf8.error_len().is_none() {
                        let mut bytes = err.into_bytes();
                        bytes.truncate(utf8.valid_up_to());
                        Ok(String::from_utf8(bytes).unwrap_or_default())
                    } else {
                        Err(FsError::read(
                            name,
                            std::io::Error::new(std::io::ErrorKind::InvalidData, utf8),
                        ))
                    }
                }
            },
        }
    }
}

/// Options for listing a directory handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListOptions {
    /// Descend into subdirectories.
    #[serde(default = "default_true")]
    pub recursive: bool,
    /// Include entries starting with `.`.
    #[serde(default)]
    pub include_hidden: bool,
    /// Maximum depth below the listed directory (None = unlimited).
    #[serde(default)]
    pub max_depth: Option<usize>,
    /// Glob patterns of relative paths to leave out.
    #[serde(default)]
    pub exclude: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            include_hidden: false,
            max_depth: None,
            exclude: Vec::new(),
        }
    }
}

/// An entry in a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Path relative to the listed directory, `/`-separated.
    pub path: String,
    /// Entry kind.
    pub kind: HandleKind,
    /// Depth below the listed directory (1 = direct child).
    pub depth: usize,
}

impl DirectoryEntry {
    /// Create a new directory entry.
    pub fn new(path: impl Into<String>, kind: HandleKind, depth: usize) -> Self {
        Self {
            path: path.into(),
            kind,
            depth,
        }
    }
}

/// Capability set required from an opaque file or directory handle.
///
/// The core never assumes a concrete platform handle beyond this trait.
/// Methods a provider cannot support return [`FsError::Capability`].
pub trait FileSystemHandle: fmt::Debug + Send + Sync {
    /// Whether this is a file or a directory.
    fn kind(&self) -> HandleKind;

    /// Display name (file or directory name).
    fn name(&self) -> &str;

    /// Stable identity; two handles to the same object share it.
    fn identity(&self) -> &str;

    /// Provider-specific locator that can reopen this handle, if any.
    fn locator(&self) -> Option<String> {
        None
    }

    /// Query the permission state without prompting.
    fn query_permission(&self, mode: AccessMode) -> BoxFuture<'_, FsResult<PermissionState>>;

    /// Request a permission; may prompt the user.
    fn request_permission(&self, mode: AccessMode) -> BoxFuture<'_, FsResult<PermissionState>>;

    /// Check whether the underlying object still exists.
    fn exists(&self) -> BoxFuture<'_, bool>;

    /// Read the whole file.
    fn read_bytes(&self) -> BoxFuture<'_, FsResult<Vec<u8>>>;

    /// List a directory.
    fn list(&self, options: ListOptions) -> BoxFuture<'_, FsResult<Vec<DirectoryEntry>>>;

    /// Replace the file contents.
    fn write_bytes(&self, data: Vec<u8>) -> BoxFuture<'_, FsResult<()>> {
        drop(data);
        let err = FsError::capability(self.name(), "write");
        Box::pin(async move { Err(err) })
    }

    /// Get (or create) a direct child of a directory.
    fn child(
        &self,
        name: String,
        kind: HandleKind,
        create: bool,
    ) -> BoxFuture<'_, FsResult<SharedHandle>> {
        let _ = (name, kind, create);
        let err = FsError::capability(self.name(), "child lookup");
        Box::pin(async move { Err(err) })
    }

    /// Remove a direct child of a directory.
    fn remove_entry(&self, name: String) -> BoxFuture<'_, FsResult<()>> {
        let _ = name;
        let err = FsError::capability(self.name(), "remove entry");
        Box::pin(async move { Err(err) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_mode_covers() {
        assert!(AccessMode::ReadWrite.covers(AccessMode::Read));
        assert!(AccessMode::ReadWrite.covers(AccessMode::ReadWrite));
        assert!(AccessMode::Read.covers(AccessMode::Read));
        assert!(!AccessMode::Read.covers(AccessMode::ReadWrite));
    }

    #[test]
    fn test_enum_string_forms() {
        assert_eq!(AccessMode::ReadWrite.to_string(), "readwrite");
        assert_eq!(PermissionState::Prompt.to_string(), "prompt");
        assert_eq!("directory".parse::<HandleKind>().ok(), Some(HandleKind::Directory));
    }

    #[test]
    fn test_decode_truncates_on_char_boundary() {
        let options = ReadOptions {
            encoding: TextEncoding::Utf8,
            max_bytes: Some(2),
        };
        // "é" is two bytes; cutting after 2 bytes of "aé" splits it.
        let text = options.decode("a.txt", "aé".as_bytes().to_vec()).unwrap();
        assert_eq!(text, "a");
    }

    #[test]
    fn test_decode_rejects_invalid_utf8() {
        let options = ReadOptions::default();
        let err = options.decode("a.bin", vec![0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, FsError::Read { .. }));

        let lossy = ReadOptions {
            encoding: TextEncoding::Utf8Lossy,
            max_bytes: None,
        };
        assert!(lossy.decode("a.bin", vec![0xff]).is_ok());
    }
}
