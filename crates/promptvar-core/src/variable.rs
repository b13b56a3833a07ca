//! Template variable descriptors and variable value entries.

use compact_str::CompactString;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::handle::{HandleKind, SharedHandle};

/// Character span of a placeholder in template text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourcePosition {
    /// Offset of the first character of `{{`.
    pub start: usize,
    /// Offset one past the last character of `}}`.
    pub end: usize,
}

impl SourcePosition {
    /// Create a new source position.
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// A variable parsed out of template text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateVariable {
    /// Trimmed variable name, unique within one template.
    pub name: CompactString,
    /// Default from `{{name:default}}`.
    pub default_value: Option<String>,
    /// Description from `{{name:default:description}}`.
    pub description: Option<String>,
    /// True iff no default was supplied.
    pub is_required: bool,
    /// Span of the first occurrence.
    pub source_position: SourcePosition,
}

impl TemplateVariable {
    /// Default value or the empty string.
    pub fn default_or_empty(&self) -> &str {
        self.default_value.as_deref().unwrap_or_default()
    }
}

/// Variables and errors produced by one parse call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateParseResult {
    /// Variables in order of first appearance.
    pub variables: Vec<TemplateVariable>,
    /// Parse errors in source order.
    pub errors: Vec<ParseError>,
}

impl TemplateParseResult {
    /// Look up a variable by name.
    pub fn variable(&self, name: &str) -> Option<&TemplateVariable> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Names of every referenced variable, in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(|v| v.name.as_str())
    }

    /// Check if parsing produced any errors.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Reference to a file or directory handle.
///
/// Only the registry id survives serialization; the live handle must be
/// reacquired after a restart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HandleRef {
    /// Registry id, if the handle was registered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Live handle.
    #[serde(skip)]
    pub handle: Option<SharedHandle>,
}

impl HandleRef {
    /// Reference a live handle.
    pub fn live(handle: SharedHandle) -> Self {
        Self {
            id: None,
            handle: Some(handle),
        }
    }

    /// Reference a registered handle by id only.
    pub fn registered(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            handle: None,
        }
    }

    /// Attach a registry id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// A file- or directory-backed variable value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandleEntry {
    /// Display name of the referenced file or directory.
    pub name: String,
    /// The handle reference.
    pub value: HandleRef,
    /// Materialized content, filled in by the resolver.
    #[serde(skip)]
    pub content: Option<String>,
}

impl HandleEntry {
    /// Create an unresolved entry.
    pub fn new(name: impl Into<String>, value: HandleRef) -> Self {
        Self {
            name: name.into(),
            value,
            content: None,
        }
    }

    /// Check if content has been resolved.
    pub fn is_resolved(&self) -> bool {
        self.content.is_some()
    }
}

/// A single value contribution to a variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum VariableEntry {
    /// Literal text.
    Text { value: String },
    /// Contents of a file.
    File(HandleEntry),
    /// Listing of a directory.
    Directory(HandleEntry),
}

impl VariableEntry {
    /// Create a text entry.
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text {
            value: value.into(),
        }
    }

    /// Create a file entry from a live handle.
    pub fn file(handle: SharedHandle) -> Self {
        let name = handle.name().to_string();
        Self::File(HandleEntry::new(name, HandleRef::live(handle)))
    }

    /// Create a directory entry from a live handle.
    pub fn directory(handle: SharedHandle) -> Self {
        let name = handle.name().to_string();
        Self::Directory(HandleEntry::new(name, HandleRef::live(handle)))
    }

    /// Handle kind for handle-backed entries.
    pub fn handle_kind(&self) -> Option<HandleKind> {
        match self {
            Self::Text { .. } => None,
            Self::File(_) => Some(HandleKind::File),
            Self::Directory(_) => Some(HandleKind::Directory),
        }
    }

    /// The handle part of a handle-backed entry.
    pub fn handle_entry(&self) -> Option<&HandleEntry> {
        match self {
            Self::Text { .. } => None,
            Self::File(entry) | Self::Directory(entry) => Some(entry),
        }
    }

    /// Mutable handle part of a handle-backed entry.
    pub fn handle_entry_mut(&mut self) -> Option<&mut HandleEntry> {
        match self {
            Self::Text { .. } => None,
            Self::File(entry) | Self::Directory(entry) => Some(entry),
        }
    }

    /// Text this entry contributes, if available.
    pub fn materialized(&self) -> Option<&str> {
        match self {
            Self::Text { value } => Some(value),
            Self::File(entry) | Self::Directory(entry) => entry.content.as_deref(),
        }
    }
}

/// Ordered sequence of entries making up one variable value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableValue(pub Vec<VariableEntry>);

impl VariableValue {
    /// Create a value from entries.
    pub fn new(entries: Vec<VariableEntry>) -> Self {
        Self(entries)
    }

    /// Create a single-entry text value.
    pub fn text(value: impl Into<String>) -> Self {
        Self(vec![VariableEntry::text(value)])
    }

    /// Entries of this value.
    pub fn entries(&self) -> &[VariableEntry] {
        &self.0
    }

    /// Mutable entries of this value.
    pub fn entries_mut(&mut self) -> &mut [VariableEntry] {
        &mut self.0
    }

    /// Check if the value references any file or directory handle.
    pub fn has_handles(&self) -> bool {
        self.0.iter().any(|e| e.handle_kind().is_some())
    }

    /// Join the materialized text of every entry with newlines.
    ///
    /// Unresolved handle entries contribute nothing.
    pub fn materialize(&self) -> String {
        self.0
            .iter()
            .filter_map(VariableEntry::materialized)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Check if the materialized text would be empty.
    pub fn is_empty(&self) -> bool {
        self.0
            .iter()
            .all(|e| e.materialized().is_none_or(str::is_empty))
    }
}

/// A named value shared across templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalVariable {
    /// Variable name.
    pub name: String,
    /// Value entries.
    pub value: VariableValue,
}

impl GlobalVariable {
    /// Create a new global variable.
    pub fn new(name: impl Into<String>, value: VariableValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// A stored template as provided by a template store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRecord {
    /// Store id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Template text.
    pub content: String,
    /// Optional category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Snapshot of resolved variable values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<IndexMap<String, String>>,
}

impl TemplateRecord {
    /// Create a record without category or variables.
    pub fn new(id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            content: content.into(),
            category: None,
            variables: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_serialization_shape() {
        let entry = VariableEntry::File(HandleEntry::new("notes.md", HandleRef::registered("h-1")));
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "file");
        assert_eq!(json["name"], "notes.md");
        assert_eq!(json["value"]["id"], "h-1");

        let text: VariableEntry = serde_json::from_str(r#"{"type":"text","value":"hi"}"#).unwrap();
        assert_eq!(text.materialized(), Some("hi"));
    }

    #[test]
    fn test_value_materialize_skips_unresolved() {
        let mut resolved = HandleEntry::new("a.txt", HandleRef::default());
        resolved.content = Some("abc".to_string());
        let value = VariableValue::new(vec![
            VariableEntry::text("head"),
            VariableEntry::File(resolved),
            VariableEntry::File(HandleEntry::new("b.txt", HandleRef::default())),
        ]);
        assert_eq!(value.materialize(), "head\nabc");
        assert!(value.has_handles());
        assert!(!value.is_empty());
    }

    #[test]
    fn test_empty_text_value() {
        assert!(VariableValue::text("").is_empty());
        assert!(VariableValue::default().is_empty());
        assert!(!VariableValue::text("x").is_empty());
    }
}
