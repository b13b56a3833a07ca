//! Per-entry health reports for unresolved file and directory variables.

use serde::Serialize;

use promptvar_core::{HandleKind, PermissionState};

/// What is wrong with an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DiagnosisIssue {
    /// No live handle and none could be reacquired.
    MissingHandle,
    /// The file or directory no longer exists.
    NotFound,
    /// Access was declined.
    PermissionDenied,
    /// Access has not been granted yet; a gesture is needed to ask.
    PermissionPrompt,
    /// The host cannot report a permission state for this handle.
    CapabilityUnavailable,
    /// The handle looks healthy but reading it failed.
    ReadFailed,
}

/// Health of a single file or directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryDiagnosis {
    /// Display name of the entry.
    pub name: String,
    /// File or directory.
    pub kind: HandleKind,
    /// Whether a live handle is attached.
    pub handle_available: bool,
    /// Whether the underlying object exists (false when unknown).
    pub exists: bool,
    /// Live read permission, when it could be queried.
    pub permission: Option<PermissionState>,
    /// The problem found, if any.
    pub issue: Option<DiagnosisIssue>,
}

impl EntryDiagnosis {
    /// Check if nothing is wrong with the entry.
    pub fn is_healthy(&self) -> bool {
        self.issue.is_none()
    }

    /// User-facing description.
    pub fn message(&self) -> String {
        let name = &self.name;
        match self.issue {
            None => format!("{name} is available"),
            Some(DiagnosisIssue::MissingHandle) => {
                format!("{name} is no longer linked; select the {} again", self.kind)
            }
            Some(DiagnosisIssue::NotFound) => format!("{name} was moved or deleted"),
            Some(DiagnosisIssue::PermissionDenied) => format!("Access to {name} was denied"),
            Some(DiagnosisIssue::PermissionPrompt) => {
                format!("Access to {name} needs to be granted again")
            }
            Some(DiagnosisIssue::CapabilityUnavailable) => {
                format!("Cannot check access to {name} on this system")
            }
            Some(DiagnosisIssue::ReadFailed) => format!("{name} could not be read"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diagnosis(issue: Option<DiagnosisIssue>) -> EntryDiagnosis {
        EntryDiagnosis {
            name: "notes.md".to_string(),
            kind: HandleKind::File,
            handle_available: true,
            exists: true,
            permission: Some(PermissionState::Granted),
            issue,
        }
    }

    #[test]
    fn test_messages() {
        assert!(diagnosis(None).is_healthy());
        assert_eq!(
            diagnosis(Some(DiagnosisIssue::MissingHandle)).message(),
            "notes.md is no longer linked; select the file again"
        );
        assert_eq!(
            diagnosis(Some(DiagnosisIssue::PermissionDenied)).message(),
            "Access to notes.md was denied"
        );
    }

    #[test]
    fn test_issue_serializes_snake_case() {
        let json = serde_json::to_string(&DiagnosisIssue::PermissionPrompt).unwrap();
        assert_eq!(json, "\"permission_prompt\"");
    }
}
