//! Permission gate for file and directory handles.
//!
//! Queries never prompt. Requests may prompt and are only legal while a user
//! gesture is active, modelled as an RAII [`UserGesture`] guard.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use promptvar_core::{AccessMode, FileSystemHandle, FsError, FsResult, PermissionState};

/// Queries and requests access grants for handles.
#[derive(Debug, Clone, Default)]
pub struct PermissionGate {
    active_gestures: Arc<AtomicUsize>,
}

/// Marks a user gesture as active until dropped.
#[derive(Debug)]
#[must_use = "the gesture ends when the guard is dropped"]
pub struct UserGesture {
    active_gestures: Arc<AtomicUsize>,
}

impl Drop for UserGesture {
    fn drop(&mut self) {
        self.active_gestures.fetch_sub(1, Ordering::SeqCst);
    }
}

impl PermissionGate {
    /// Create a gate with no active gesture.
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a user gesture; permission requests are allowed while it lives.
    pub fn user_gesture(&self) -> UserGesture {
        self.active_gestures.fetch_add(1, Ordering::SeqCst);
        UserGesture {
            active_gestures: Arc::clone(&self.active_gestures),
        }
    }

    /// Check if a user gesture is currently active.
    pub fn has_user_activation(&self) -> bool {
        self.active_gestures.load(Ordering::SeqCst) > 0
    }

    /// Query the current permission state without prompting.
    ///
    /// Fails with [`FsError::Capability`] when the handle cannot answer
    /// without a prompt; callers may fall back to [`Self::request`].
    pub async fn query(
        &self,
        handle: &dyn FileSystemHandle,
        mode: AccessMode,
    ) -> FsResult<PermissionState> {
        handle.query_permission(mode).await
    }

    /// Request a permission, possibly prompting the user.
    ///
    /// Returns `Ok(false)` when the user declines.
    pub async fn request(&self, handle: &dyn FileSystemHandle, mode: AccessMode) -> FsResult<bool> {
        if !self.has_user_activation() {
            return Err(FsError::PermissionDenied {
                name: handle.name().to_string(),
                mode,
                reason: "permission requests require a user gesture".to_string(),
            });
        }

        let state = handle.request_permission(mode).await?;
        if !state.is_granted() {
            tracing::warn!(handle = handle.name(), %mode, %state, "permission request declined");
        }
        Ok(state.is_granted())
    }

    /// Query, then escalate to a request when allowed.
    ///
    /// Returns `Ok(false)` for "not granted" outcomes. Errors only when the
    /// host lacks the capability and no fallback succeeded.
    pub async fn verify(
        &self,
        handle: &dyn FileSystemHandle,
        mode: AccessMode,
        auto_request: bool,
    ) -> FsResult<bool> {
        match self.query(handle, mode).await {
            Ok(PermissionState::Granted) => return Ok(true),
            Ok(PermissionState::Denied | PermissionState::Prompt) if !auto_request => {
                return Ok(false);
            }
            Ok(_) => {}
            Err(err) if err.is_capability() && auto_request => {
                tracing::debug!(handle = handle.name(), "permission query unsupported, requesting");
            }
            Err(err) if err.is_permission_denied() => return Ok(false),
            Err(err) => return Err(err),
        }

        match self.request(handle, mode).await {
            Ok(granted) => Ok(granted),
            Err(err) if err.is_permission_denied() => {
                tracing::warn!(handle = handle.name(), %mode, "{err}");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Escalate an existing read grant to read-write.
    pub async fn upgrade(&self, handle: &dyn FileSystemHandle) -> FsResult<bool> {
        self.request(handle, AccessMode::ReadWrite).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryHandle;

    #[tokio::test]
    async fn test_request_requires_gesture() {
        let gate = PermissionGate::new();
        let handle = MemoryHandle::file("a.txt", "abc");

        let err = gate.request(&handle, AccessMode::Read).await.unwrap_err();
        assert!(err.is_permission_denied());
        assert_eq!(handle.request_count(), 0);

        let _gesture = gate.user_gesture();
        assert!(gate.request(&handle, AccessMode::Read).await.unwrap());
        assert_eq!(handle.request_count(), 1);
    }

    #[tokio::test]
    async fn test_gesture_guard_releases() {
        let gate = PermissionGate::new();
        {
            let _gesture = gate.user_gesture();
            assert!(gate.has_user_activation());
        }
        assert!(!gate.has_user_activation());
    }

    #[tokio::test]
    async fn test_verify_without_auto_request_never_prompts() {
        let gate = PermissionGate::new();
        let handle = MemoryHandle::file("a.txt", "abc").with_permission(PermissionState::Prompt);
        let _gesture = gate.user_gesture();

        assert!(!gate.verify(&handle, AccessMode::Read, false).await.unwrap());
        assert_eq!(handle.request_count(), 0);
    }

    #[tokio::test]
    async fn test_verify_escalates_to_request() {
        let gate = PermissionGate::new();
        let handle = MemoryHandle::file("a.txt", "abc").with_permission(PermissionState::Prompt);
        let _gesture = gate.user_gesture();

        assert!(gate.verify(&handle, AccessMode::Read, true).await.unwrap());
        assert_eq!(handle.request_count(), 1);
        // Now granted, no further prompt.
        assert!(gate.verify(&handle, AccessMode::Read, true).await.unwrap());
        assert_eq!(handle.request_count(), 1);
    }

    #[tokio::test]
    async fn test_verify_without_gesture_returns_false() {
        let gate = PermissionGate::new();
        let handle = MemoryHandle::file("a.txt", "abc").with_permission(PermissionState::Prompt);
        assert!(!gate.verify(&handle, AccessMode::Read, true).await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_capability_fallback() {
        let gate = PermissionGate::new();
        let handle = MemoryHandle::file("a.txt", "abc").without_query_support();

        assert!(gate
            .verify(&handle, AccessMode::Read, false)
            .await
            .unwrap_err()
            .is_capability());

        let _gesture = gate.user_gesture();
        assert!(gate.verify(&handle, AccessMode::Read, true).await.unwrap());
    }

    #[tokio::test]
    async fn test_upgrade_requests_readwrite() {
        let gate = PermissionGate::new();
        let handle = MemoryHandle::file("a.txt", "abc");
        let _gesture = gate.user_gesture();

        assert_eq!(
            gate.query(&handle, AccessMode::ReadWrite).await.unwrap(),
            PermissionState::Prompt
        );
        assert!(gate.upgrade(&handle).await.unwrap());
        assert_eq!(
            gate.query(&handle, AccessMode::ReadWrite).await.unwrap(),
            PermissionState::Granted
        );
    }
}
