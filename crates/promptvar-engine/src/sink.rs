//! Clipboard and notification sinks for resolve-and-copy.

use std::fmt;
use std::sync::Mutex;

use itertools::Itertools;
use serde::Serialize;

use promptvar_core::BoxFuture;
use promptvar_fs::EntryDiagnosis;

use crate::error::EngineResult;

/// Destination of the fully resolved text.
pub trait ClipboardSink: fmt::Debug + Send + Sync {
    /// Replace the clipboard contents with `text`.
    fn write_text(&self, text: String) -> BoxFuture<'_, EngineResult<()>>;
}

/// How a resolve-and-copy request ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum ResolutionOutcome {
    /// Every referenced variable resolved and the text was copied.
    Success,
    /// The text was copied but some file or directory entries are missing.
    Partial { diagnostics: Vec<EntryDiagnosis> },
    /// Nothing was copied.
    Failure { message: String },
}

impl ResolutionOutcome {
    /// Short label for the outcome.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial { .. } => "partial",
            Self::Failure { .. } => "failure",
        }
    }
}

/// Receives resolution outcomes as discrete events.
pub trait NotificationSink: fmt::Debug + Send + Sync {
    /// Report an outcome.
    fn notify(&self, outcome: &ResolutionOutcome);
}

/// Drops every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl NotificationSink for NoopNotifier {
    fn notify(&self, _outcome: &ResolutionOutcome) {}
}

/// Reports outcomes through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn notify(&self, outcome: &ResolutionOutcome) {
        match outcome {
            ResolutionOutcome::Success => tracing::info!("copied resolved template"),
            ResolutionOutcome::Partial { diagnostics } => {
                let problems = diagnostics.iter().map(EntryDiagnosis::message).join("; ");
                tracing::warn!(unresolved = diagnostics.len(), "copied with gaps: {problems}");
            }
            ResolutionOutcome::Failure { message } => {
                tracing::error!("could not copy template: {message}");
            }
        }
    }
}

/// Clipboard that keeps the last written text in memory.
#[derive(Debug, Default)]
pub struct MemoryClipboard {
    text: Mutex<Option<String>>,
}

impl MemoryClipboard {
    /// Create an empty clipboard.
    pub fn new() -> Self {
        Self::default()
    }

    /// The last written text.
    pub fn text(&self) -> Option<String> {
        self.text.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl ClipboardSink for MemoryClipboard {
    fn write_text(&self, text: String) -> BoxFuture<'_, EngineResult<()>> {
        Box::pin(async move {
            *self.text.lock().unwrap_or_else(|e| e.into_inner()) = Some(text);
            Ok(())
        })
    }
}

/// Notifier that records every outcome.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    outcomes: Mutex<Vec<ResolutionOutcome>>,
}

impl RecordingNotifier {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Outcomes received so far.
    pub fn outcomes(&self) -> Vec<ResolutionOutcome> {
        self.outcomes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify(&self, outcome: &ResolutionOutcome) {
        self.outcomes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(outcome.clone());
    }
}
