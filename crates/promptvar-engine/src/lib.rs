//! Variable resolution for promptvar templates.
//!
//! [`VariableEngine`] loads a template, tracks the editing state of each
//! variable and resolves the template against local values, a
//! [`GlobalVariableStore`] and file or directory entries read through
//! [`promptvar_fs::FileResolver`].

mod engine;
mod error;
mod sink;
mod state;
mod store;
mod substitute;

pub use engine::{CopyReport, Resolution, VariableEngine};
pub use error::{EngineError, EngineResult};
pub use sink::{
    ClipboardSink, MemoryClipboard, NoopNotifier, NotificationSink, RecordingNotifier,
    ResolutionOutcome, TracingNotifier,
};
pub use state::{TemplateVariableState, ValidationRules, VariableStatus};
pub use store::{GlobalVariableStore, InMemoryGlobalStore};
pub use substitute::{substitute, used_variables};
