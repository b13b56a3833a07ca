//! System clipboard sink.

use promptvar_core::BoxFuture;
use promptvar_engine::{ClipboardSink, EngineError, EngineResult};

/// Writes to the desktop clipboard through `arboard`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClipboard;

impl ClipboardSink for SystemClipboard {
    fn write_text(&self, text: String) -> BoxFuture<'_, EngineResult<()>> {
        Box::pin(async move {
            // arboard talks to the display server synchronously.
            tokio::task::spawn_blocking(move || {
                let mut clipboard =
                    arboard::Clipboard::new().map_err(|e| EngineError::clipboard(e.to_string()))?;
                clipboard
                    .set_text(text)
                    .map_err(|e| EngineError::clipboard(e.to_string()))
            })
            .await
            .map_err(|e| EngineError::clipboard(e.to_string()))?
        })
    }
}
