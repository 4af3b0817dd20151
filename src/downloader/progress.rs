use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use crate::transport::{ChatId, ChatTransport, MessageId};

/// Keeps one status message up to date while workers finish.
///
/// Callers publish the rendered text while still holding the lock that guards
/// the counters, so published values are ordered. A single editor task applies
/// only the newest value, which collapses bursts into one edit and never shows
/// an older count after a newer one.
pub struct ProgressReporter {
    latest: watch::Sender<Option<String>>,
    editor: JoinHandle<()>,
}

impl ProgressReporter {
    pub fn start(transport: Arc<dyn ChatTransport>, chat: ChatId, message: MessageId) -> Self {
        let (latest, mut updates) = watch::channel(None::<String>);

        let editor = tokio::spawn(async move {
            // Ends once the sender is dropped and the last value was applied.
            while updates.changed().await.is_ok() {
                let text = updates.borrow_and_update().clone();
                let Some(text) = text else {
                    continue;
                };
                if let Err(e) = transport.edit_text(chat, message, &text).await {
                    log::warn!("⚠️ [PROGRESS] Failed to edit status message {:?}: {}", message, e);
                }
            }
        });

        Self { latest, editor }
    }

    /// Replaces the pending status text. Never blocks.
    pub fn report(&self, text: String) {
        self.latest.send_replace(Some(text));
    }

    /// Waits until the newest reported text has been applied.
    pub async fn finish(self) {
        let Self { latest, editor } = self;
        drop(latest);
        if let Err(e) = editor.await {
            log::error!("❌ [PROGRESS] Status editor stopped unexpectedly: {}", e);
        }
    }
}
