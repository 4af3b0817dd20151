use std::sync::Arc;
use crate::config::MAX_MEDIA_GROUP_SIZE;
use crate::downloader::DownloadedFile;
use crate::errors::AppError;
use crate::transport::{Attachment, ChatId, ChatTransport};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub groups_sent: usize,
    pub groups_failed: usize,
    pub files_delivered: usize,
    /// One rendered [`AppError::Delivery`] per rejected group.
    pub errors: Vec<String>,
}

/// Sends finished files as multi-attachment messages and cleans them up.
pub struct DeliveryBatcher {
    transport: Arc<dyn ChatTransport>,
    group_size: usize,
}

impl DeliveryBatcher {
    pub fn new(transport: Arc<dyn ChatTransport>, group_size: usize) -> Self {
        Self {
            transport,
            group_size: group_size.clamp(1, MAX_MEDIA_GROUP_SIZE),
        }
    }

    /// Sends `files` in chunks, keeping their order.
    ///
    /// A rejected chunk is recorded in the report and the remaining chunks
    /// are still sent.
    /// Every file is removed from disk once all chunks were attempted.
    pub async fn deliver(&self, chat: ChatId, files: Vec<DownloadedFile>, tag: &str) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        let total_groups = files.len().div_ceil(self.group_size);

        for (index, chunk) in files.chunks(self.group_size).enumerate() {
            let items: Vec<Attachment> = chunk
                .iter()
                .map(|file| Attachment {
                    path: file.path().to_path_buf(),
                    title: Some(file.title().to_string()),
                    performer: Some(file.performer().to_string()),
                    caption: None,
                })
                .collect();

            log::info!("📤 [{}] Sending group {}/{} ({} file(s))", tag, index + 1, total_groups, items.len());
            match self.transport.send_media_group(chat, items).await {
                Ok(()) => {
                    report.groups_sent += 1;
                    report.files_delivered += chunk.len();
                }
                Err(e) => {
                    let error = AppError::Delivery(format!("group {}/{} rejected: {}", index + 1, total_groups, e));
                    log::error!("❌ [{}] {}", tag, error);
                    report.groups_failed += 1;
                    report.errors.push(error.to_string());
                }
            }
        }

        for file in files {
            file.remove().await;
        }

        log::info!(
            "✅ [{}] Delivery finished: {} group(s) sent, {} failed, {} file(s) delivered",
            tag,
            report.groups_sent,
            report.groups_failed,
            report.files_delivered
        );
        report
    }
}
