// Transport-neutral view of the chat API used by the jobs.

use std::path::PathBuf;
use async_trait::async_trait;
use crate::api::MediaKind;
use crate::errors::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// One inline button; `data` comes back in the callback event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub data: String,
}

impl Button {
    pub fn new(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self { label: label.into(), data: data.into() }
    }
}

/// Attachment sent from a local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub path: PathBuf,
    pub title: Option<String>,
    pub performer: Option<String>,
    pub caption: Option<String>,
}

/// How a single attachment is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Audio,
    Video,
    Photo,
    Document,
}

impl AttachmentKind {
    /// Picks the presentation for a finished download, from the requested
    /// kind first and the file extension second. Anything else is a document.
    pub fn for_file(kind: Option<MediaKind>, extension: &str) -> Self {
        let extension = extension.to_ascii_lowercase();
        match (kind, extension.as_str()) {
            (Some(MediaKind::Audio), _) | (_, "mp3") => AttachmentKind::Audio,
            (Some(MediaKind::Video), _) | (_, "mp4" | "mkv" | "webm") => AttachmentKind::Video,
            (Some(MediaKind::Image), _) | (_, "jpg" | "jpeg" | "png" | "webp") => AttachmentKind::Photo,
            _ => AttachmentKind::Document,
        }
    }
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_text(
        &self,
        chat: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
        buttons: &[Vec<Button>],
    ) -> Result<MessageId>;

    /// Edits a message in place; any inline buttons are removed.
    async fn edit_text(&self, chat: ChatId, message: MessageId, text: &str) -> Result<()>;

    async fn delete_message(&self, chat: ChatId, message: MessageId) -> Result<()>;

    async fn send_attachment(
        &self,
        chat: ChatId,
        kind: AttachmentKind,
        attachment: Attachment,
        reply_to: Option<MessageId>,
    ) -> Result<()>;

    /// Sends up to ten audio files as one multi-attachment message.
    async fn send_media_group(&self, chat: ChatId, items: Vec<Attachment>) -> Result<()>;

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> Result<()>;
}
