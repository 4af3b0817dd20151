use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::api::{MediaKind, TrackDescriptor};
use crate::config::AppConfig;
use crate::downloader::cache::TokenStore;
use crate::downloader::extractor::MediaResolver;
use crate::downloader::manager::{supervise, BatchManager, BatchOutcome, BatchRequest, BatchSource};
use crate::downloader::ytdlp::TrackDownloader;
use crate::errors::{AppError, Result};
use crate::messages;
use crate::metadata::{CatalogKind, CatalogService};
use crate::search::SearchManager;
use crate::security::{InputValidator, Link};
use crate::transport::{Attachment, AttachmentKind, Button, ChatId, ChatTransport, MessageId};
use crate::utils::user_tag;

/// How long a button keeps pointing at its link.
const PENDING_LINK_TTL: Duration = Duration::from_secs(60 * 60);

// State management
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub transport: Arc<dyn ChatTransport>,
    pub resolver: Arc<dyn MediaResolver>,
    pub search: Arc<SearchManager>,
    pub downloader: Arc<dyn TrackDownloader>,
    pub catalog: Option<Arc<dyn CatalogService>>,
    pub batches: BatchManager,
    pub pending: TokenStore<String>,
    pub validator: InputValidator,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        transport: Arc<dyn ChatTransport>,
        resolver: Arc<dyn MediaResolver>,
        search: Arc<SearchManager>,
        downloader: Arc<dyn TrackDownloader>,
        catalog: Option<Arc<dyn CatalogService>>,
    ) -> Self {
        let batches = BatchManager::new(
            resolver.clone(),
            search.clone(),
            downloader.clone(),
            catalog.clone(),
            transport.clone(),
        )
        .with_limits(config.batch_concurrency, config.group_size());

        Self {
            config: Arc::new(config),
            transport,
            resolver,
            search,
            downloader,
            catalog,
            batches,
            pending: TokenStore::new(PENDING_LINK_TTL),
            validator: InputValidator::new(),
        }
    }
}

/// A text message, stripped of everything the handlers do not look at.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub chat: ChatId,
    pub message_id: MessageId,
    pub user_id: i64,
    pub user_name: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct IncomingCallback {
    pub id: String,
    pub chat: ChatId,
    /// The message carrying the pressed button.
    pub message_id: MessageId,
    /// The message that prompt was replying to, usually the user's link.
    pub reply_to: Option<MessageId>,
    pub user_id: i64,
    pub user_name: String,
    pub data: String,
}

/// Background work started by a handler.
#[derive(Debug)]
pub enum StartedJob {
    Single(JoinHandle<()>),
    Batch(JoinHandle<BatchOutcome>),
}

/// Button payloads. Everything that does not fit into 64 bytes goes through
/// the pending-link store and is referenced by token.
#[derive(Debug, Clone, PartialEq, Eq)]
enum CallbackAction {
    Download { kind: MediaKind, token: String },
    BatchYes { token: String },
    CatalogYes { kind: CatalogKind, id: String },
    Cancel,
}

impl CallbackAction {
    fn parse(data: &str) -> Option<Self> {
        let parts: Vec<&str> = data.split(':').collect();
        match parts.as_slice() {
            ["dl", kind, token] => Some(CallbackAction::Download {
                kind: MediaKind::parse(kind)?,
                token: token.to_string(),
            }),
            ["batch", "yes", token] => Some(CallbackAction::BatchYes { token: token.to_string() }),
            ["catalog", "yes", kind, id] => Some(CallbackAction::CatalogYes {
                kind: CatalogKind::parse(kind)?,
                id: id.to_string(),
            }),
            ["batch", "no"] | ["catalog", "no"] => Some(CallbackAction::Cancel),
            _ => None,
        }
    }
}

fn confirm_buttons(yes_data: String, no_data: &str) -> Vec<Vec<Button>> {
    vec![vec![
        Button::new(messages::BUTTON_YES, yes_data),
        Button::new(messages::BUTTON_NO, no_data),
    ]]
}

async fn reply(state: &AppState, chat: ChatId, text: &str, reply_to: Option<MessageId>) -> Result<MessageId> {
    state.transport.send_text(chat, text, reply_to, &[]).await
}

async fn delete_quietly(state: &AppState, chat: ChatId, message: MessageId, tag: &str) {
    if let Err(e) = state.transport.delete_message(chat, message).await {
        log::warn!("⚠️ [{}] Could not delete message {}: {}", tag, message.0, e);
    }
}

pub async fn handle_message(state: &AppState, msg: IncomingMessage) -> Result<()> {
    let tag = user_tag(&msg.user_name, msg.user_id);

    if !state.config.is_user_allowed(msg.user_id) {
        log::warn!("⛔ [{}] Ignoring message from user outside the allow list", tag);
        reply(state, msg.chat, messages::NOT_ALLOWED, Some(msg.message_id)).await?;
        return Ok(());
    }

    let text = msg.text.trim();
    if text.starts_with('/') {
        return handle_command(state, &msg, text).await;
    }

    match state.validator.classify(text) {
        Ok(Link::Media(url)) => handle_link(state, &msg, &url, &tag).await,
        Ok(Link::Catalog { kind, id }) => handle_catalog_link(state, &msg, kind, &id, &tag).await,
        Err(e) => {
            log::info!("🔗 [{}] Not a usable link: {}", tag, e);
            reply(state, msg.chat, messages::NOT_A_LINK, Some(msg.message_id)).await?;
            Ok(())
        }
    }
}

async fn handle_command(state: &AppState, msg: &IncomingMessage, text: &str) -> Result<()> {
    // "/help@SomeBot args" -> "/help"
    let command = text
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .split('@')
        .next()
        .unwrap_or_default();

    let response = match command {
        "/start" | "/help" => messages::HELP,
        _ => messages::UNKNOWN_COMMAND,
    };
    reply(state, msg.chat, response, Some(msg.message_id)).await?;
    Ok(())
}

/// Resolves a media link and asks the user what to do with it.
async fn handle_link(state: &AppState, msg: &IncomingMessage, url: &str, tag: &str) -> Result<()> {
    log::info!("🔗 [{}] Link received: {}", tag, url);
    let notice = reply(state, msg.chat, messages::FETCHING_LINK, Some(msg.message_id)).await?;

    let resolved = state.resolver.resolve_link(url).await;
    delete_quietly(state, msg.chat, notice, tag).await;

    let descriptor = match resolved {
        Ok(descriptor) => descriptor,
        Err(e) => {
            log::error!("❌ [{}] Could not resolve {}: {}", tag, url, e);
            reply(state, msg.chat, messages::RESOLUTION_FAILED, Some(msg.message_id)).await?;
            return Ok(());
        }
    };

    if descriptor.is_collection() {
        let token = state.pending.put(url.to_string()).await;
        let prompt = messages::collection_prompt(&descriptor.title, &descriptor.owner, descriptor.total_tracks());
        let buttons = confirm_buttons(format!("batch:yes:{}", token), "batch:no");
        state.transport.send_text(msg.chat, &prompt, Some(msg.message_id), &buttons).await?;
        return Ok(());
    }

    let Some(track) = descriptor.members.first() else {
        reply(state, msg.chat, messages::NOTHING_DOWNLOADABLE, Some(msg.message_id)).await?;
        return Ok(());
    };

    let kinds = track.capabilities.offered_kinds();
    if kinds.is_empty() {
        log::warn!("⚠️ [{}] {} offers nothing to download", tag, url);
        reply(state, msg.chat, messages::NOTHING_DOWNLOADABLE, Some(msg.message_id)).await?;
        return Ok(());
    }

    let token = state.pending.put(url.to_string()).await;
    let row: Vec<Button> = kinds
        .into_iter()
        .map(|kind| Button::new(messages::kind_label(kind), format!("dl:{}:{}", kind.as_str(), token)))
        .collect();
    state
        .transport
        .send_text(msg.chat, &messages::choose_format(track), Some(msg.message_id), &[row])
        .await?;
    Ok(())
}

async fn handle_catalog_link(
    state: &AppState,
    msg: &IncomingMessage,
    kind: CatalogKind,
    id: &str,
    tag: &str,
) -> Result<()> {
    let Some(catalog) = state.catalog.as_ref() else {
        reply(state, msg.chat, messages::CATALOG_DISABLED, Some(msg.message_id)).await?;
        return Ok(());
    };
    log::info!("🎧 [{}] Catalog {} link received: {}", tag, kind.as_str(), id);

    if kind != CatalogKind::Track {
        let summary = match catalog.summary(kind, id).await {
            Ok(summary) => summary,
            Err(e) => {
                log::error!("❌ [{}] Catalog lookup for {} {} failed: {}", tag, kind.as_str(), id, e);
                reply(state, msg.chat, messages::CATALOG_LOOKUP_FAILED, Some(msg.message_id)).await?;
                return Ok(());
            }
        };
        let yes_data = format!("catalog:yes:{}:{}", kind.as_str(), id);
        if let Err(e) = state.validator.validate_callback_data(&yes_data) {
            log::warn!("⚠️ [{}] {}", tag, e);
            reply(state, msg.chat, messages::CATALOG_LOOKUP_FAILED, Some(msg.message_id)).await?;
            return Ok(());
        }
        let prompt = messages::collection_prompt(&summary.name, &summary.owner, summary.total);
        let buttons = confirm_buttons(yes_data, "catalog:no");
        state.transport.send_text(msg.chat, &prompt, Some(msg.message_id), &buttons).await?;
        return Ok(());
    }

    let notice = reply(state, msg.chat, messages::CATALOG_PROCESSING, Some(msg.message_id)).await?;
    let track = match catalog.track(id).await {
        Ok(track) => track,
        Err(e) => {
            log::error!("❌ [{}] Catalog track {} could not be read: {}", tag, id, e);
            state.transport.edit_text(msg.chat, notice, messages::CATALOG_LOOKUP_FAILED).await?;
            return Ok(());
        }
    };

    let query = track.search_query();
    let url = match state.search.resolve_via_search(&query).await {
        Ok(url) => url,
        Err(e) => {
            log::warn!("🔍 [{}] '{}' not found: {}", tag, query, e);
            state.transport.edit_text(msg.chat, notice, &messages::search_not_found(&query)).await?;
            return Ok(());
        }
    };

    log::info!("🔍 [{}] '{}' found at {}", tag, query, url);
    delete_quietly(state, msg.chat, notice, tag).await;
    handle_link(state, msg, &url, tag).await
}

/// Handles a button press. Returns the job it started, if any.
pub async fn handle_callback(state: &AppState, cb: IncomingCallback) -> Result<Option<StartedJob>> {
    let tag = user_tag(&cb.user_name, cb.user_id);

    if !state.config.is_user_allowed(cb.user_id) {
        state.transport.answer_callback(&cb.id, Some(messages::NOT_ALLOWED)).await?;
        return Ok(None);
    }
    state.transport.answer_callback(&cb.id, None).await?;

    let Some(action) = CallbackAction::parse(&cb.data) else {
        log::warn!("⚠️ [{}] Unknown callback payload: {}", tag, cb.data);
        return Ok(None);
    };

    match action {
        CallbackAction::Cancel => {
            delete_quietly(state, cb.chat, cb.message_id, &tag).await;
            Ok(None)
        }
        CallbackAction::BatchYes { token } => {
            let Some(url) = state.pending.get(&token).await else {
                state.transport.edit_text(cb.chat, cb.message_id, messages::LINK_EXPIRED).await?;
                return Ok(None);
            };
            Ok(Some(start_batch(state, &cb, BatchSource::Link(url), tag).await?))
        }
        CallbackAction::CatalogYes { kind, id } => {
            if state.catalog.is_none() {
                state.transport.edit_text(cb.chat, cb.message_id, messages::CATALOG_DISABLED).await?;
                return Ok(None);
            }
            Ok(Some(start_batch(state, &cb, BatchSource::Catalog { kind, id }, tag).await?))
        }
        CallbackAction::Download { kind, token } => {
            delete_quietly(state, cb.chat, cb.message_id, &tag).await;
            let Some(url) = state.pending.get(&token).await else {
                reply(state, cb.chat, messages::LINK_EXPIRED, cb.reply_to).await?;
                return Ok(None);
            };
            start_single(state, &cb, &url, kind, tag).await
        }
    }
}

async fn start_batch(state: &AppState, cb: &IncomingCallback, source: BatchSource, tag: String) -> Result<StartedJob> {
    state.transport.edit_text(cb.chat, cb.message_id, messages::BATCH_STARTING).await?;
    let request = BatchRequest {
        chat: cb.chat,
        status_message: cb.message_id,
        source,
        tag,
    };
    Ok(StartedJob::Batch(state.batches.spawn_batch(request)))
}

async fn start_single(
    state: &AppState,
    cb: &IncomingCallback,
    url: &str,
    kind: MediaKind,
    tag: String,
) -> Result<Option<StartedJob>> {
    // served from the metadata cache when the link was resolved recently
    let track = match state.resolver.resolve_link(url).await {
        Ok(descriptor) => descriptor.members.into_iter().next(),
        Err(e) => {
            log::error!("❌ [{}] Could not re-resolve {}: {}", tag, url, e);
            None
        }
    };
    let Some(track) = track else {
        reply(state, cb.chat, messages::RESOLUTION_FAILED, cb.reply_to).await?;
        return Ok(None);
    };

    let download_url = if track.source_url.is_empty() { url.to_string() } else { track.source_url.clone() };
    let job = SingleTrackJob {
        transport: state.transport.clone(),
        downloader: state.downloader.clone(),
        chat: cb.chat,
        reply_to: cb.reply_to,
        url: download_url,
        kind,
        track,
        tag,
    };
    let transport = state.transport.clone();
    let chat = cb.chat;
    let handle = tokio::spawn(async move {
        let tag = job.tag.clone();
        supervise(transport, chat, None, &tag, job.run()).await;
    });
    Ok(Some(StartedJob::Single(handle)))
}

/// Downloads one track in the requested form and sends it back.
struct SingleTrackJob {
    transport: Arc<dyn ChatTransport>,
    downloader: Arc<dyn TrackDownloader>,
    chat: ChatId,
    reply_to: Option<MessageId>,
    url: String,
    kind: MediaKind,
    track: TrackDescriptor,
    tag: String,
}

impl SingleTrackJob {
    async fn run(self) {
        if let Err(e) = self.execute().await {
            log::error!("❌ [{}] Single download of {} failed: {}", self.tag, self.url, e);
        }
    }

    async fn execute(&self) -> Result<()> {
        log::info!("⏬ [{}] {} download of {}", self.tag, self.kind.as_str(), self.url);
        let notice = self
            .transport
            .send_text(self.chat, &messages::downloading(self.kind, &self.track), self.reply_to, &[])
            .await?;

        let downloaded = self.downloader.download(&self.url, self.kind, &self.track, &self.tag).await;
        if let Err(e) = self.transport.delete_message(self.chat, notice).await {
            log::warn!("⚠️ [{}] Could not delete download notice: {}", self.tag, e);
        }

        let file = match downloaded {
            Ok(file) => file,
            Err(e) => {
                self.transport
                    .send_text(self.chat, &messages::download_failed(self.kind, &self.track.title), self.reply_to, &[])
                    .await?;
                return Err(e);
            }
        };

        let attachment = Attachment {
            path: file.path().to_path_buf(),
            title: Some(file.title().to_string()),
            performer: Some(file.performer().to_string()),
            caption: Some(messages::caption(self.kind, file.track())),
        };
        let kind = AttachmentKind::for_file(Some(self.kind), file.extension());
        let sent = self.transport.send_attachment(self.chat, kind, attachment, self.reply_to).await;
        file.remove().await;

        match sent {
            Ok(()) => {
                log::info!("✅ [{}] Sent {} for '{}'", self.tag, self.kind.as_str(), self.track.title);
                Ok(())
            }
            Err(e) => {
                self.transport
                    .send_text(self.chat, &messages::send_failed(self.kind, &self.track.title), self.reply_to, &[])
                    .await?;
                Err(AppError::Delivery(e.to_string()))
            }
        }
    }
}
