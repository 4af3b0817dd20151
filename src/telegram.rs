// Telegram side of the bot: the transport used by jobs and the update dispatcher.

use std::sync::Arc;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{
    CallbackQuery, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, InputMedia, InputMediaAudio,
    Message, ReplyParameters, User,
};

use crate::commands::{self, AppState, IncomingCallback, IncomingMessage};
use crate::errors::Result;
use crate::transport::{self, Attachment, AttachmentKind, Button, ChatTransport};

fn chat_id(chat: transport::ChatId) -> teloxide::types::ChatId {
    teloxide::types::ChatId(chat.0)
}

fn message_id(message: transport::MessageId) -> teloxide::types::MessageId {
    teloxide::types::MessageId(message.0)
}

fn keyboard(buttons: &[Vec<Button>]) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(buttons.iter().map(|row| {
        row.iter()
            .map(|b| InlineKeyboardButton::callback(b.label.clone(), b.data.clone()))
            .collect::<Vec<_>>()
    }))
}

pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send_text(
        &self,
        chat: transport::ChatId,
        text: &str,
        reply_to: Option<transport::MessageId>,
        buttons: &[Vec<Button>],
    ) -> Result<transport::MessageId> {
        let mut request = self.bot.send_message(chat_id(chat), text);
        if let Some(reply_to) = reply_to {
            request = request.reply_parameters(ReplyParameters::new(message_id(reply_to)));
        }
        if !buttons.is_empty() {
            request = request.reply_markup(keyboard(buttons));
        }
        let sent = request.await?;
        Ok(transport::MessageId(sent.id.0))
    }

    async fn edit_text(&self, chat: transport::ChatId, message: transport::MessageId, text: &str) -> Result<()> {
        // no reply_markup in the edit drops the inline keyboard
        self.bot.edit_message_text(chat_id(chat), message_id(message), text).await?;
        Ok(())
    }

    async fn delete_message(&self, chat: transport::ChatId, message: transport::MessageId) -> Result<()> {
        self.bot.delete_message(chat_id(chat), message_id(message)).await?;
        Ok(())
    }

    async fn send_attachment(
        &self,
        chat: transport::ChatId,
        kind: AttachmentKind,
        attachment: Attachment,
        reply_to: Option<transport::MessageId>,
    ) -> Result<()> {
        let chat = chat_id(chat);
        let file = InputFile::file(&attachment.path);
        let reply = reply_to.map(|id| ReplyParameters::new(message_id(id)));

        match kind {
            AttachmentKind::Audio => {
                let mut request = self.bot.send_audio(chat, file);
                if let Some(title) = attachment.title {
                    request = request.title(title);
                }
                if let Some(performer) = attachment.performer {
                    request = request.performer(performer);
                }
                if let Some(caption) = attachment.caption {
                    request = request.caption(caption);
                }
                if let Some(reply) = reply {
                    request = request.reply_parameters(reply);
                }
                request.await?;
            }
            AttachmentKind::Video => {
                let mut request = self.bot.send_video(chat, file).supports_streaming(true);
                if let Some(caption) = attachment.caption {
                    request = request.caption(caption);
                }
                if let Some(reply) = reply {
                    request = request.reply_parameters(reply);
                }
                request.await?;
            }
            AttachmentKind::Photo => {
                let mut request = self.bot.send_photo(chat, file);
                if let Some(caption) = attachment.caption {
                    request = request.caption(caption);
                }
                if let Some(reply) = reply {
                    request = request.reply_parameters(reply);
                }
                request.await?;
            }
            AttachmentKind::Document => {
                let mut request = self.bot.send_document(chat, file);
                if let Some(caption) = attachment.caption {
                    request = request.caption(caption);
                }
                if let Some(reply) = reply {
                    request = request.reply_parameters(reply);
                }
                request.await?;
            }
        }
        Ok(())
    }

    async fn send_media_group(&self, chat: transport::ChatId, mut items: Vec<Attachment>) -> Result<()> {
        // the API rejects groups of one
        if items.len() == 1 {
            if let Some(item) = items.pop() {
                return self.send_attachment(chat, AttachmentKind::Audio, item, None).await;
            }
        }

        let media: Vec<InputMedia> = items
            .into_iter()
            .map(|item| {
                let mut audio = InputMediaAudio::new(InputFile::file(&item.path));
                if let Some(title) = item.title {
                    audio = audio.title(title);
                }
                if let Some(performer) = item.performer {
                    audio = audio.performer(performer);
                }
                InputMedia::Audio(audio)
            })
            .collect();

        self.bot.send_media_group(chat_id(chat), media).await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        let mut request = self.bot.answer_callback_query(callback_id.to_string());
        if let Some(text) = text {
            request = request.text(text).show_alert(true);
        }
        request.await?;
        Ok(())
    }
}

fn user_fields(user: Option<&User>) -> (i64, String) {
    match user {
        Some(user) => {
            let name = user.username.clone().unwrap_or_else(|| user.first_name.clone());
            (user.id.0 as i64, name)
        }
        None => (0, "unknown".to_string()),
    }
}

fn incoming_message(msg: &Message) -> Option<IncomingMessage> {
    let text = msg.text()?;
    let (user_id, user_name) = user_fields(msg.from.as_ref());
    Some(IncomingMessage {
        chat: transport::ChatId(msg.chat.id.0),
        message_id: transport::MessageId(msg.id.0),
        user_id,
        user_name,
        text: text.to_string(),
    })
}

fn incoming_callback(query: &CallbackQuery) -> Option<IncomingCallback> {
    let message = query.message.as_ref()?;
    let reply_to = message
        .regular_message()
        .and_then(Message::reply_to_message)
        .map(|m| transport::MessageId(m.id.0));
    let (user_id, user_name) = user_fields(Some(&query.from));

    Some(IncomingCallback {
        id: query.id.clone(),
        chat: transport::ChatId(message.chat().id.0),
        message_id: transport::MessageId(message.id().0),
        reply_to,
        user_id,
        user_name,
        data: query.data.clone()?,
    })
}

async fn on_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(incoming) = incoming_message(&msg) else {
        return Ok(());
    };
    if let Err(e) = commands::handle_message(&state, incoming).await {
        log::error!("❌ Message handler failed in chat {}: {}", msg.chat.id, e);
    }
    Ok(())
}

async fn on_callback(query: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(incoming) = incoming_callback(&query) else {
        log::debug!("Ignoring callback {} without message or data", query.id);
        return Ok(());
    };
    // jobs run detached; their handles are only awaited in tests
    if let Err(e) = commands::handle_callback(&state, incoming).await {
        log::error!("❌ Callback handler failed for {}: {}", query.id, e);
    }
    Ok(())
}

/// Polls for updates until the process is interrupted.
pub async fn run_dispatcher(bot: Bot, state: Arc<AppState>) {
    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(on_message))
        .branch(Update::filter_callback_query().endpoint(on_callback));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}
