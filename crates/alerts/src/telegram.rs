//! Telegram messaging: outbound notifications and the inbound command loop.

use crate::commands::CommandProcessor;
use async_trait::async_trait;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{LinkPreviewOptions, ParseMode};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Error, Debug)]
pub enum TelegramError {
    #[error("Telegram API error: {0}")]
    Api(#[from] teloxide::RequestError),
    #[error("Invalid chat id: {0}")]
    InvalidChatId(String),
}

/// Outbound text channel to a chat.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send an HTML-formatted message. Failures are logged and reported as
    /// `false`; they are never raised.
    async fn send(&self, chat_id: &str, text: &str) -> bool;
}

/// Telegram bot wrapper.
#[derive(Clone)]
pub struct TelegramBot {
    bot: Bot,
}

impl TelegramBot {
    /// Create a new bot with the given token.
    pub fn new(token: &str) -> Self {
        Self {
            bot: Bot::new(token),
        }
    }

    /// Send a message to a chat with HTML markup.
    pub async fn send_html(&self, chat_id: &str, text: &str) -> Result<(), TelegramError> {
        let chat_id: i64 = chat_id
            .parse()
            .map_err(|_| TelegramError::InvalidChatId(chat_id.to_string()))?;
        self.bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html)
            .link_preview_options(no_link_preview())
            .await?;
        Ok(())
    }

    /// Run the inbound command loop until `shutdown` flips to true.
    ///
    /// teloxide long-polls `getUpdates` and advances the update offset only
    /// after a successful fetch. Every text message is handed to `processor`.
    pub async fn run(self, processor: Arc<CommandProcessor>, mut shutdown: watch::Receiver<bool>) {
        let handler = Update::filter_message().endpoint(move |msg: Message| {
            let processor = Arc::clone(&processor);
            async move {
                if let Some(text) = msg.text() {
                    let chat_id = msg.chat.id.to_string();
                    processor
                        .handle(&chat_id, sender_username(&msg), text)
                        .await;
                }
                respond(())
            }
        });

        let mut dispatcher = Dispatcher::builder(self.bot.clone(), handler).build();

        info!("Telegram command loop started");
        tokio::select! {
            _ = dispatcher.dispatch() => {}
            _ = shutdown.wait_for(|stop| *stop) => {}
        }
        info!("Telegram command loop stopped");
    }
}

/// Explorer links in notifications should not unfurl into previews.
fn no_link_preview() -> LinkPreviewOptions {
    LinkPreviewOptions {
        is_disabled: true,
        url: None,
        prefer_small_media: false,
        prefer_large_media: false,
        show_above_text: false,
    }
}

/// Username of the person who sent the message (not of the chat, which
/// differs in groups).
fn sender_username(msg: &Message) -> Option<&str> {
    msg.from.as_ref().and_then(|user| user.username.as_deref())
}

#[async_trait]
impl Messenger for TelegramBot {
    async fn send(&self, chat_id: &str, text: &str) -> bool {
        match self.send_html(chat_id, text).await {
            Ok(()) => true,
            Err(e) => {
                error!(chat_id, error = %e, "Failed to send message");
                false
            }
        }
    }
}
