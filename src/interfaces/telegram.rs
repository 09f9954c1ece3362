use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::Recipient;
use tracing::info;

use crate::core::report::ReportSink;

/// Posts cycle reports to a Telegram chat through the Bot API.
pub struct TelegramSink {
    bot: Bot,
    chat: Recipient,
}

impl TelegramSink {
    pub fn new(token: &str, chat_id: &str) -> Self {
        Self {
            bot: Bot::new(token),
            chat: parse_recipient(chat_id),
        }
    }
}

/// Numeric ids address users and groups; anything else is taken as a `@channel` name.
pub(crate) fn parse_recipient(chat_id: &str) -> Recipient {
    let chat_id = chat_id.trim();
    match chat_id.parse::<i64>() {
        Ok(id) => Recipient::Id(ChatId(id)),
        Err(_) => Recipient::ChannelUsername(chat_id.to_string()),
    }
}

#[async_trait]
impl ReportSink for TelegramSink {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn deliver(&self, summary: &str) -> Result<()> {
        self.bot
            .send_message(self.chat.clone(), summary.to_string())
            .await
            .context("Telegram sendMessage failed")?;
        info!("Cycle report sent to Telegram");
        Ok(())
    }
}
