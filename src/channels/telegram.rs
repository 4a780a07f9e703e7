use std::collections::HashMap;
use std::sync::RwLock as StdRwLock;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::Recipient;
use tracing::warn;

use super::formatting::{split_message, TELEGRAM_MAX_LEN};
use crate::traits::ChatBotSender;

/// Chat-bot transport backed by the Telegram Bot API.
///
/// Each user brings their own bot token, so bots are built lazily and cached
/// per token.
pub struct TelegramSender {
    bots: StdRwLock<HashMap<String, Bot>>,
}

impl TelegramSender {
    pub fn new() -> Self {
        Self {
            bots: StdRwLock::new(HashMap::new()),
        }
    }

    fn bot_for(&self, bot_token: &str) -> Bot {
        if let Ok(bots) = self.bots.read() {
            if let Some(bot) = bots.get(bot_token) {
                return bot.clone();
            }
        }
        let bot = Bot::new(bot_token);
        if let Ok(mut bots) = self.bots.write() {
            bots.insert(bot_token.to_string(), bot.clone());
        }
        bot
    }
}

impl Default for TelegramSender {
    fn default() -> Self {
        Self::new()
    }
}

/// Numeric ids address users and groups; `@name` addresses public channels.
pub(crate) fn parse_recipient(chat_id: &str) -> anyhow::Result<Recipient> {
    let chat_id = chat_id.trim();
    if let Ok(id) = chat_id.parse::<i64>() {
        return Ok(Recipient::Id(ChatId(id)));
    }
    if chat_id.starts_with('@') && chat_id.len() > 1 {
        return Ok(Recipient::ChannelUsername(chat_id.to_string()));
    }
    anyhow::bail!("invalid Telegram chat id '{}'", chat_id)
}

#[async_trait]
impl ChatBotSender for TelegramSender {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, bot_token: &str, chat_id: &str, text: &str) -> anyhow::Result<()> {
        let recipient = parse_recipient(chat_id)?;
        let bot = self.bot_for(bot_token);

        for chunk in split_message(text, TELEGRAM_MAX_LEN) {
            if let Err(e) = bot.send_message(recipient.clone(), chunk).await {
                warn!(chat_id = %chat_id, "Failed to send Telegram message: {}", e);
                return Err(anyhow::anyhow!("Failed to send Telegram message: {}", e));
            }
        }
        Ok(())
    }
}
