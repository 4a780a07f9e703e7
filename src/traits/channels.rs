use async_trait::async_trait;

use crate::traits::{OutboundMessage, PushSubscription};

/// Result of a push send that did not error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushDelivery {
    Delivered,
    /// The push service reports the subscription no longer exists (HTTP 404/410).
    /// The caller should delete it.
    Gone,
}

/// Transport for web-push notifications.
///
/// Implementations deliver to exactly one subscription per call. Transient
/// failures are returned as errors; an expired subscription is not an error
/// but a `PushDelivery::Gone` so the dispatcher can prune it.
#[async_trait]
pub trait PushSender: Send + Sync {
    fn name(&self) -> &str;

    async fn send(
        &self,
        subscription: &PushSubscription,
        message: &OutboundMessage,
    ) -> anyhow::Result<PushDelivery>;
}

/// Transport for chat-bot messages (Telegram-style bot token + chat id).
#[async_trait]
pub trait ChatBotSender: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, bot_token: &str, chat_id: &str, text: &str) -> anyhow::Result<()>;
}
