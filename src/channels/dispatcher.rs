//! Fan a prepared message out to every channel a user has enabled.
//!
//! Channels run concurrently and never see each other's failures. Each
//! individual send is bounded by the configured timeout.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::traits::{
    ChatBotSender, NotificationStore, OutboundMessage, PushDelivery, PushSender,
    UserNotificationSettings,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Push,
    ChatBot,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChannelOutcome {
    /// Channel disabled, unconfigured, or has nowhere to send.
    Skipped { reason: String },
    /// At least one send went through, or every target was pruned.
    Delivered { sent: usize, pruned: usize },
    Failed { error: String },
}

impl ChannelOutcome {
    fn skipped(reason: &str) -> Self {
        Self::Skipped {
            reason: reason.to_string(),
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { sent, .. } if *sent > 0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchReport {
    pub push: ChannelOutcome,
    pub chat_bot: ChannelOutcome,
}

impl DispatchReport {
    pub fn delivered_any(&self) -> bool {
        self.push.is_delivered() || self.chat_bot.is_delivered()
    }
}

/// Channels the user has enabled and configured well enough to attempt.
pub fn channels_for(settings: &UserNotificationSettings) -> Vec<ChannelKind> {
    let mut channels = Vec::new();
    if settings.push_enabled {
        channels.push(ChannelKind::Push);
    }
    if settings.chat_bot_enabled && settings.chat_bot_credentials().is_some() {
        channels.push(ChannelKind::ChatBot);
    }
    channels
}

pub struct Dispatcher {
    notifications: Arc<dyn NotificationStore>,
    push: Option<Arc<dyn PushSender>>,
    chat_bot: Option<Arc<dyn ChatBotSender>>,
    send_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        notifications: Arc<dyn NotificationStore>,
        push: Option<Arc<dyn PushSender>>,
        chat_bot: Option<Arc<dyn ChatBotSender>>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            notifications,
            push,
            chat_bot,
            send_timeout,
        }
    }

    /// Enabled channels that can actually reach the user right now: the
    /// daemon has a transport for them and, for push, the user has at least
    /// one subscription.
    pub async fn reachable_channels(
        &self,
        settings: &UserNotificationSettings,
    ) -> anyhow::Result<Vec<ChannelKind>> {
        let mut reachable = Vec::new();
        for channel in channels_for(settings) {
            let ready = match channel {
                ChannelKind::Push => {
                    self.push.is_some()
                        && !self
                            .notifications
                            .push_subscriptions(&settings.owner_id)
                            .await?
                            .is_empty()
                }
                ChannelKind::ChatBot => self.chat_bot.is_some(),
            };
            if ready {
                reachable.push(channel);
            }
        }
        Ok(reachable)
    }

    pub async fn dispatch(
        &self,
        settings: &UserNotificationSettings,
        message: &OutboundMessage,
    ) -> DispatchReport {
        let channels = channels_for(settings);
        let (push, chat_bot) = tokio::join!(
            async {
                if channels.contains(&ChannelKind::Push) {
                    self.dispatch_push(&settings.owner_id, message).await
                } else {
                    ChannelOutcome::skipped("push disabled")
                }
            },
            async {
                if channels.contains(&ChannelKind::ChatBot) {
                    self.dispatch_chat_bot(settings, message).await
                } else {
                    ChannelOutcome::skipped("chat bot disabled or missing credentials")
                }
            }
        );

        debug!(
            user = %settings.owner_id,
            push = ?push,
            chat_bot = ?chat_bot,
            "Dispatch finished"
        );
        DispatchReport { push, chat_bot }
    }

    async fn dispatch_push(&self, owner_id: &str, message: &OutboundMessage) -> ChannelOutcome {
        let Some(sender) = self.push.as_ref() else {
            return ChannelOutcome::skipped("no push transport configured");
        };

        let subscriptions = match self.notifications.push_subscriptions(owner_id).await {
            Ok(subs) => subs,
            Err(e) => {
                warn!(user = %owner_id, "Failed to load push subscriptions: {}", e);
                return ChannelOutcome::Failed {
                    error: e.to_string(),
                };
            }
        };
        if subscriptions.is_empty() {
            return ChannelOutcome::skipped("no push subscriptions");
        }

        let mut sent = 0usize;
        let mut pruned = 0usize;
        let mut last_error: Option<String> = None;

        for subscription in &subscriptions {
            let result =
                tokio::time::timeout(self.send_timeout, sender.send(subscription, message)).await;
            match result {
                Ok(Ok(PushDelivery::Delivered)) => sent += 1,
                Ok(Ok(PushDelivery::Gone)) => {
                    info!(
                        user = %owner_id,
                        subscription = %subscription.id,
                        "Push subscription expired, removing"
                    );
                    match self
                        .notifications
                        .delete_push_subscription(&subscription.id)
                        .await
                    {
                        Ok(()) => pruned += 1,
                        Err(e) => warn!(
                            subscription = %subscription.id,
                            "Failed to delete expired subscription: {}", e
                        ),
                    }
                }
                Ok(Err(e)) => {
                    warn!(
                        user = %owner_id,
                        subscription = %subscription.id,
                        channel = sender.name(),
                        "Push send failed: {}", e
                    );
                    last_error = Some(e.to_string());
                }
                Err(_) => {
                    warn!(
                        user = %owner_id,
                        subscription = %subscription.id,
                        "Push send timed out after {:?}", self.send_timeout
                    );
                    last_error = Some(format!("timed out after {:?}", self.send_timeout));
                }
            }
        }

        match last_error {
            Some(error) if sent == 0 => ChannelOutcome::Failed { error },
            _ => ChannelOutcome::Delivered { sent, pruned },
        }
    }

    async fn dispatch_chat_bot(
        &self,
        settings: &UserNotificationSettings,
        message: &OutboundMessage,
    ) -> ChannelOutcome {
        let Some(sender) = self.chat_bot.as_ref() else {
            return ChannelOutcome::skipped("no chat bot transport configured");
        };
        let Some((token, chat_id)) = settings.chat_bot_credentials() else {
            return ChannelOutcome::skipped("missing chat bot credentials");
        };

        let text = message.chat_text();
        match tokio::time::timeout(self.send_timeout, sender.send(token, chat_id, &text)).await {
            Ok(Ok(())) => ChannelOutcome::Delivered { sent: 1, pruned: 0 },
            Ok(Err(e)) => {
                warn!(
                    user = %settings.owner_id,
                    channel = sender.name(),
                    "Chat bot send failed: {}", e
                );
                ChannelOutcome::Failed {
                    error: e.to_string(),
                }
            }
            Err(_) => {
                warn!(
                    user = %settings.owner_id,
                    "Chat bot send timed out after {:?}", self.send_timeout
                );
                ChannelOutcome::Failed {
                    error: format!("timed out after {:?}", self.send_timeout),
                }
            }
        }
    }
}
