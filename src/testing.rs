//! Test infrastructure: in-memory store and recording channel doubles.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use tokio::sync::Mutex;

use crate::state::SqliteStore;
use crate::traits::{ChatBotSender, OutboundMessage, PushDelivery, PushSender, PushSubscription};

/// Fresh in-memory store with all migrations applied.
///
/// A single connection keeps every query on the same `:memory:` database.
pub async fn setup_test_store() -> Arc<SqliteStore> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    Arc::new(SqliteStore::from_pool(pool).await.unwrap())
}

// ---------------------------------------------------------------------------
// MockPushSender
// ---------------------------------------------------------------------------

/// A push send captured by [`MockPushSender`].
#[derive(Debug, Clone)]
pub struct SentPush {
    pub endpoint: String,
    pub message: OutboundMessage,
}

/// Push transport that records sends. Endpoints can be scripted to fail,
/// report `Gone`, or hang.
pub struct MockPushSender {
    pub sent: Mutex<Vec<SentPush>>,
    failing: HashSet<String>,
    gone: HashSet<String>,
    delay: Option<Duration>,
}

impl MockPushSender {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: HashSet::new(),
            gone: HashSet::new(),
            delay: None,
        }
    }

    pub fn failing_on(mut self, endpoint: &str) -> Self {
        self.failing.insert(endpoint.to_string());
        self
    }

    pub fn gone_on(mut self, endpoint: &str) -> Self {
        self.gone.insert(endpoint.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[async_trait]
impl PushSender for MockPushSender {
    fn name(&self) -> &str {
        "mock-push"
    }

    async fn send(
        &self,
        subscription: &PushSubscription,
        message: &OutboundMessage,
    ) -> anyhow::Result<PushDelivery> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(&subscription.endpoint) {
            anyhow::bail!("push service unavailable");
        }
        if self.gone.contains(&subscription.endpoint) {
            return Ok(PushDelivery::Gone);
        }
        self.sent.lock().await.push(SentPush {
            endpoint: subscription.endpoint.clone(),
            message: message.clone(),
        });
        Ok(PushDelivery::Delivered)
    }
}

// ---------------------------------------------------------------------------
// MockChatBot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SentChat {
    pub chat_id: String,
    pub text: String,
}

/// Chat-bot transport that records sends, or fails every call.
pub struct MockChatBot {
    pub sent: Mutex<Vec<SentChat>>,
    fail: bool,
}

impl MockChatBot {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[async_trait]
impl ChatBotSender for MockChatBot {
    fn name(&self) -> &str {
        "mock-chat"
    }

    async fn send(&self, _bot_token: &str, chat_id: &str, text: &str) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("bot api returned 500");
        }
        self.sent.lock().await.push(SentChat {
            chat_id: chat_id.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }
}

/// A push subscription for `owner` at `endpoint`.
pub fn subscription(owner_id: &str, endpoint: &str) -> PushSubscription {
    PushSubscription {
        id: uuid::Uuid::new_v4().to_string(),
        owner_id: owner_id.to_string(),
        endpoint: endpoint.to_string(),
        p256dh: "BPk3".to_string(),
        auth: "x9a1".to_string(),
        created_at: chrono::Utc::now(),
    }
}
