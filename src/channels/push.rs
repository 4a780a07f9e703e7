use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;

use crate::traits::{OutboundMessage, PushDelivery, PushSender, PushSubscription};

/// Web-push transport that hands each send to an HTTP push relay.
///
/// The relay owns the VAPID keys and payload encryption; this side posts the
/// subscription and the message and interprets the status code. The relay
/// mirrors the push service's status, so 404 and 410 mean the subscription
/// is gone.
pub struct PushRelay {
    relay_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl PushRelay {
    pub fn new(relay_url: impl Into<String>, token: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            relay_url: relay_url.into(),
            token: token.filter(|t| !t.trim().is_empty()),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.relay_url
    }
}

#[async_trait]
impl PushSender for PushRelay {
    fn name(&self) -> &str {
        "push"
    }

    async fn send(
        &self,
        subscription: &PushSubscription,
        message: &OutboundMessage,
    ) -> anyhow::Result<PushDelivery> {
        let body = json!({
            "subscription": {
                "endpoint": subscription.endpoint,
                "keys": {
                    "p256dh": subscription.p256dh,
                    "auth": subscription.auth,
                },
            },
            "payload": message,
        });

        let mut request = self.client.post(&self.relay_url).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("push relay request failed: {}", e))?;

        match resp.status() {
            StatusCode::NOT_FOUND | StatusCode::GONE => Ok(PushDelivery::Gone),
            status if status.is_success() => Ok(PushDelivery::Delivered),
            status => {
                let detail = resp.text().await.unwrap_or_default();
                anyhow::bail!("push relay returned status {}: {}", status, detail.trim())
            }
        }
    }
}
