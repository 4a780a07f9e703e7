use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::recurrence::RecurrencePattern;
use crate::streaks::StreakMetrics;

pub mod channels;
pub mod store;

pub use channels::{ChatBotSender, PushDelivery, PushSender};
pub use store::{HabitStore, NotificationStore};

/// A recurring-task definition authored once by a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurrenceTemplate {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub pattern: RecurrencePattern,
    /// Board new instances land on (e.g. "today", "habits").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub board: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    /// Local time a reminder fires for each spawned instance, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminder_time: Option<NaiveTime>,
    pub is_active: bool,
    pub is_paused: bool,
    pub metrics: StreakMetrics,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecurrenceTemplate {
    #[cfg(test)]
    pub fn new(owner_id: &str, title: &str, pattern: RecurrencePattern) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            title: title.to_string(),
            description: None,
            pattern,
            board: None,
            priority: None,
            reminder_time: None,
            is_active: true,
            is_paused: false,
            metrics: StreakMetrics::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Paused and deactivated templates never spawn instances.
    pub fn is_schedulable(&self) -> bool {
        self.is_active && !self.is_paused
    }
}

/// A concrete, dated occurrence of a template, or a one-off task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInstance {
    pub id: String,
    pub owner_id: String,
    /// None for one-off tasks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub due_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycle_key: Option<String>,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub board: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminder_time: Option<NaiveTime>,
    /// Latest cycle date already charged as a miss while this instance was
    /// open. A reversal charges the instance's own date.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub misses_through: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl TaskInstance {
    /// A task with no template link, due on `due_date`.
    pub fn one_off(owner_id: &str, title: &str, due_date: NaiveDate) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            template_id: None,
            title: title.to_string(),
            description: None,
            due_date,
            cycle_key: None,
            completed: false,
            completed_at: None,
            board: None,
            priority: None,
            reminder_time: None,
            misses_through: None,
            created_at: Utc::now(),
        }
    }
}

/// A free-form note that may carry a dated reminder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remind_on: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remind_at: Option<NaiveTime>,
    pub created_at: DateTime<Utc>,
}

/// Per-user channel configuration and brief schedule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserNotificationSettings {
    pub owner_id: String,
    /// IANA timezone id, e.g. "Europe/Lisbon".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    pub push_enabled: bool,
    pub chat_bot_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub morning_brief_time: Option<NaiveTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evening_brief_time: Option<NaiveTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekly_brief_day: Option<Weekday>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekly_brief_time: Option<NaiveTime>,
}

impl UserNotificationSettings {
    pub fn new(owner_id: &str) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            ..Default::default()
        }
    }

    /// Bot token and chat id, when both are present and non-empty.
    pub fn chat_bot_credentials(&self) -> Option<(&str, &str)> {
        let token = self.bot_token.as_deref().map(str::trim).filter(|t| !t.is_empty())?;
        let chat = self.chat_id.as_deref().map(str::trim).filter(|c| !c.is_empty())?;
        Some((token, chat))
    }
}

/// A stored web-push subscription. One user may own many.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushSubscription {
    pub id: String,
    pub owner_id: String,
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
    pub created_at: DateTime<Utc>,
}

/// The message handed to the dispatcher. Push receives it as-is;
/// the chat-bot channel gets a rendered text form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl OutboundMessage {
    pub fn chat_text(&self) -> String {
        match &self.url {
            Some(url) => format!("{}\n\n{}\n\n{}", self.title, self.body, url),
            None => format!("{}\n\n{}", self.title, self.body),
        }
    }
}
