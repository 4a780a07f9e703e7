use serde::Deserialize;
use std::path::Path;

use crate::clock::DEFAULT_TIMEZONE;

/// Environment variable consulted when `[dispatch] push_relay_token` is unset.
pub const PUSH_RELAY_TOKEN_ENV: &str = "HABITD_PUSH_RELAY_TOKEN";
/// Environment variable consulted when `[daemon] api_token` is unset.
pub const API_TOKEN_ENV: &str = "HABITD_API_TOKEN";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StateConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "habitd.db".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    #[serde(default = "default_scheduler_enabled")]
    pub enabled: bool,
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    /// IANA zone used for users without a (valid) timezone setting.
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
    /// How late a notification may still fire after its scheduled minute.
    /// 0 means exact-minute matching only.
    #[serde(default = "default_catch_up_minutes")]
    pub catch_up_minutes: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_scheduler_enabled(),
            tick_interval_secs: default_tick_interval_secs(),
            default_timezone: default_timezone(),
            catch_up_minutes: default_catch_up_minutes(),
        }
    }
}

fn default_scheduler_enabled() -> bool {
    true
}

fn default_tick_interval_secs() -> u64 {
    60
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.name().to_string()
}

fn default_catch_up_minutes() -> u32 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct DispatchConfig {
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
    /// HTTP endpoint of the web-push relay. Push is disabled when unset.
    #[serde(default)]
    pub push_relay_url: Option<String>,
    #[serde(default)]
    pub push_relay_token: Option<String>,
    /// Link attached to every outgoing message.
    #[serde(default)]
    pub app_url: Option<String>,
    /// Set false to disable the Telegram chat-bot channel globally.
    #[serde(default = "default_chat_bot_enabled")]
    pub chat_bot_enabled: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            send_timeout_secs: default_send_timeout_secs(),
            push_relay_url: None,
            push_relay_token: None,
            app_url: None,
            chat_bot_enabled: default_chat_bot_enabled(),
        }
    }
}

fn default_send_timeout_secs() -> u64 {
    10
}

fn default_chat_bot_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct DaemonConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// IP address to bind the HTTP server to (default: "127.0.0.1").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Bearer token required on `/trigger` and completion routes. When unset
    /// those routes are open, so keep the bind address local.
    #[serde(default)]
    pub api_token: Option<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            api_token: None,
        }
    }
}

fn default_port() -> u16 {
    8080
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: AppConfig = toml::from_str(&content)?;
        config.apply_env();
        Ok(config)
    }

    /// Load `path` if it exists, otherwise run on defaults.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            return Self::load(path);
        }
        tracing::info!("No config at {}, using defaults", path.display());
        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if self.dispatch.push_relay_token.is_none() {
            self.dispatch.push_relay_token = std::env::var(PUSH_RELAY_TOKEN_ENV)
                .ok()
                .filter(|t| !t.trim().is_empty());
        }
        if self.daemon.api_token.is_none() {
            self.daemon.api_token = std::env::var(API_TOKEN_ENV)
                .ok()
                .filter(|t| !t.trim().is_empty());
        }
    }
}
