use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::channels::{Dispatcher, PushRelay, TelegramSender};
use crate::config::AppConfig;
use crate::daemon::{self, DaemonState};
use crate::scheduler::{NotificationScheduler, TickReport};
use crate::state::SqliteStore;
use crate::streaks::StreakUpdater;
use crate::traits::{ChatBotSender, PushSender};

/// Store, transports and scheduler wired from config.
struct Components {
    store: Arc<SqliteStore>,
    scheduler: Arc<NotificationScheduler>,
}

async fn build(config: &AppConfig) -> anyhow::Result<Components> {
    // 1. Record store
    let store = Arc::new(SqliteStore::open(&config.state.db_path).await?);
    info!("State store initialized ({})", config.state.db_path);

    // 2. Push transport
    let push: Option<Arc<dyn PushSender>> = match config.dispatch.push_relay_url.as_deref() {
        Some(url) if !url.trim().is_empty() => {
            let relay = PushRelay::new(url.trim(), config.dispatch.push_relay_token.clone())?;
            info!(relay = relay.url(), "Push relay configured");
            Some(Arc::new(relay))
        }
        _ => {
            warn!("No push relay configured, push notifications disabled");
            None
        }
    };

    // 3. Chat-bot transport
    let chat_bot: Option<Arc<dyn ChatBotSender>> = if config.dispatch.chat_bot_enabled {
        Some(Arc::new(TelegramSender::new()))
    } else {
        info!("Chat-bot channel disabled by config");
        None
    };

    // 4. Dispatcher and scheduler
    let dispatcher = Dispatcher::new(
        store.clone(),
        push,
        chat_bot,
        Duration::from_secs(config.dispatch.send_timeout_secs.max(1)),
    );
    let scheduler = Arc::new(NotificationScheduler::new(
        store.clone(),
        store.clone(),
        dispatcher,
        &config.scheduler,
        config.dispatch.app_url.clone(),
    ));

    Ok(Components { store, scheduler })
}

/// Run the daemon: scheduler loop plus HTTP server, until the server exits.
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let components = build(&config).await?;

    if config.scheduler.enabled {
        Arc::clone(&components.scheduler).spawn();
    } else {
        info!("Scheduler disabled; ticks run only via POST /trigger");
    }

    let state = DaemonState {
        scheduler: Arc::clone(&components.scheduler),
        streaks: Arc::new(StreakUpdater::new(components.store.clone())),
        api_token: config.daemon.api_token.clone(),
        started_at: Instant::now(),
    };

    daemon::start_server(&config.daemon.bind, config.daemon.port, state).await
}

/// Run exactly one scheduler tick and return its report.
pub async fn run_once(config: AppConfig) -> anyhow::Result<TickReport> {
    let components = build(&config).await?;
    let report = components.scheduler.tick().await?;
    info!(
        users = report.users,
        misses = report.misses_recorded,
        created = report.instances_created,
        sent = report.sent,
        undelivered = report.undelivered,
        suppressed = report.suppressed,
        errors = report.errors,
        "Tick complete"
    );
    Ok(report)
}
