use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::clock::parse_time_of_day;
use crate::recurrence::{due_dates_between, RecurrencePattern};
use crate::streaks::{MissOutcome, StreakMetrics, ToggleOutcome};
use crate::traits::{
    Note, PushSubscription, RecurrenceTemplate, TaskInstance, UserNotificationSettings,
};

mod habits;
mod notifications;
#[cfg(test)]
mod seed;
#[cfg(test)]
mod tests;

/// Set restrictive file permissions (0600) on the database and WAL files.
#[cfg(unix)]
fn set_db_file_permissions(db_path: &str) {
    use std::os::unix::fs::PermissionsExt;
    let mode = std::fs::Permissions::from_mode(0o600);
    if let Err(e) = std::fs::set_permissions(db_path, mode.clone()) {
        tracing::warn!("Failed to set permissions on {}: {}", db_path, e);
    }
    // WAL and shared-memory files created by SQLite in WAL journal mode
    for suffix in &["-wal", "-shm"] {
        let path = format!("{}{}", db_path, suffix);
        if std::path::Path::new(&path).exists() {
            if let Err(e) = std::fs::set_permissions(&path, mode.clone()) {
                tracing::warn!("Failed to set permissions on {}: {}", path, e);
            }
        }
    }
}

#[cfg(not(unix))]
fn set_db_file_permissions(_db_path: &str) {}

/// SQLite-backed record store for templates, instances, settings,
/// subscriptions, notes and the send log.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn open(db_path: &str) -> anyhow::Result<Self> {
        let opts = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await?;

        set_db_file_permissions(db_path);

        Self::from_pool(pool).await
    }

    /// Wrap an existing pool and run migrations.
    pub async fn from_pool(pool: SqlitePool) -> anyhow::Result<Self> {
        crate::db::migrations::migrate_all(&pool).await?;
        Ok(Self { pool })
    }
}

// ==================== Column codecs ====================

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_date(raw: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|e| anyhow::anyhow!("Invalid date '{}': {}", raw, e))
}

fn format_time(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

fn parse_optional_time(raw: Option<String>) -> Option<NaiveTime> {
    raw.as_deref().and_then(parse_time_of_day)
}

fn parse_timestamp(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

fn parse_optional_timestamp(raw: Option<String>) -> anyhow::Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_timestamp).transpose()
}

fn row_to_template(row: &SqliteRow) -> anyhow::Result<RecurrenceTemplate> {
    let pattern_json: String = row.get("pattern");
    let pattern: RecurrencePattern = serde_json::from_str(&pattern_json)?;
    let failure_json: String = row.get("failure_history");
    let weekday_json: String = row.get("weekday_failures");
    let last_completed: Option<String> = row.get("last_completed_on");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    let metrics = StreakMetrics {
        streak: row.get::<i64, _>("streak").max(0) as u32,
        last_completed_on: last_completed.as_deref().map(parse_date).transpose()?,
        total_completions: row.get::<i64, _>("total_completions").max(0) as u32,
        failure_history: serde_json::from_str(&failure_json)?,
        weekday_failures: serde_json::from_str(&weekday_json)?,
        success_rate: row.get("success_rate"),
    };

    Ok(RecurrenceTemplate {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        title: row.get("title"),
        description: row.get("description"),
        pattern,
        board: row.get("board"),
        priority: row.get("priority"),
        reminder_time: parse_optional_time(row.get("reminder_time")),
        is_active: row.get::<i64, _>("is_active") != 0,
        is_paused: row.get::<i64, _>("is_paused") != 0,
        metrics,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn row_to_instance(row: &SqliteRow) -> anyhow::Result<TaskInstance> {
    let due_date: String = row.get("due_date");
    let misses_through: Option<String> = row.get("misses_through");
    let created_at: String = row.get("created_at");
    Ok(TaskInstance {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        template_id: row.get("template_id"),
        title: row.get("title"),
        description: row.get("description"),
        due_date: parse_date(&due_date)?,
        cycle_key: row.get("cycle_key"),
        completed: row.get::<i64, _>("completed") != 0,
        completed_at: parse_optional_timestamp(row.get("completed_at"))?,
        board: row.get("board"),
        priority: row.get("priority"),
        reminder_time: parse_optional_time(row.get("reminder_time")),
        misses_through: misses_through.as_deref().map(parse_date).transpose()?,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn row_to_settings(row: &SqliteRow) -> UserNotificationSettings {
    let weekly_day: Option<String> = row.get("weekly_brief_day");
    UserNotificationSettings {
        owner_id: row.get("owner_id"),
        timezone: row.get("timezone"),
        push_enabled: row.get::<i64, _>("push_enabled") != 0,
        chat_bot_enabled: row.get::<i64, _>("chat_bot_enabled") != 0,
        bot_token: row.get("bot_token"),
        chat_id: row.get("chat_id"),
        morning_brief_time: parse_optional_time(row.get("morning_brief_time")),
        evening_brief_time: parse_optional_time(row.get("evening_brief_time")),
        weekly_brief_day: weekly_day.and_then(|d| d.trim().parse::<Weekday>().ok()),
        weekly_brief_time: parse_optional_time(row.get("weekly_brief_time")),
    }
}

fn row_to_subscription(row: &SqliteRow) -> anyhow::Result<PushSubscription> {
    let created_at: String = row.get("created_at");
    Ok(PushSubscription {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        endpoint: row.get("endpoint"),
        p256dh: row.get("p256dh"),
        auth: row.get("auth"),
        created_at: parse_timestamp(&created_at)?,
    })
}

fn row_to_note(row: &SqliteRow) -> anyhow::Result<Note> {
    let remind_on: Option<String> = row.get("remind_on");
    let created_at: String = row.get("created_at");
    Ok(Note {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        title: row.get("title"),
        body: row.get("body"),
        remind_on: remind_on.as_deref().map(parse_date).transpose()?,
        remind_at: parse_optional_time(row.get("remind_at")),
        created_at: parse_timestamp(&created_at)?,
    })
}

/// Persist updated streak metrics. Runs on the caller's connection so it can
/// join an open transaction.
async fn write_metrics(
    conn: &mut SqliteConnection,
    template_id: &str,
    metrics: &StreakMetrics,
    at: DateTime<Utc>,
) -> anyhow::Result<()> {
    sqlx::query(
        "UPDATE recurrence_templates SET
            streak = ?,
            last_completed_on = ?,
            total_completions = ?,
            success_rate = ?,
            failure_history = ?,
            weekday_failures = ?,
            updated_at = ?
         WHERE id = ?",
    )
    .bind(metrics.streak as i64)
    .bind(metrics.last_completed_on.map(format_date))
    .bind(metrics.total_completions as i64)
    .bind(metrics.success_rate)
    .bind(serde_json::to_string(&metrics.failure_history)?)
    .bind(serde_json::to_string(&metrics.weekday_failures)?)
    .bind(at.to_rfc3339())
    .bind(template_id)
    .execute(conn)
    .await?;
    Ok(())
}
