use sqlx::SqlitePool;
use tracing::info;

/// Centralized database migrations for the SQLite store.
///
/// Each migration is safe to call multiple times (`IF NOT EXISTS` throughout).
pub(crate) async fn migrate_all(pool: &SqlitePool) -> anyhow::Result<()> {
    migrate_habits(pool).await?;
    migrate_notifications(pool).await?;
    Ok(())
}

pub(crate) async fn migrate_habits(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS recurrence_templates (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            pattern TEXT NOT NULL,
            board TEXT,
            priority TEXT,
            reminder_time TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            is_paused INTEGER NOT NULL DEFAULT 0,
            streak INTEGER NOT NULL DEFAULT 0,
            last_completed_on TEXT,
            total_completions INTEGER NOT NULL DEFAULT 0,
            success_rate REAL NOT NULL DEFAULT 0,
            failure_history TEXT NOT NULL DEFAULT '[]',
            weekday_failures TEXT NOT NULL DEFAULT '[0,0,0,0,0,0,0]',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_templates_owner
         ON recurrence_templates(owner_id) WHERE is_active = 1 AND is_paused = 0",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS task_instances (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            template_id TEXT REFERENCES recurrence_templates(id) ON DELETE CASCADE,
            title TEXT NOT NULL,
            description TEXT,
            due_date TEXT NOT NULL,
            cycle_key TEXT,
            completed INTEGER NOT NULL DEFAULT 0,
            completed_at TEXT,
            board TEXT,
            priority TEXT,
            reminder_time TEXT,
            misses_through TEXT,
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    // One instance per template cycle. One-off tasks have NULL template_id,
    // and NULLs never collide in a SQLite unique index.
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_instances_template_cycle
         ON task_instances(template_id, cycle_key)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_instances_owner_due
         ON task_instances(owner_id, due_date)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_instances_pending
         ON task_instances(template_id, due_date) WHERE completed = 0",
    )
    .execute(pool)
    .await?;

    info!("Habit tables migration complete");
    Ok(())
}

pub(crate) async fn migrate_notifications(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS user_notification_settings (
            owner_id TEXT PRIMARY KEY,
            timezone TEXT,
            push_enabled INTEGER NOT NULL DEFAULT 0,
            chat_bot_enabled INTEGER NOT NULL DEFAULT 0,
            bot_token TEXT,
            chat_id TEXT,
            morning_brief_time TEXT,
            evening_brief_time TEXT,
            weekly_brief_day TEXT,
            weekly_brief_time TEXT,
            updated_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS push_subscriptions (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            endpoint TEXT NOT NULL UNIQUE,
            p256dh TEXT NOT NULL,
            auth TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_push_subscriptions_owner
         ON push_subscriptions(owner_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS notes (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            title TEXT NOT NULL,
            body TEXT NOT NULL DEFAULT '',
            remind_on TEXT,
            remind_at TEXT,
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_notes_reminder
         ON notes(owner_id, remind_on) WHERE remind_on IS NOT NULL",
    )
    .execute(pool)
    .await?;

    // The primary key is the at-most-once guard for every notification kind.
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS notification_send_log (
            owner_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            subject TEXT NOT NULL DEFAULT '',
            cycle_key TEXT NOT NULL,
            sent_at TEXT NOT NULL,
            PRIMARY KEY (owner_id, kind, subject, cycle_key)
        )",
    )
    .execute(pool)
    .await?;

    info!("Notification tables migration complete");
    Ok(())
}
