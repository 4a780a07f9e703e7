use super::*;

// Writes for records the daemon only reads: templates, settings,
// subscriptions and notes are authored by the application that owns them.
impl SqliteStore {
    pub async fn insert_template(&self, template: &RecurrenceTemplate) -> anyhow::Result<()> {
        let metrics = &template.metrics;
        sqlx::query(
            "INSERT INTO recurrence_templates (
                id, owner_id, title, description, pattern, board, priority, reminder_time,
                is_active, is_paused, streak, last_completed_on, total_completions,
                success_rate, failure_history, weekday_failures, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&template.id)
        .bind(&template.owner_id)
        .bind(&template.title)
        .bind(&template.description)
        .bind(serde_json::to_string(&template.pattern)?)
        .bind(&template.board)
        .bind(&template.priority)
        .bind(template.reminder_time.map(format_time))
        .bind(template.is_active as i32)
        .bind(template.is_paused as i32)
        .bind(metrics.streak as i64)
        .bind(metrics.last_completed_on.map(format_date))
        .bind(metrics.total_completions as i64)
        .bind(metrics.success_rate)
        .bind(serde_json::to_string(&metrics.failure_history)?)
        .bind(serde_json::to_string(&metrics.weekday_failures)?)
        .bind(template.created_at.to_rfc3339())
        .bind(template.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_template(&self, id: &str) -> anyhow::Result<Option<RecurrenceTemplate>> {
        let row = sqlx::query("SELECT * FROM recurrence_templates WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_template).transpose()
    }

    pub async fn upsert_settings(
        &self,
        settings: &UserNotificationSettings,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO user_notification_settings (
                owner_id, timezone, push_enabled, chat_bot_enabled, bot_token, chat_id,
                morning_brief_time, evening_brief_time, weekly_brief_day, weekly_brief_time,
                updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(owner_id) DO UPDATE SET
                timezone = excluded.timezone,
                push_enabled = excluded.push_enabled,
                chat_bot_enabled = excluded.chat_bot_enabled,
                bot_token = excluded.bot_token,
                chat_id = excluded.chat_id,
                morning_brief_time = excluded.morning_brief_time,
                evening_brief_time = excluded.evening_brief_time,
                weekly_brief_day = excluded.weekly_brief_day,
                weekly_brief_time = excluded.weekly_brief_time,
                updated_at = excluded.updated_at",
        )
        .bind(&settings.owner_id)
        .bind(&settings.timezone)
        .bind(settings.push_enabled as i32)
        .bind(settings.chat_bot_enabled as i32)
        .bind(&settings.bot_token)
        .bind(&settings.chat_id)
        .bind(settings.morning_brief_time.map(format_time))
        .bind(settings.evening_brief_time.map(format_time))
        .bind(settings.weekly_brief_day.map(|d| d.to_string()))
        .bind(settings.weekly_brief_time.map(format_time))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn add_push_subscription(
        &self,
        subscription: &PushSubscription,
    ) -> anyhow::Result<()> {
        // A browser re-subscribing keeps its endpoint; refresh keys and owner.
        sqlx::query(
            "INSERT INTO push_subscriptions (id, owner_id, endpoint, p256dh, auth, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(endpoint) DO UPDATE SET
                owner_id = excluded.owner_id,
                p256dh = excluded.p256dh,
                auth = excluded.auth",
        )
        .bind(&subscription.id)
        .bind(&subscription.owner_id)
        .bind(&subscription.endpoint)
        .bind(&subscription.p256dh)
        .bind(&subscription.auth)
        .bind(subscription.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_note(&self, note: &Note) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO notes (id, owner_id, title, body, remind_on, remind_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&note.id)
        .bind(&note.owner_id)
        .bind(&note.title)
        .bind(&note.body)
        .bind(note.remind_on.map(format_date))
        .bind(note.remind_at.map(format_time))
        .bind(note.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
