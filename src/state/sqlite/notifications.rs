use super::*;

#[async_trait]
impl crate::traits::NotificationStore for SqliteStore {
    async fn settings(&self, owner_id: &str) -> anyhow::Result<Option<UserNotificationSettings>> {
        let row = sqlx::query("SELECT * FROM user_notification_settings WHERE owner_id = ?")
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_settings))
    }

    async fn push_subscriptions(&self, owner_id: &str) -> anyhow::Result<Vec<PushSubscription>> {
        let rows = sqlx::query(
            "SELECT * FROM push_subscriptions WHERE owner_id = ? ORDER BY created_at ASC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        let mut subscriptions = Vec::with_capacity(rows.len());
        for row in &rows {
            subscriptions.push(row_to_subscription(row)?);
        }
        Ok(subscriptions)
    }

    async fn delete_push_subscription(&self, id: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM push_subscriptions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn task_reminders_on(
        &self,
        owner_id: &str,
        date: NaiveDate,
    ) -> anyhow::Result<Vec<TaskInstance>> {
        let rows = sqlx::query(
            "SELECT * FROM task_instances
             WHERE owner_id = ? AND due_date = ? AND completed = 0 AND reminder_time IS NOT NULL
             ORDER BY reminder_time ASC",
        )
        .bind(owner_id)
        .bind(format_date(date))
        .fetch_all(&self.pool)
        .await?;

        let mut instances = Vec::with_capacity(rows.len());
        for row in &rows {
            instances.push(row_to_instance(row)?);
        }
        Ok(instances)
    }

    async fn note_reminders_on(
        &self,
        owner_id: &str,
        date: NaiveDate,
    ) -> anyhow::Result<Vec<Note>> {
        let rows = sqlx::query(
            "SELECT * FROM notes
             WHERE owner_id = ? AND remind_on = ? AND remind_at IS NOT NULL
             ORDER BY remind_at ASC",
        )
        .bind(owner_id)
        .bind(format_date(date))
        .fetch_all(&self.pool)
        .await?;

        let mut notes = Vec::with_capacity(rows.len());
        for row in &rows {
            notes.push(row_to_note(row)?);
        }
        Ok(notes)
    }

    async fn claim_send(
        &self,
        owner_id: &str,
        kind: &str,
        subject: &str,
        cycle_key: &str,
        at: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "INSERT INTO notification_send_log (owner_id, kind, subject, cycle_key, sent_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(owner_id, kind, subject, cycle_key) DO NOTHING",
        )
        .bind(owner_id)
        .bind(kind)
        .bind(subject)
        .bind(cycle_key)
        .bind(at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn was_sent(
        &self,
        owner_id: &str,
        kind: &str,
        subject: &str,
        cycle_key: &str,
    ) -> anyhow::Result<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM notification_send_log
             WHERE owner_id = ? AND kind = ? AND subject = ? AND cycle_key = ?",
        )
        .bind(owner_id)
        .bind(kind)
        .bind(subject)
        .bind(cycle_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }
}
