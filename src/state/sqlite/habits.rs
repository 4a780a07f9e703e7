use super::*;

#[async_trait]
impl crate::traits::HabitStore for SqliteStore {
    async fn list_owners(&self) -> anyhow::Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT owner_id FROM user_notification_settings
             UNION
             SELECT owner_id FROM recurrence_templates WHERE is_active = 1
             ORDER BY owner_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|row| row.get("owner_id")).collect())
    }

    async fn schedulable_templates(
        &self,
        owner_id: &str,
    ) -> anyhow::Result<Vec<RecurrenceTemplate>> {
        let rows = sqlx::query(
            "SELECT * FROM recurrence_templates
             WHERE owner_id = ? AND is_active = 1 AND is_paused = 0
             ORDER BY created_at ASC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        let mut templates = Vec::with_capacity(rows.len());
        for row in &rows {
            templates.push(row_to_template(row)?);
        }
        Ok(templates)
    }

    async fn pending_instance(&self, template_id: &str) -> anyhow::Result<Option<TaskInstance>> {
        let row = sqlx::query(
            "SELECT * FROM task_instances
             WHERE template_id = ? AND completed = 0
             ORDER BY due_date ASC
             LIMIT 1",
        )
        .bind(template_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_instance).transpose()
    }

    async fn insert_instance_if_absent(&self, instance: &TaskInstance) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "INSERT INTO task_instances (
                id, owner_id, template_id, title, description, due_date, cycle_key,
                completed, completed_at, board, priority, reminder_time, misses_through, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(template_id, cycle_key) DO NOTHING",
        )
        .bind(&instance.id)
        .bind(&instance.owner_id)
        .bind(&instance.template_id)
        .bind(&instance.title)
        .bind(&instance.description)
        .bind(format_date(instance.due_date))
        .bind(&instance.cycle_key)
        .bind(instance.completed as i32)
        .bind(instance.completed_at.map(|t| t.to_rfc3339()))
        .bind(&instance.board)
        .bind(&instance.priority)
        .bind(instance.reminder_time.map(format_time))
        .bind(instance.misses_through.map(format_date))
        .bind(instance.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn instances_between(
        &self,
        owner_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> anyhow::Result<Vec<TaskInstance>> {
        let rows = sqlx::query(
            "SELECT * FROM task_instances
             WHERE owner_id = ? AND due_date >= ? AND due_date <= ?
             ORDER BY due_date ASC, created_at ASC",
        )
        .bind(owner_id)
        .bind(format_date(from))
        .bind(format_date(to))
        .fetch_all(&self.pool)
        .await?;

        let mut instances = Vec::with_capacity(rows.len());
        for row in &rows {
            instances.push(row_to_instance(row)?);
        }
        Ok(instances)
    }

    async fn unrecorded_misses(
        &self,
        owner_id: &str,
        through: NaiveDate,
    ) -> anyhow::Result<Vec<TaskInstance>> {
        let through = format_date(through);
        let rows = sqlx::query(
            "SELECT * FROM task_instances
             WHERE owner_id = ?
               AND template_id IS NOT NULL
               AND completed = 0
               AND due_date <= ?
               AND (misses_through IS NULL OR misses_through < ?)
             ORDER BY due_date ASC",
        )
        .bind(owner_id)
        .bind(&through)
        .bind(&through)
        .fetch_all(&self.pool)
        .await?;

        let mut instances = Vec::with_capacity(rows.len());
        for row in &rows {
            instances.push(row_to_instance(row)?);
        }
        Ok(instances)
    }

    async fn toggle_instance(
        &self,
        instance_id: &str,
        completed: bool,
        at: DateTime<Utc>,
    ) -> anyhow::Result<Option<ToggleOutcome>> {
        let mut tx = self.pool.begin().await?;

        // Write first so the transaction holds the write lock before reading
        // the template metrics it is about to modify. A reversal charges the
        // instance's own cycle, so the miss sweep must not charge it again.
        let changed = sqlx::query(
            "UPDATE task_instances SET
                completed = ?,
                completed_at = ?,
                misses_through = CASE
                    WHEN ? = 0 AND (misses_through IS NULL OR misses_through < due_date)
                    THEN due_date
                    ELSE misses_through
                END
             WHERE id = ? AND completed != ?",
        )
        .bind(completed as i32)
        .bind(completed.then(|| at.to_rfc3339()))
        .bind(completed as i32)
        .bind(instance_id)
        .bind(completed as i32)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        let Some(row) = sqlx::query("SELECT * FROM task_instances WHERE id = ?")
            .bind(instance_id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            tx.rollback().await?;
            return Ok(None);
        };
        let instance = row_to_instance(&row)?;

        let mut metrics = None;
        if changed {
            if let Some(template_id) = instance.template_id.as_deref() {
                let template_row = sqlx::query("SELECT * FROM recurrence_templates WHERE id = ?")
                    .bind(template_id)
                    .fetch_optional(&mut *tx)
                    .await?;
                if let Some(template_row) = template_row {
                    let template = row_to_template(&template_row)?;
                    let next = template
                        .metrics
                        .record_completion(instance.due_date, completed);
                    write_metrics(&mut *tx, template_id, &next, at).await?;
                    metrics = Some(next);
                }
            }
        }

        tx.commit().await?;
        Ok(Some(ToggleOutcome {
            instance,
            changed,
            metrics,
        }))
    }

    async fn record_misses(
        &self,
        instance_id: &str,
        through: NaiveDate,
    ) -> anyhow::Result<Option<MissOutcome>> {
        let mut tx = self.pool.begin().await?;

        let Some(row) = sqlx::query(
            "SELECT * FROM task_instances
             WHERE id = ? AND completed = 0 AND template_id IS NOT NULL",
        )
        .bind(instance_id)
        .fetch_optional(&mut *tx)
        .await?
        else {
            tx.rollback().await?;
            return Ok(None);
        };
        let instance = row_to_instance(&row)?;
        let (Some(template_id), Some(from)) = (
            instance.template_id.clone(),
            match instance.misses_through {
                Some(charged) => charged.succ_opt(),
                None => Some(instance.due_date),
            },
        ) else {
            tx.rollback().await?;
            return Ok(None);
        };
        if from > through {
            tx.rollback().await?;
            return Ok(None);
        }

        // Advance the watermark first; a concurrent sweep that read the same
        // watermark loses here and charges nothing.
        let claimed = sqlx::query(
            "UPDATE task_instances SET misses_through = ?
             WHERE id = ? AND completed = 0 AND misses_through IS ?",
        )
        .bind(format_date(through))
        .bind(instance_id)
        .bind(instance.misses_through.map(format_date))
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;
        if !claimed {
            tx.rollback().await?;
            return Ok(None);
        }

        let Some(template_row) = sqlx::query("SELECT * FROM recurrence_templates WHERE id = ?")
            .bind(&template_id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            tx.rollback().await?;
            return Ok(None);
        };
        let template = row_to_template(&template_row)?;

        // Cycles that have their own instance are charged through that one.
        let covered_rows = sqlx::query(
            "SELECT due_date FROM task_instances
             WHERE template_id = ? AND id != ? AND due_date >= ? AND due_date <= ?",
        )
        .bind(&template_id)
        .bind(instance_id)
        .bind(format_date(from))
        .bind(format_date(through))
        .fetch_all(&mut *tx)
        .await?;
        let mut covered = std::collections::BTreeSet::new();
        for row in &covered_rows {
            let raw: String = row.get("due_date");
            covered.insert(parse_date(&raw)?);
        }

        // Paused templates owe nothing beyond the open instance itself.
        let mut cycle_dates: Vec<NaiveDate> = if template.is_schedulable() {
            due_dates_between(&template.pattern, from, through)
                .into_iter()
                .filter(|d| !covered.contains(d))
                .collect()
        } else {
            Vec::new()
        };
        let own_due = instance.due_date;
        if from <= own_due && own_due <= through && !cycle_dates.contains(&own_due) {
            cycle_dates.insert(0, own_due);
        }

        if cycle_dates.is_empty() {
            tx.commit().await?;
            return Ok(None);
        }

        let next = cycle_dates
            .iter()
            .fold(template.metrics.clone(), |metrics, date| metrics.record_miss(*date));
        write_metrics(&mut *tx, &template_id, &next, Utc::now()).await?;
        tx.commit().await?;

        Ok(Some(MissOutcome {
            instance_id: instance.id,
            template_id,
            cycle_dates,
            metrics: next,
        }))
    }
}
