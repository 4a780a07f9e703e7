use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::streaks::{MissOutcome, ToggleOutcome};
use crate::traits::{
    Note, PushSubscription, RecurrenceTemplate, TaskInstance, UserNotificationSettings,
};

/// Templates, instances and the streak state hanging off them.
#[async_trait]
pub trait HabitStore: Send + Sync {
    /// Owners that have either notification settings or at least one template.
    async fn list_owners(&self) -> anyhow::Result<Vec<String>>;

    /// Active, unpaused templates for an owner.
    async fn schedulable_templates(&self, owner_id: &str)
        -> anyhow::Result<Vec<RecurrenceTemplate>>;

    /// Oldest incomplete instance linked to a template, if any.
    async fn pending_instance(&self, template_id: &str) -> anyhow::Result<Option<TaskInstance>>;

    /// Insert unless an instance with the same `(template_id, cycle_key)` exists.
    /// Returns whether a row was written.
    async fn insert_instance_if_absent(&self, instance: &TaskInstance) -> anyhow::Result<bool>;

    /// Instances owned by a user with `from <= due_date <= to`, ordered by due date.
    async fn instances_between(
        &self,
        owner_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> anyhow::Result<Vec<TaskInstance>>;

    /// Incomplete template instances due on or before `through` whose missed
    /// cycles have not been charged up to `through`.
    async fn unrecorded_misses(
        &self,
        owner_id: &str,
        through: NaiveDate,
    ) -> anyhow::Result<Vec<TaskInstance>>;

    /// Flip an instance's completion flag and, for template instances, update the
    /// template's streak metrics in the same transaction. Returns None when the
    /// instance does not exist.
    async fn toggle_instance(
        &self,
        instance_id: &str,
        completed: bool,
        at: DateTime<Utc>,
    ) -> anyhow::Result<Option<ToggleOutcome>>;

    /// Charge the cycles an open instance left uncovered up to `through`: its
    /// own due date and later due dates with no instance of their own. Each
    /// cycle is charged at most once. Returns None when nothing was charged.
    async fn record_misses(
        &self,
        instance_id: &str,
        through: NaiveDate,
    ) -> anyhow::Result<Option<MissOutcome>>;
}

/// Settings, subscriptions, reminders and the send log.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn settings(&self, owner_id: &str) -> anyhow::Result<Option<UserNotificationSettings>>;

    async fn push_subscriptions(&self, owner_id: &str) -> anyhow::Result<Vec<PushSubscription>>;

    async fn delete_push_subscription(&self, id: &str) -> anyhow::Result<()>;

    /// Incomplete instances due on `date` that carry a reminder time.
    async fn task_reminders_on(
        &self,
        owner_id: &str,
        date: NaiveDate,
    ) -> anyhow::Result<Vec<TaskInstance>>;

    /// Notes whose reminder falls on `date`.
    async fn note_reminders_on(&self, owner_id: &str, date: NaiveDate)
        -> anyhow::Result<Vec<Note>>;

    /// Atomically claim the send record for `(owner, kind, subject, cycle)`.
    /// Returns false when a record already exists, in which case the caller
    /// must not dispatch.
    async fn claim_send(
        &self,
        owner_id: &str,
        kind: &str,
        subject: &str,
        cycle_key: &str,
        at: DateTime<Utc>,
    ) -> anyhow::Result<bool>;

    async fn was_sent(
        &self,
        owner_id: &str,
        kind: &str,
        subject: &str,
        cycle_key: &str,
    ) -> anyhow::Result<bool>;
}
