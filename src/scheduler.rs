use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDateTime, NaiveTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::briefs::BriefComposer;
use crate::channels::Dispatcher;
use crate::clock::{truncate_to_minute, TimezoneResolver};
use crate::config::SchedulerConfig;
use crate::instantiator::{InstantiationOutcome, Instantiator};
use crate::recurrence::{cycle_key, iso_week_key};
use crate::streaks::StreakUpdater;
use crate::traits::{HabitStore, NotificationStore, OutboundMessage, UserNotificationSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    MorningBrief,
    EveningBrief,
    WeeklyBrief,
    TaskReminder,
    NoteReminder,
}

impl NotificationKind {
    /// Stable key stored in the send log.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MorningBrief => "morning_brief",
            Self::EveningBrief => "evening_brief",
            Self::WeeklyBrief => "weekly_brief",
            Self::TaskReminder => "task_reminder",
            Self::NoteReminder => "note_reminder",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where one (user, kind, subject) ended up in a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationState {
    /// Nowhere to send it: no enabled channel with a transport and a target.
    Idle,
    /// Claimed, but every channel failed. Not retried.
    Due,
    Sent,
    SuppressedAlreadySent,
}

/// Whether a notification scheduled at `scheduled` should fire at `now`
/// (both local wall-clock). Fires from the scheduled minute until
/// `catch_up_minutes` later, on the same local date.
pub fn is_due(now: NaiveDateTime, scheduled: NaiveDateTime, catch_up_minutes: u32) -> bool {
    let now = now.date().and_time(truncate_to_minute(now.time()));
    let scheduled = scheduled
        .date()
        .and_time(truncate_to_minute(scheduled.time()));
    if now.date() != scheduled.date() || now < scheduled {
        return false;
    }
    (now - scheduled).num_minutes() <= i64::from(catch_up_minutes)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// True when another tick was still running and this one did nothing.
    pub skipped: bool,
    pub users: usize,
    pub misses_recorded: usize,
    pub instances_created: usize,
    pub sent: usize,
    /// Claimed notifications that no channel delivered.
    pub undelivered: usize,
    pub suppressed: usize,
    pub errors: usize,
}

impl TickReport {
    fn record(&mut self, state: NotificationState) {
        match state {
            NotificationState::Sent => self.sent += 1,
            NotificationState::Due => self.undelivered += 1,
            NotificationState::SuppressedAlreadySent => self.suppressed += 1,
            NotificationState::Idle => {}
        }
    }
}

/// Per-user, per-tick driver: sweep missed cycles, spawn due instances,
/// then fire whatever notifications are due.
pub struct NotificationScheduler {
    habits: Arc<dyn HabitStore>,
    notifications: Arc<dyn NotificationStore>,
    instantiator: Instantiator,
    streaks: StreakUpdater,
    composer: BriefComposer,
    dispatcher: Dispatcher,
    resolver: TimezoneResolver,
    catch_up_minutes: u32,
    tick_interval: Duration,
    running: Mutex<()>,
}

impl NotificationScheduler {
    pub fn new(
        habits: Arc<dyn HabitStore>,
        notifications: Arc<dyn NotificationStore>,
        dispatcher: Dispatcher,
        config: &SchedulerConfig,
        app_url: Option<String>,
    ) -> Self {
        Self {
            instantiator: Instantiator::new(habits.clone()),
            streaks: StreakUpdater::new(habits.clone()),
            composer: BriefComposer::new(habits.clone(), app_url),
            habits,
            notifications,
            dispatcher,
            resolver: TimezoneResolver::from_config(&config.default_timezone),
            catch_up_minutes: config.catch_up_minutes,
            tick_interval: Duration::from_secs(config.tick_interval_secs.max(1)),
            running: Mutex::new(()),
        }
    }

    /// Spawn the tick loop as a background task.
    pub fn spawn(self: Arc<Self>) {
        info!(
            interval = ?self.tick_interval,
            default_timezone = %self.resolver.fallback(),
            "Notification scheduler spawned"
        );

        tokio::spawn(async move {
            loop {
                match self.tick().await {
                    Ok(report) if report.sent > 0 || report.instances_created > 0 => {
                        info!(
                            users = report.users,
                            created = report.instances_created,
                            sent = report.sent,
                            "Scheduler tick"
                        );
                    }
                    Ok(report) => debug!(users = report.users, "Scheduler tick, nothing to do"),
                    Err(e) => error!("Scheduler tick error: {}", e),
                }
                tokio::time::sleep(self.tick_interval).await;
            }
        });
    }

    pub async fn tick(&self) -> anyhow::Result<TickReport> {
        self.tick_at(Utc::now()).await
    }

    /// Run one tick as if the current instant were `now`.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> anyhow::Result<TickReport> {
        let Ok(_guard) = self.running.try_lock() else {
            warn!("Previous scheduler tick still running, skipping");
            return Ok(TickReport {
                skipped: true,
                ..TickReport::default()
            });
        };

        let mut report = TickReport::default();
        let owners = self.habits.list_owners().await?;
        for owner_id in owners {
            report.users += 1;
            if let Err(e) = self.process_user(&owner_id, now, &mut report).await {
                error!(user = %owner_id, "Scheduler failed for user: {}", e);
                report.errors += 1;
            }
        }
        Ok(report)
    }

    async fn process_user(
        &self,
        owner_id: &str,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> anyhow::Result<()> {
        let settings = self
            .notifications
            .settings(owner_id)
            .await?
            .unwrap_or_else(|| UserNotificationSettings::new(owner_id));
        let local = self.resolver.local_now(now, settings.timezone.as_deref());
        let today = local.date();

        // Streak and instance writes land before anything is announced.
        match self.streaks.sweep_misses(owner_id, today).await {
            Ok(count) => report.misses_recorded += count,
            Err(e) => {
                error!(user = %owner_id, "Missed-cycle sweep failed: {}", e);
                report.errors += 1;
            }
        }

        match self.habits.schedulable_templates(owner_id).await {
            Ok(templates) => {
                for template in &templates {
                    match self.instantiator.ensure_instance(template, today).await {
                        Ok(InstantiationOutcome::InstanceCreated { .. }) => {
                            report.instances_created += 1
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!(
                                user = %owner_id,
                                template = %template.id,
                                "Instantiation failed: {}", e
                            );
                            report.errors += 1;
                        }
                    }
                }
            }
            Err(e) => {
                error!(user = %owner_id, "Failed to load templates: {}", e);
                report.errors += 1;
            }
        }

        let day_key = cycle_key(today);
        let briefs = [
            (
                NotificationKind::MorningBrief,
                settings.morning_brief_time,
                day_key.clone(),
            ),
            (
                NotificationKind::EveningBrief,
                settings.evening_brief_time,
                day_key.clone(),
            ),
            (
                NotificationKind::WeeklyBrief,
                settings
                    .weekly_brief_time
                    .filter(|_| settings.weekly_brief_day == Some(today.weekday())),
                iso_week_key(today),
            ),
        ];

        for (kind, time, cycle) in briefs {
            let Some(time) = time else { continue };
            if !self.is_scheduled_now(local, time) {
                continue;
            }
            let message = async {
                match kind {
                    NotificationKind::MorningBrief => self.composer.morning(owner_id, today).await,
                    NotificationKind::EveningBrief => self.composer.evening(owner_id, today).await,
                    _ => self.composer.weekly(owner_id, today).await,
                }
            };
            self.record_kind(
                report,
                kind,
                self.fire(&settings, kind, "", &cycle, now, message).await,
            );
        }

        match self.notifications.task_reminders_on(owner_id, today).await {
            Ok(tasks) => {
                for task in tasks {
                    let Some(time) = task.reminder_time else { continue };
                    if !self.is_scheduled_now(local, time) {
                        continue;
                    }
                    let message = self.composer.task_reminder(&task);
                    let state = self
                        .fire(
                            &settings,
                            NotificationKind::TaskReminder,
                            &task.id,
                            &day_key,
                            now,
                            async { Ok(message) },
                        )
                        .await;
                    self.record_kind(report, NotificationKind::TaskReminder, state);
                }
            }
            Err(e) => {
                error!(user = %owner_id, "Failed to load task reminders: {}", e);
                report.errors += 1;
            }
        }

        match self.notifications.note_reminders_on(owner_id, today).await {
            Ok(notes) => {
                for note in notes {
                    let Some(time) = note.remind_at else { continue };
                    if !self.is_scheduled_now(local, time) {
                        continue;
                    }
                    let message = self.composer.note_reminder(&note);
                    let state = self
                        .fire(
                            &settings,
                            NotificationKind::NoteReminder,
                            &note.id,
                            &day_key,
                            now,
                            async { Ok(message) },
                        )
                        .await;
                    self.record_kind(report, NotificationKind::NoteReminder, state);
                }
            }
            Err(e) => {
                error!(user = %owner_id, "Failed to load note reminders: {}", e);
                report.errors += 1;
            }
        }

        Ok(())
    }

    fn is_scheduled_now(&self, local: NaiveDateTime, time: NaiveTime) -> bool {
        is_due(local, local.date().and_time(time), self.catch_up_minutes)
    }

    fn record_kind(
        &self,
        report: &mut TickReport,
        kind: NotificationKind,
        state: anyhow::Result<NotificationState>,
    ) {
        match state {
            Ok(state) => report.record(state),
            Err(e) => {
                error!(kind = %kind, "Notification step failed: {}", e);
                report.errors += 1;
            }
        }
    }

    /// Compose, claim and dispatch one due notification. The send-log claim
    /// is taken before dispatch, so a lost race or a repeat tick never sends
    /// twice.
    async fn fire<F>(
        &self,
        settings: &UserNotificationSettings,
        kind: NotificationKind,
        subject: &str,
        cycle: &str,
        now: DateTime<Utc>,
        message: F,
    ) -> anyhow::Result<NotificationState>
    where
        F: Future<Output = anyhow::Result<OutboundMessage>>,
    {
        let owner_id = settings.owner_id.as_str();
        if self.dispatcher.reachable_channels(settings).await?.is_empty() {
            debug!(user = %owner_id, kind = %kind, "No reachable channel, not sending");
            return Ok(NotificationState::Idle);
        }
        if self
            .notifications
            .was_sent(owner_id, kind.as_str(), subject, cycle)
            .await?
        {
            return Ok(NotificationState::SuppressedAlreadySent);
        }

        let message = message.await?;

        if !self
            .notifications
            .claim_send(owner_id, kind.as_str(), subject, cycle, now)
            .await?
        {
            debug!(user = %owner_id, kind = %kind, "Lost send claim to a concurrent tick");
            return Ok(NotificationState::SuppressedAlreadySent);
        }

        let report = self.dispatcher.dispatch(settings, &message).await;
        if report.delivered_any() {
            info!(user = %owner_id, kind = %kind, subject = %subject, "Notification sent");
            Ok(NotificationState::Sent)
        } else {
            warn!(
                user = %owner_id,
                kind = %kind,
                push = ?report.push,
                chat_bot = ?report.chat_bot,
                "Notification claimed but no channel delivered"
            );
            Ok(NotificationState::Due)
        }
    }
}
