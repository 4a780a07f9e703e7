//! Message bodies for briefs and reminders, built from the record store.

use std::sync::Arc;

use chrono::{Duration, NaiveDate};

use crate::recurrence::{is_due_on, next_due_on_or_after};
use crate::traits::{HabitStore, Note, OutboundMessage, RecurrenceTemplate, TaskInstance};

/// How many pending items a brief lists before summarising the rest.
const MAX_LISTED: usize = 8;

pub struct BriefComposer {
    store: Arc<dyn HabitStore>,
    app_url: Option<String>,
}

impl BriefComposer {
    pub fn new(store: Arc<dyn HabitStore>, app_url: Option<String>) -> Self {
        Self { store, app_url }
    }

    pub async fn morning(&self, owner_id: &str, today: NaiveDate) -> anyhow::Result<OutboundMessage> {
        // Carried-over instances count as today's work too.
        let open = self
            .store
            .instances_between(owner_id, today - Duration::days(30), today)
            .await?;
        let templates = self.store.schedulable_templates(owner_id).await?;
        Ok(self.with_url(compose_morning(today, &open, &templates)))
    }

    pub async fn evening(&self, owner_id: &str, today: NaiveDate) -> anyhow::Result<OutboundMessage> {
        let instances = self.store.instances_between(owner_id, today, today).await?;
        let templates = self.store.schedulable_templates(owner_id).await?;
        Ok(self.with_url(compose_evening(&instances, &templates)))
    }

    pub async fn weekly(&self, owner_id: &str, today: NaiveDate) -> anyhow::Result<OutboundMessage> {
        let week_start = today - Duration::days(6);
        let instances = self
            .store
            .instances_between(owner_id, week_start, today)
            .await?;
        let templates = self.store.schedulable_templates(owner_id).await?;
        Ok(self.with_url(compose_weekly(today, &instances, &templates)))
    }

    pub fn task_reminder(&self, task: &TaskInstance) -> OutboundMessage {
        self.with_url(compose_task_reminder(task))
    }

    pub fn note_reminder(&self, note: &Note) -> OutboundMessage {
        self.with_url(compose_note_reminder(note))
    }

    fn with_url(&self, mut message: OutboundMessage) -> OutboundMessage {
        message.url = self.app_url.clone();
        message
    }
}

fn bullet_list(items: &[String]) -> String {
    let mut lines: Vec<String> = items
        .iter()
        .take(MAX_LISTED)
        .map(|item| format!("• {}", item))
        .collect();
    if items.len() > MAX_LISTED {
        lines.push(format!("…and {} more", items.len() - MAX_LISTED));
    }
    lines.join("\n")
}

pub fn compose_morning(
    today: NaiveDate,
    instances: &[TaskInstance],
    templates: &[RecurrenceTemplate],
) -> OutboundMessage {
    let pending: Vec<&TaskInstance> = instances
        .iter()
        .filter(|i| !i.completed && i.due_date <= today)
        .collect();
    let overdue = pending.iter().filter(|i| i.due_date < today).count();
    let habits: Vec<String> = templates
        .iter()
        .filter(|t| is_due_on(&t.pattern, today))
        .map(|t| match t.metrics.streak {
            0 => t.title.clone(),
            streak => format!("{} ({} in a row)", t.title, streak),
        })
        .collect();

    let mut sections = Vec::new();
    if pending.is_empty() {
        sections.push("Nothing pending for today.".to_string());
    } else {
        let titles: Vec<String> = pending.iter().map(|i| i.title.clone()).collect();
        let mut header = format!("{} pending today", pending.len());
        if overdue > 0 {
            header.push_str(&format!(" ({} carried over)", overdue));
        }
        sections.push(format!("{}:\n{}", header, bullet_list(&titles)));
    }
    if !habits.is_empty() {
        sections.push(format!("Habits due:\n{}", bullet_list(&habits)));
    }

    OutboundMessage {
        title: format!("Good morning · {}", today.format("%a %d %b")),
        body: sections.join("\n\n"),
        url: None,
    }
}

pub fn compose_evening(
    instances: &[TaskInstance],
    templates: &[RecurrenceTemplate],
) -> OutboundMessage {
    let done = instances.iter().filter(|i| i.completed).count();
    let open: Vec<String> = instances
        .iter()
        .filter(|i| !i.completed)
        .map(|i| i.title.clone())
        .collect();

    let mut sections = vec![format!("Completed {} of {} today.", done, instances.len())];
    if !open.is_empty() {
        sections.push(format!("Still open:\n{}", bullet_list(&open)));
    }
    if let Some(best) = templates.iter().max_by_key(|t| t.metrics.streak) {
        if best.metrics.streak > 0 {
            sections.push(format!(
                "Longest streak: {} at {} in a row.",
                best.title, best.metrics.streak
            ));
        }
    }

    OutboundMessage {
        title: "Evening check-in".to_string(),
        body: sections.join("\n\n"),
        url: None,
    }
}

pub fn compose_weekly(
    today: NaiveDate,
    instances: &[TaskInstance],
    templates: &[RecurrenceTemplate],
) -> OutboundMessage {
    let done = instances.iter().filter(|i| i.completed).count();
    let total = instances.len();
    let rate = if total == 0 {
        0
    } else {
        (done * 100 + total / 2) / total
    };

    let mut sections = vec![format!(
        "This week: {} of {} completed ({}%).",
        done, total, rate
    )];

    let mut by_streak: Vec<&RecurrenceTemplate> =
        templates.iter().filter(|t| t.metrics.streak > 0).collect();
    by_streak.sort_by(|a, b| b.metrics.streak.cmp(&a.metrics.streak));
    if !by_streak.is_empty() {
        let lines: Vec<String> = by_streak
            .iter()
            .map(|t| format!("{}: {} in a row", t.title, t.metrics.streak))
            .collect();
        sections.push(format!("Streaks:\n{}", bullet_list(&lines)));
    }

    let weak: Vec<String> = templates
        .iter()
        .filter_map(|t| {
            t.metrics
                .weakest_weekday()
                .map(|day| format!("{} slips most on {}", t.title, day))
        })
        .collect();
    if !weak.is_empty() {
        sections.push(format!("Watch out:\n{}", bullet_list(&weak)));
    }

    let tomorrow = today + Duration::days(1);
    let upcoming: Vec<String> = templates
        .iter()
        .filter_map(|t| {
            next_due_on_or_after(&t.pattern, tomorrow)
                .filter(|d| *d < tomorrow + Duration::days(7))
                .map(|d| format!("{} on {}", t.title, d.format("%a %d %b")))
        })
        .collect();
    if !upcoming.is_empty() {
        sections.push(format!("Coming up:\n{}", bullet_list(&upcoming)));
    }

    OutboundMessage {
        title: format!("Weekly review · week of {}", (today - Duration::days(6)).format("%d %b")),
        body: sections.join("\n\n"),
        url: None,
    }
}

pub fn compose_task_reminder(task: &TaskInstance) -> OutboundMessage {
    let when = match task.reminder_time {
        Some(time) => format!("Due today at {}", time.format("%H:%M")),
        None => "Due today".to_string(),
    };
    let body = match &task.description {
        Some(desc) if !desc.trim().is_empty() => format!("{}\n\n{}", when, desc.trim()),
        _ => when,
    };
    OutboundMessage {
        title: format!("Reminder: {}", task.title),
        body,
        url: None,
    }
}

pub fn compose_note_reminder(note: &Note) -> OutboundMessage {
    OutboundMessage {
        title: format!("Note: {}", note.title),
        body: if note.body.trim().is_empty() {
            "You asked to be reminded about this note.".to_string()
        } else {
            note.body.trim().to_string()
        },
        url: None,
    }
}
