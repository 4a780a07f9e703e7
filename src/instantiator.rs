//! Spawns task instances from recurrence templates, at most one per cycle.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use crate::recurrence::{cycle_key, is_due_on};
use crate::traits::{HabitStore, RecurrenceTemplate, TaskInstance};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InstantiationOutcome {
    InstanceCreated { instance: TaskInstance },
    /// An incomplete instance already exists; nothing was written.
    AlreadyPending { instance_id: String },
    /// This cycle already has an instance (completed, or inserted by a
    /// concurrent run between the pending check and the insert).
    CycleComplete,
    NotDueToday,
}

pub struct Instantiator {
    store: Arc<dyn HabitStore>,
}

impl Instantiator {
    pub fn new(store: Arc<dyn HabitStore>) -> Self {
        Self { store }
    }

    pub async fn ensure_instance(
        &self,
        template: &RecurrenceTemplate,
        date: NaiveDate,
    ) -> anyhow::Result<InstantiationOutcome> {
        if !template.is_schedulable() || !is_due_on(&template.pattern, date) {
            return Ok(InstantiationOutcome::NotDueToday);
        }

        if let Some(pending) = self.store.pending_instance(&template.id).await? {
            debug!(
                template = %template.id,
                pending = %pending.id,
                "Instance already pending"
            );
            return Ok(InstantiationOutcome::AlreadyPending {
                instance_id: pending.id,
            });
        }

        let instance = instance_for(template, date);
        if self.store.insert_instance_if_absent(&instance).await? {
            info!(
                owner = %template.owner_id,
                template = %template.id,
                pattern = %template.pattern.label(),
                due = %date,
                "Created recurring instance"
            );
            return Ok(InstantiationOutcome::InstanceCreated { instance });
        }

        // Lost the insert: either the cycle is done or someone else just created it.
        match self.store.pending_instance(&template.id).await? {
            Some(pending) => Ok(InstantiationOutcome::AlreadyPending {
                instance_id: pending.id,
            }),
            None => Ok(InstantiationOutcome::CycleComplete),
        }
    }
}

/// Snapshot a template into a new instance for `date`.
fn instance_for(template: &RecurrenceTemplate, date: NaiveDate) -> TaskInstance {
    TaskInstance {
        template_id: Some(template.id.clone()),
        description: template.description.clone(),
        cycle_key: Some(cycle_key(date)),
        board: template.board.clone(),
        priority: template.priority.clone(),
        reminder_time: template.reminder_time,
        ..TaskInstance::one_off(&template.owner_id, &template.title, date)
    }
}
