//! Streak and completion metrics for recurrence templates.
//!
//! The arithmetic lives in pure functions on [`StreakMetrics`]; the store applies
//! them inside the same transaction that flips an instance's completion flag so
//! concurrent toggles of one habit cannot lose updates.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::traits::{HabitStore, TaskInstance};

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreakMetrics {
    pub streak: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_completed_on: Option<NaiveDate>,
    pub total_completions: u32,
    /// Distinct cycle dates that ended without a completion.
    pub failure_history: BTreeSet<NaiveDate>,
    /// Failure counts indexed Monday = 0 .. Sunday = 6.
    pub weekday_failures: [u32; 7],
    pub success_rate: f64,
}

impl Default for StreakMetrics {
    fn default() -> Self {
        Self {
            streak: 0,
            last_completed_on: None,
            total_completions: 0,
            failure_history: BTreeSet::new(),
            weekday_failures: [0; 7],
            success_rate: 0.0,
        }
    }
}

impl StreakMetrics {
    /// Apply a completion (`completing = true`) or its reversal for `cycle_date`.
    ///
    /// A completion only extends the streak when no charged failure lies
    /// between the previous completion and `cycle_date`. Completing a cycle
    /// older than a recorded failure leaves the streak alone.
    pub fn record_completion(&self, cycle_date: NaiveDate, completing: bool) -> Self {
        let mut next = self.clone();
        if completing {
            next.remove_failure(cycle_date);
            next.total_completions = next.total_completions.saturating_add(1);
            if next.failure_history.range(cycle_date..).next().is_none() {
                let gap = match next.last_completed_on {
                    Some(last) if last < cycle_date => {
                        next.failure_history.range(last..cycle_date).next().is_some()
                    }
                    Some(_) => false,
                    None => !next.failure_history.is_empty(),
                };
                next.streak = if gap { 1 } else { next.streak.saturating_add(1) };
            }
            if next.last_completed_on.map_or(true, |last| last < cycle_date) {
                next.last_completed_on = Some(cycle_date);
            }
        } else {
            next.streak = next.streak.saturating_sub(1);
            next.total_completions = next.total_completions.saturating_sub(1);
            if next.last_completed_on == Some(cycle_date) {
                next.last_completed_on = None;
            }
            next.add_failure(cycle_date);
        }
        next.recompute_success_rate();
        next
    }

    /// A cycle ended without completion: the streak resets.
    pub fn record_miss(&self, cycle_date: NaiveDate) -> Self {
        let mut next = self.clone();
        next.streak = 0;
        next.add_failure(cycle_date);
        next.recompute_success_rate();
        next
    }

    /// Weekday with the most recorded failures, if any were recorded.
    pub fn weakest_weekday(&self) -> Option<Weekday> {
        let (idx, count) = self
            .weekday_failures
            .iter()
            .enumerate()
            .max_by_key(|(idx, count)| (**count, std::cmp::Reverse(*idx)))?;
        if *count == 0 {
            return None;
        }
        WEEKDAYS.get(idx).copied()
    }

    fn add_failure(&mut self, date: NaiveDate) {
        if self.failure_history.insert(date) {
            let idx = date.weekday().num_days_from_monday() as usize;
            self.weekday_failures[idx] = self.weekday_failures[idx].saturating_add(1);
        }
    }

    fn remove_failure(&mut self, date: NaiveDate) {
        if self.failure_history.remove(&date) {
            let idx = date.weekday().num_days_from_monday() as usize;
            self.weekday_failures[idx] = self.weekday_failures[idx].saturating_sub(1);
        }
    }

    fn recompute_success_rate(&mut self) {
        let completions = self.total_completions as f64;
        let failures = self.failure_history.len() as f64;
        self.success_rate = if completions + failures == 0.0 {
            0.0
        } else {
            completions / (completions + failures)
        };
    }
}

/// What a completion toggle did.
#[derive(Debug, Clone, Serialize)]
pub struct ToggleOutcome {
    pub instance: TaskInstance,
    /// False when the instance was already in the requested state.
    pub changed: bool,
    /// Updated template metrics; None for one-off tasks or no-op toggles.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<StreakMetrics>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MissOutcome {
    pub instance_id: String,
    pub template_id: String,
    /// Cycles charged by this sweep, oldest first.
    pub cycle_dates: Vec<NaiveDate>,
    pub metrics: StreakMetrics,
}

/// Entry points for completion toggles and the missed-cycle sweep.
pub struct StreakUpdater {
    store: Arc<dyn HabitStore>,
}

impl StreakUpdater {
    pub fn new(store: Arc<dyn HabitStore>) -> Self {
        Self { store }
    }

    /// Mark an instance done or not done. Returns None for unknown ids.
    pub async fn toggle(
        &self,
        instance_id: &str,
        completed: bool,
    ) -> anyhow::Result<Option<ToggleOutcome>> {
        let outcome = self
            .store
            .toggle_instance(instance_id, completed, Utc::now())
            .await?;
        if let Some(ref outcome) = outcome {
            if let Some(ref metrics) = outcome.metrics {
                info!(
                    instance = %instance_id,
                    completed,
                    streak = metrics.streak,
                    "Recorded completion toggle"
                );
            }
        }
        Ok(outcome)
    }

    /// Charge every cycle that ended before `today` while a template instance
    /// sat incomplete: the instance's own date plus any later due dates that
    /// got no instance because it was still pending. Returns the number of
    /// cycles charged. Failures on one instance do not stop the others.
    pub async fn sweep_misses(&self, owner_id: &str, today: NaiveDate) -> anyhow::Result<usize> {
        let Some(through) = today.pred_opt() else {
            return Ok(0);
        };
        let stale = self.store.unrecorded_misses(owner_id, through).await?;
        let mut recorded = 0usize;
        for instance in stale {
            match self.store.record_misses(&instance.id, through).await {
                Ok(Some(miss)) => {
                    info!(
                        owner = %owner_id,
                        template = %miss.template_id,
                        from = ?miss.cycle_dates.first(),
                        cycles = miss.cycle_dates.len(),
                        "Recorded missed cycles, streak reset"
                    );
                    recorded += miss.cycle_dates.len();
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(owner = %owner_id, instance = %instance.id, "Failed to record miss: {}", e);
                }
            }
        }
        Ok(recorded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_consecutive_completions_build_streak() {
        let start = date(2024, 3, 1);
        let mut metrics = StreakMetrics::default();
        for offset in 0..5 {
            metrics = metrics.record_completion(start + Duration::days(offset), true);
        }
        assert_eq!(metrics.streak, 5);
        assert_eq!(metrics.total_completions, 5);
        assert_eq!(metrics.last_completed_on, Some(date(2024, 3, 5)));
        assert_eq!(metrics.success_rate, 1.0);
    }

    #[test]
    fn test_reversal_drops_streak_and_records_failure() {
        let start = date(2024, 3, 1);
        let mut metrics = StreakMetrics::default();
        for offset in 0..4 {
            metrics = metrics.record_completion(start + Duration::days(offset), true);
        }
        let latest = date(2024, 3, 4);
        let undone = metrics.record_completion(latest, false);
        assert_eq!(undone.streak, 3);
        assert_eq!(undone.total_completions, 3);
        assert!(undone.failure_history.contains(&latest));
        assert_eq!(undone.last_completed_on, None);
        assert!((undone.success_rate - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_streak_floors_at_zero() {
        let metrics = StreakMetrics::default().record_completion(date(2024, 3, 1), false);
        assert_eq!(metrics.streak, 0);
        assert_eq!(metrics.total_completions, 0);
        assert_eq!(metrics.success_rate, 0.0);
    }

    #[test]
    fn test_friday_miss_goes_to_weekday_bucket() {
        let friday = date(2024, 3, 8);
        assert_eq!(friday.weekday(), Weekday::Fri);
        let metrics = StreakMetrics::default().record_completion(friday, false);
        assert!(metrics.failure_history.contains(&friday));
        assert_eq!(metrics.weekday_failures[4], 1);
        assert_eq!(metrics.weakest_weekday(), Some(Weekday::Fri));

        // Same date again is not a new distinct failure.
        let again = metrics.record_completion(friday, false);
        assert_eq!(again.weekday_failures[4], 1);
        assert_eq!(again.failure_history.len(), 1);
    }

    #[test]
    fn test_completion_clears_failure_for_that_date() {
        let friday = date(2024, 3, 8);
        let missed = StreakMetrics::default().record_miss(friday);
        assert_eq!(missed.weekday_failures[4], 1);
        let late = missed.record_completion(friday, true);
        assert!(late.failure_history.is_empty());
        assert_eq!(late.weekday_failures[4], 0);
        assert_eq!(late.streak, 1);
        assert_eq!(late.success_rate, 1.0);
    }

    #[test]
    fn test_miss_resets_streak() {
        let mut metrics = StreakMetrics::default();
        for offset in 0..3 {
            metrics = metrics.record_completion(date(2024, 3, 1) + Duration::days(offset), true);
        }
        let missed = metrics.record_miss(date(2024, 3, 4));
        assert_eq!(missed.streak, 0);
        assert_eq!(missed.total_completions, 3);
        assert!((missed.success_rate - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_late_completion_does_not_bridge_later_misses() {
        let mut metrics = StreakMetrics::default();
        for offset in 0..4 {
            metrics = metrics.record_miss(date(2024, 3, 1) + Duration::days(offset));
        }

        // Mar 1 done late: its failure goes away, Mar 2..4 still break the run.
        let late = metrics.record_completion(date(2024, 3, 1), true);
        assert_eq!(late.streak, 0);
        assert_eq!(late.failure_history.len(), 3);
        assert_eq!(late.last_completed_on, Some(date(2024, 3, 1)));

        let today = late.record_completion(date(2024, 3, 5), true);
        assert_eq!(today.streak, 1);
        assert_eq!(today.total_completions, 2);
        assert!((today.success_rate - 0.4).abs() < 1e-9);

        let tomorrow = today.record_completion(date(2024, 3, 6), true);
        assert_eq!(tomorrow.streak, 2);
    }

    #[test]
    fn test_recompleting_reversed_cycle_restores_streak() {
        let mut metrics = StreakMetrics::default();
        for offset in 0..3 {
            metrics = metrics.record_completion(date(2024, 3, 1) + Duration::days(offset), true);
        }
        let undone = metrics.record_completion(date(2024, 3, 3), false);
        assert_eq!(undone.streak, 2);
        let redone = undone.record_completion(date(2024, 3, 3), true);
        assert_eq!(redone.streak, 3);
        assert!(redone.failure_history.is_empty());
    }

    #[test]
    fn test_weakest_weekday_none_without_failures() {
        assert_eq!(StreakMetrics::default().weakest_weekday(), None);
    }
}
