//! Recurrence patterns and the "is this template due on this date" matcher.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecurrencePattern {
    Daily,
    Weekly { days: Vec<Weekday> },
    /// `day` is 1..=31. Months shorter than `day` fire on their last day.
    Monthly { day: u32 },
}

impl RecurrencePattern {
    #[cfg(test)]
    pub fn weekly(days: &[Weekday]) -> Self {
        Self::Weekly {
            days: days.to_vec(),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::Daily => "daily".to_string(),
            Self::Weekly { days } => {
                let names: Vec<String> = days.iter().map(|d| d.to_string()).collect();
                format!("weekly ({})", names.join(", "))
            }
            Self::Monthly { day } => format!("monthly (day {})", day),
        }
    }
}

/// Whether a template with `pattern` is due on the local `date`.
pub fn is_due_on(pattern: &RecurrencePattern, date: NaiveDate) -> bool {
    match pattern {
        RecurrencePattern::Daily => true,
        RecurrencePattern::Weekly { days } => days.contains(&date.weekday()),
        RecurrencePattern::Monthly { day } => {
            if *day == 0 {
                return false;
            }
            let last = days_in_month(date.year(), date.month());
            date.day() == (*day).min(last)
        }
    }
}

/// Key of the recurrence cycle `date` belongs to. Every pattern fires at most
/// once per date, so the due date itself identifies the cycle.
pub fn cycle_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// ISO week key, e.g. `2024-W09`.
pub fn iso_week_key(date: NaiveDate) -> String {
    let week = date.iso_week();
    format!("{}-W{:02}", week.year(), week.week())
}

/// First date on or after `from` (within a year) on which the pattern is due.
pub fn next_due_on_or_after(pattern: &RecurrencePattern, from: NaiveDate) -> Option<NaiveDate> {
    (0..=366)
        .map(|offset| from + Duration::days(offset))
        .find(|date| is_due_on(pattern, *date))
}

/// Every due date in `from..=through`, in order.
pub fn due_dates_between(
    pattern: &RecurrencePattern,
    from: NaiveDate,
    through: NaiveDate,
) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut cursor = from;
    while cursor <= through {
        let Some(next) = next_due_on_or_after(pattern, cursor).filter(|d| *d <= through) else {
            break;
        };
        dates.push(next);
        let Some(after) = next.succ_opt() else { break };
        cursor = after;
    }
    dates
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first_of_next| first_of_next.pred_opt())
        .map(|last| last.day())
        .unwrap_or(31)
}
