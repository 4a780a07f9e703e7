//! Resolve "now" in a user's stored timezone.

use chrono::{DateTime, NaiveDateTime, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;

/// Used when a user has no timezone configured, or an unparseable one.
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::Sao_Paulo;

#[derive(Debug, Clone, Copy)]
pub struct TimezoneResolver {
    fallback: Tz,
}

impl Default for TimezoneResolver {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEZONE)
    }
}

impl TimezoneResolver {
    pub fn new(fallback: Tz) -> Self {
        Self { fallback }
    }

    /// Build from a configured fallback id, keeping the built-in default
    /// when the id does not parse.
    pub fn from_config(fallback_id: &str) -> Self {
        match fallback_id.trim().parse::<Tz>() {
            Ok(tz) => Self::new(tz),
            Err(_) => {
                tracing::warn!(
                    timezone = %fallback_id,
                    "Unknown default timezone, using {}",
                    DEFAULT_TIMEZONE
                );
                Self::default()
            }
        }
    }

    pub fn fallback(&self) -> Tz {
        self.fallback
    }

    pub fn resolve(&self, timezone_id: Option<&str>) -> Tz {
        timezone_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .and_then(|id| id.parse::<Tz>().ok())
            .unwrap_or(self.fallback)
    }

    /// Local wall-clock time for `utc` in the given timezone id.
    pub fn local_now(&self, utc: DateTime<Utc>, timezone_id: Option<&str>) -> NaiveDateTime {
        local_now_in(utc, self.resolve(timezone_id))
    }
}

fn local_now_in(utc: DateTime<Utc>, tz: Tz) -> NaiveDateTime {
    utc.with_timezone(&tz).naive_local()
}

/// Drop seconds and sub-second precision.
pub fn truncate_to_minute(time: NaiveTime) -> NaiveTime {
    time.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(time)
}

/// Parse a stored local time of day. Accepts `HH:MM` and `HH:MM:SS`.
pub fn parse_time_of_day(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .ok()
}
