use chrono::{DateTime, Datelike, Duration, DurationRound, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How far ahead a cron spec is searched for its next firing.
const MAX_CRON_LOOKAHEAD_MINUTES: i64 = 366 * 24 * 60;

/// Schedule descriptor stored alongside a job registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    Interval { hours: u32 },
    Cron { spec: String },
}

impl Schedule {
    pub fn validate(&self) -> Result<()> {
        match self {
            Schedule::Interval { hours: 0 } => {
                Err(Error::validation("interval must be at least one hour"))
            }
            Schedule::Interval { .. } => Ok(()),
            Schedule::Cron { spec } => CronSpec::parse(spec).map(|_| ()),
        }
    }

    /// Returns true when a job anchored at `anchor` (its last run, or its
    /// registration time) should run at `now`.
    pub fn is_due(&self, anchor: DateTime<Utc>, now: DateTime<Utc>) -> Result<bool> {
        match self {
            Schedule::Interval { hours } => Ok(now - anchor >= Duration::hours(i64::from(*hours))),
            Schedule::Cron { spec } => {
                let cron = CronSpec::parse(spec)?;
                Ok(cron.next_after(anchor).is_some_and(|next| next <= now))
            }
        }
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Schedule::Interval { hours } => write!(f, "every {hours}h"),
            Schedule::Cron { spec } => write!(f, "cron '{spec}'"),
        }
    }
}

/// A parsed five-field cron expression (minute hour day-of-month month day-of-week).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSpec {
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronSpec {
    pub fn parse(spec: &str) -> Result<Self> {
        let fields: Vec<&str> = spec.split_whitespace().collect();
        let [minute, hour, dom, month, dow] = fields.as_slice() else {
            return Err(Error::validation(format!(
                "cron spec '{spec}' must have five fields"
            )));
        };

        let mut days_of_week = parse_field(dow, 0, 7)?;
        // 7 is an alias for Sunday
        if days_of_week & (1 << 7) != 0 {
            days_of_week = (days_of_week | 1) & !(1 << 7);
        }

        Ok(Self {
            minutes: parse_field(minute, 0, 59)?,
            hours: parse_field(hour, 0, 23)?,
            days_of_month: parse_field(dom, 1, 31)?,
            months: parse_field(month, 1, 12)?,
            days_of_week,
            dom_restricted: !dom.starts_with('*'),
            dow_restricted: !dow.starts_with('*'),
        })
    }

    #[must_use]
    pub fn matches(&self, at: DateTime<Utc>) -> bool {
        let bit = |mask: u64, value: u32| mask & (1 << value) != 0;

        if !bit(self.minutes, at.minute()) || !bit(self.hours, at.hour()) {
            return false;
        }
        if !bit(self.months, at.month()) {
            return false;
        }

        let dom = bit(self.days_of_month, at.day());
        let dow = bit(self.days_of_week, at.weekday().num_days_from_sunday());
        match (self.dom_restricted, self.dow_restricted) {
            (true, true) => dom || dow,
            (true, false) => dom,
            (false, true) => dow,
            (false, false) => true,
        }
    }

    /// First matching minute strictly after `from`.
    #[must_use]
    pub fn next_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut at = from.duration_trunc(Duration::minutes(1)).ok()? + Duration::minutes(1);
        for _ in 0..MAX_CRON_LOOKAHEAD_MINUTES {
            if self.matches(at) {
                return Some(at);
            }
            at += Duration::minutes(1);
        }
        None
    }
}

fn parse_field(field: &str, min: u32, max: u32) -> Result<u64> {
    let invalid = || Error::validation(format!("invalid cron field '{field}'"));
    let mut mask = 0u64;

    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => (range, step.parse::<u32>().map_err(|_| invalid())?),
            None => (part, 1),
        };
        if step == 0 {
            return Err(invalid());
        }

        let (start, end) = if range == "*" {
            (min, max)
        } else if let Some((a, b)) = range.split_once('-') {
            (
                a.parse::<u32>().map_err(|_| invalid())?,
                b.parse::<u32>().map_err(|_| invalid())?,
            )
        } else {
            let value = range.parse::<u32>().map_err(|_| invalid())?;
            // "5/15" means starting at 5 through the end of the range
            if part.contains('/') {
                (value, max)
            } else {
                (value, value)
            }
        };

        if start < min || end > max || start > end {
            return Err(invalid());
        }

        let mut value = Some(start);
        while let Some(v) = value.filter(|v| *v <= end) {
            mask |= 1 << v;
            value = v.checked_add(step);
        }
    }

    Ok(mask)
}
