//! Schedule expressions for time-triggered rules.
//!
//! Three forms are accepted, all evaluated in UTC:
//!
//! | Form | Example |
//! |------|---------|
//! | `daily HH:MM` | `daily 06:00` |
//! | `every <n><s\|m\|h>` | `every 15m` |
//! | five-field cron | `0 8 * * 1-5` |
//!
//! Cron fields accept `*`, `*/n`, plain numbers, ranges (`1-5`), stepped
//! ranges (`0-30/10`), and comma lists of those.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::time::Timestamp;

/// How far ahead a cron expression is searched before giving up.
const CRON_HORIZON_MINUTES: i64 = 366 * 24 * 60;

/// A parsed schedule, remembered together with its source expression.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Schedule {
    expression: String,
    kind: ScheduleKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ScheduleKind {
    Daily { hour: u32, minute: u32 },
    Every { seconds: u32 },
    Cron(CronSpec),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CronSpec {
    minutes: FieldSet,
    hours: FieldSet,
    days_of_month: FieldSet,
    months: FieldSet,
    days_of_week: FieldSet,
}

/// Bitmask of allowed values for one cron field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct FieldSet {
    bits: u64,
    any: bool,
}

impl FieldSet {
    fn contains(self, value: u32) -> bool {
        self.bits & (1 << value) != 0
    }
}

impl Schedule {
    /// Parse a schedule expression.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidSchedule`] when the expression
    /// matches none of the supported forms.
    pub fn parse(expression: &str) -> Result<Self, ConfigurationError> {
        let normalized = expression.split_whitespace().collect::<Vec<_>>().join(" ");
        let invalid = |reason| ConfigurationError::InvalidSchedule {
            expression: expression.to_string(),
            reason,
        };

        let kind = if let Some(at) = normalized.strip_prefix("daily ") {
            let time = NaiveTime::parse_from_str(at, "%H:%M")
                .map_err(|_| invalid("expected `daily HH:MM`"))?;
            ScheduleKind::Daily {
                hour: time.hour(),
                minute: time.minute(),
            }
        } else if let Some(interval) = normalized.strip_prefix("every ") {
            ScheduleKind::Every {
                seconds: parse_interval(interval).ok_or_else(|| invalid("expected `every <n><s|m|h>`"))?,
            }
        } else {
            ScheduleKind::Cron(parse_cron(&normalized).map_err(invalid)?)
        };

        Ok(Self {
            expression: normalized,
            kind,
        })
    }

    /// The normalized source expression.
    #[must_use]
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The first fire instant strictly after `after`.
    ///
    /// Returns `None` for cron expressions that never match within a year
    /// (e.g. February 31st).
    #[must_use]
    pub fn next_after(&self, after: Timestamp) -> Option<Timestamp> {
        match &self.kind {
            ScheduleKind::Daily { hour, minute } => {
                let today = after
                    .date_naive()
                    .and_hms_opt(*hour, *minute, 0)?
                    .and_utc();
                if today > after {
                    Some(today)
                } else {
                    Some(today + Duration::days(1))
                }
            }
            ScheduleKind::Every { seconds } => Some(after + Duration::seconds(i64::from(*seconds))),
            ScheduleKind::Cron(spec) => {
                let start = after
                    .with_second(0)?
                    .with_nanosecond(0)?
                    + Duration::minutes(1);
                (0..CRON_HORIZON_MINUTES)
                    .map(|offset| start + Duration::minutes(offset))
                    .find(|candidate| spec.matches(*candidate))
            }
        }
    }
}

impl CronSpec {
    fn matches(&self, ts: Timestamp) -> bool {
        let day_matches = {
            let dom = self.days_of_month.contains(ts.day());
            let dow = self.days_of_week.contains(ts.weekday().num_days_from_sunday());
            // classic cron: when both day fields are restricted either one may match
            if self.days_of_month.any || self.days_of_week.any {
                dom && dow
            } else {
                dom || dow
            }
        };
        day_matches
            && self.minutes.contains(ts.minute())
            && self.hours.contains(ts.hour())
            && self.months.contains(ts.month())
    }
}

fn parse_interval(text: &str) -> Option<u32> {
    let split = text.len().checked_sub(1)?;
    let (amount, unit) = text.split_at(split);
    let amount: u32 = amount.parse().ok().filter(|n| *n > 0)?;
    let factor = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        _ => return None,
    };
    amount.checked_mul(factor)
}

fn parse_cron(expression: &str) -> Result<CronSpec, &'static str> {
    let fields: Vec<&str> = expression.split(' ').collect();
    let [minutes, hours, dom, months, dow] = fields.as_slice() else {
        return Err("expected `daily HH:MM`, `every <n><s|m|h>`, or five cron fields");
    };
    let mut days_of_week = parse_field(dow, 0, 7)?;
    // 7 is an alias for Sunday
    if days_of_week.contains(7) {
        days_of_week.bits |= 1;
    }
    Ok(CronSpec {
        minutes: parse_field(minutes, 0, 59)?,
        hours: parse_field(hours, 0, 23)?,
        days_of_month: parse_field(dom, 1, 31)?,
        months: parse_field(months, 1, 12)?,
        days_of_week,
    })
}

fn parse_field(field: &str, min: u32, max: u32) -> Result<FieldSet, &'static str> {
    let range_bits = |step: u32| {
        (min..=max)
            .step_by(step as usize)
            .fold(0_u64, |bits, v| bits | (1 << v))
    };

    if field == "*" {
        return Ok(FieldSet {
            bits: range_bits(1),
            any: true,
        });
    }
    if let Some(step) = field.strip_prefix("*/") {
        let step: u32 = step
            .parse()
            .ok()
            .filter(|s| *s > 0)
            .ok_or("cron step must be a positive number")?;
        return Ok(FieldSet {
            bits: range_bits(step),
            any: false,
        });
    }

    let mut bits = 0_u64;
    for part in field.split(',') {
        bits |= parse_part(part, min, max)?;
    }
    Ok(FieldSet { bits, any: false })
}

/// One comma-separated item: `n`, `a-b`, or `a-b/step`.
fn parse_part(part: &str, min: u32, max: u32) -> Result<u64, &'static str> {
    let number = |text: &str| -> Result<u32, &'static str> {
        let value: u32 = text
            .parse()
            .map_err(|_| "cron field must be `*`, `*/n`, numbers, or ranges")?;
        if value < min || value > max {
            return Err("cron value out of range");
        }
        Ok(value)
    };

    let (range, step) = match part.split_once('/') {
        Some((range, step)) => {
            let step: u32 = step
                .parse()
                .ok()
                .filter(|s| *s > 0)
                .ok_or("cron step must be a positive number")?;
            (range, step)
        }
        None => (part, 1),
    };
    let (start, end) = match range.split_once('-') {
        Some((start, end)) => (number(start)?, number(end)?),
        None if step == 1 => {
            let value = number(range)?;
            (value, value)
        }
        None => return Err("cron step needs `*` or a range"),
    };
    if start > end {
        return Err("cron range start is after its end");
    }
    Ok((start..=end)
        .step_by(step as usize)
        .fold(0_u64, |bits, v| bits | (1 << v)))
}

impl PartialEq for Schedule {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Eq for Schedule {}

impl Hash for Schedule {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

impl FromStr for Schedule {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Schedule {
    type Error = ConfigurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Schedule> for String {
    fn from(schedule: Schedule) -> Self {
        schedule.expression
    }
}
