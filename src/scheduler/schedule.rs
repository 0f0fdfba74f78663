//! Schedule expressions.
//!
//! Six space-separated fields, seconds first:
//!
//! ```text
//! ┌──────── second       0-59
//! │ ┌────── minute       0-59
//! │ │ ┌──── hour         0-23
//! │ │ │ ┌── day of month 1-31
//! │ │ │ │ ┌ month        1-12 or JAN-DEC
//! │ │ │ │ │ ┌ day of week 0-6 or SUN-SAT
//! * * * * * *
//! ```
//!
//! plus the descriptors `@yearly`, `@annually`, `@monthly`, `@weekly`,
//! `@daily`, `@midnight`, `@hourly` and `@every <duration>`.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Datelike, TimeZone, Timelike};
use thiserror::Error;

const FIELD_COUNT: usize = 6;

/// Longest accepted `@every` interval: one leap year.
const MAX_EVERY_SECS: u64 = 366 * 24 * 3600;

const MONTH_NAMES: &[&str] = &[
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];
const DAY_NAMES: &[&str] = &["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// Rejected schedule expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("empty schedule expression")]
    Empty,
    #[error("expected {expected} fields, found {found} in `{expr}`")]
    FieldCount {
        expr: String,
        expected: usize,
        found: usize,
    },
    #[error("invalid {field} field `{value}`: {reason}")]
    InvalidField {
        field: &'static str,
        value: String,
        reason: String,
    },
    #[error("invalid @every duration `{0}`")]
    InvalidDuration(String),
    #[error("unknown descriptor `{0}`")]
    UnknownDescriptor(String),
}

#[derive(Clone, Copy)]
struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
    /// Value of the first entry in `names`.
    names_base: u32,
}

const SECONDS: FieldSpec = FieldSpec { name: "second", min: 0, max: 59, names: &[], names_base: 0 };
const MINUTES: FieldSpec = FieldSpec { name: "minute", min: 0, max: 59, names: &[], names_base: 0 };
const HOURS: FieldSpec = FieldSpec { name: "hour", min: 0, max: 23, names: &[], names_base: 0 };
const DAYS_OF_MONTH: FieldSpec = FieldSpec { name: "day-of-month", min: 1, max: 31, names: &[], names_base: 0 };
const MONTHS: FieldSpec = FieldSpec { name: "month", min: 1, max: 12, names: MONTH_NAMES, names_base: 1 };
const DAYS_OF_WEEK: FieldSpec = FieldSpec { name: "day-of-week", min: 0, max: 6, names: DAY_NAMES, names_base: 0 };

/// Set of allowed values for one field, one bit per value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BitSet(u64);

impl BitSet {
    fn contains(self, value: u32) -> bool {
        self.0 & (1 << value) != 0
    }
}

/// Calendar-based schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    seconds: BitSet,
    minutes: BitSet,
    hours: BitSet,
    days_of_month: BitSet,
    months: BitSet,
    days_of_week: BitSet,
    /// Day-of-month was `*` or `?`.
    any_day_of_month: bool,
    /// Day-of-week was `*` or `?`.
    any_day_of_week: bool,
}

impl CronSchedule {
    /// Whether the second containing `at` is a firing time.
    pub fn matches<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> bool {
        self.seconds.contains(at.second())
            && self.minutes.contains(at.minute())
            && self.hours.contains(at.hour())
            && self.months.contains(at.month())
            && self.day_matches(at)
    }

    fn day_matches<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> bool {
        let dom = self.days_of_month.contains(at.day());
        let dow = self
            .days_of_week
            .contains(at.weekday().num_days_from_sunday());
        if self.any_day_of_month || self.any_day_of_week {
            dom && dow
        } else {
            dom || dow
        }
    }

    fn parse_fields(expr: &str) -> Result<Self, ScheduleError> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != FIELD_COUNT {
            return Err(ScheduleError::FieldCount {
                expr: expr.to_string(),
                expected: FIELD_COUNT,
                found: fields.len(),
            });
        }

        Ok(Self {
            seconds: parse_field(fields[0], SECONDS)?,
            minutes: parse_field(fields[1], MINUTES)?,
            hours: parse_field(fields[2], HOURS)?,
            days_of_month: parse_field(fields[3], DAYS_OF_MONTH)?,
            months: parse_field(fields[4], MONTHS)?,
            days_of_week: parse_field(fields[5], DAYS_OF_WEEK)?,
            any_day_of_month: is_unrestricted(fields[3]),
            any_day_of_week: is_unrestricted(fields[5]),
        })
    }
}

/// When a task fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    /// Fires on every second matching the calendar fields.
    Cron(CronSchedule),
    /// Fires once per interval, measured from when the scheduler first sees it.
    Every(Duration),
}

impl Schedule {
    /// Parse an expression; same as `str::parse`.
    pub fn parse(expr: &str) -> Result<Self, ScheduleError> {
        expr.parse()
    }
}

impl FromStr for Schedule {
    type Err = ScheduleError;

    fn from_str(expr: &str) -> Result<Self, Self::Err> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(ScheduleError::Empty);
        }

        if let Some(descriptor) = expr.strip_prefix('@') {
            return parse_descriptor(descriptor);
        }

        CronSchedule::parse_fields(expr).map(Schedule::Cron)
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Cron(_) => write!(f, "cron"),
            Schedule::Every(d) => write!(f, "@every {}s", d.as_secs()),
        }
    }
}

fn parse_descriptor(descriptor: &str) -> Result<Schedule, ScheduleError> {
    let expanded = match descriptor {
        "yearly" | "annually" => "0 0 0 1 1 *",
        "monthly" => "0 0 0 1 * *",
        "weekly" => "0 0 0 * * 0",
        "daily" | "midnight" => "0 0 0 * * *",
        "hourly" => "0 0 * * * *",
        other => {
            if let Some(duration) = other.strip_prefix("every ") {
                return parse_every(duration.trim()).map(Schedule::Every);
            }
            return Err(ScheduleError::UnknownDescriptor(format!("@{}", other)));
        }
    };
    CronSchedule::parse_fields(expanded).map(Schedule::Cron)
}

/// Parse `1h`, `30s`, `1m30s` and similar. Whole seconds only, between one
/// second and one leap year.
fn parse_every(text: &str) -> Result<Duration, ScheduleError> {
    let invalid = || ScheduleError::InvalidDuration(text.to_string());

    let mut total: u64 = 0;
    let mut digits = String::new();
    for c in text.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let unit = match c {
            'h' => 3600,
            'm' => 60,
            's' => 1,
            _ => return Err(invalid()),
        };
        let amount: u64 = digits.parse().map_err(|_| invalid())?;
        total = amount
            .checked_mul(unit)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(invalid)?;
        digits.clear();
    }

    if !digits.is_empty() || total == 0 || total > MAX_EVERY_SECS {
        return Err(invalid());
    }
    Ok(Duration::from_secs(total))
}

/// `*`, `?`, `*/1` and `?/1` leave a day field unrestricted.
fn is_unrestricted(field: &str) -> bool {
    let (range, step) = field.split_once('/').unwrap_or((field, "1"));
    matches!(range, "*" | "?") && step == "1"
}

fn parse_field(text: &str, spec: FieldSpec) -> Result<BitSet, ScheduleError> {
    let mut bits = 0u64;
    for part in text.split(',') {
        bits |= parse_part(part, spec).map_err(|reason| ScheduleError::InvalidField {
            field: spec.name,
            value: text.to_string(),
            reason,
        })?;
    }
    Ok(BitSet(bits))
}

/// One comma-separated element: `*`, `?`, `v`, `a-b`, each with optional `/step`.
fn parse_part(part: &str, spec: FieldSpec) -> Result<u64, String> {
    let (range, step) = match part.split_once('/') {
        Some((range, step)) => {
            let step: u32 = step.parse().map_err(|_| format!("bad step `{}`", step))?;
            if step == 0 {
                return Err("step must be > 0".to_string());
            }
            (range, Some(step))
        }
        None => (part, None),
    };

    let (start, end) = if range == "*" || range == "?" {
        (spec.min, spec.max)
    } else if let Some((a, b)) = range.split_once('-') {
        (parse_value(a, spec)?, parse_value(b, spec)?)
    } else {
        let value = parse_value(range, spec)?;
        // `5/15` means "from 5 to the end, every 15".
        (value, if step.is_some() { spec.max } else { value })
    };

    if start > end {
        return Err(format!("range {}-{} is backwards", start, end));
    }

    let step = step.unwrap_or(1);
    Ok((start..=end).step_by(step as usize).fold(0u64, |acc, v| acc | (1 << v)))
}

fn parse_value(text: &str, spec: FieldSpec) -> Result<u32, String> {
    let value = match text.parse::<u32>() {
        Ok(v) => v,
        Err(_) => spec
            .names
            .iter()
            .position(|n| n.eq_ignore_ascii_case(text))
            .map(|i| i as u32 + spec.names_base)
            .ok_or_else(|| format!("`{}` is not a number", text))?,
    };
    if value < spec.min || value > spec.max {
        return Err(format!("{} is outside {}-{}", value, spec.min, spec.max));
    }
    Ok(value)
}
