//! Recurrence rules and date arithmetic.
//!
//! [`next_occurrence`] is the single date-advance primitive. Everything that
//! walks a series forward (completion-time scheduling, calendar expansion and
//! seeding) is built from repeated calls to it.

use std::fmt;

use chrono::{Datelike, Days, Months, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ChoreError, Result};
use crate::models::Task;
use crate::overdue::due_has_passed;

/// Upper bound on loop iterations for one expansion or seeding call.
pub const MAX_EXPANSION_ITERATIONS: usize = 366;

/// How a chore repeats. Each variant carries only the fields it uses.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Recurrence {
    #[default]
    None,
    Daily {
        #[serde(default = "default_interval")]
        interval: i64,
    },
    /// Every `interval` weeks, or on the next listed weekday when `days` is non-empty.
    Weekly {
        #[serde(default = "default_interval")]
        interval: i64,
        #[serde(default)]
        days: Vec<String>,
    },
    Monthly {
        #[serde(default = "default_interval")]
        interval: i64,
        #[serde(default)]
        day_of_month: Option<u32>,
    },
    Custom {
        #[serde(default = "default_interval")]
        interval: i64,
        #[serde(default)]
        unit: RecurrenceUnit,
    },
    /// Every day. Kept apart from `Daily` so callers can categorize it differently.
    Calendar,
}

fn default_interval() -> i64 {
    1
}

/// Discriminant of [`Recurrence`], used for filtering.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceKind {
    None,
    Daily,
    Weekly,
    Monthly,
    Custom,
    Calendar,
}

impl RecurrenceKind {
    /// Every kind except `None`.
    pub const RECURRING: [RecurrenceKind; 5] = [
        RecurrenceKind::Daily,
        RecurrenceKind::Weekly,
        RecurrenceKind::Monthly,
        RecurrenceKind::Custom,
        RecurrenceKind::Calendar,
    ];
}

/// Step unit of a custom recurrence. Unrecognized names fall back to days.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(from = "String", into = "String")]
pub enum RecurrenceUnit {
    #[default]
    Days,
    Weeks,
    Months,
}

impl From<String> for RecurrenceUnit {
    fn from(value: String) -> Self {
        RecurrenceUnit::parse(&value)
    }
}

impl From<RecurrenceUnit> for String {
    fn from(unit: RecurrenceUnit) -> Self {
        unit.as_str().to_string()
    }
}

impl RecurrenceUnit {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "weeks" | "week" => RecurrenceUnit::Weeks,
            "months" | "month" => RecurrenceUnit::Months,
            _ => RecurrenceUnit::Days,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecurrenceUnit::Days => "days",
            RecurrenceUnit::Weeks => "weeks",
            RecurrenceUnit::Months => "months",
        }
    }
}

impl Recurrence {
    pub fn is_none(&self) -> bool {
        matches!(self, Recurrence::None)
    }

    pub fn kind(&self) -> RecurrenceKind {
        match self {
            Recurrence::None => RecurrenceKind::None,
            Recurrence::Daily { .. } => RecurrenceKind::Daily,
            Recurrence::Weekly { .. } => RecurrenceKind::Weekly,
            Recurrence::Monthly { .. } => RecurrenceKind::Monthly,
            Recurrence::Custom { .. } => RecurrenceKind::Custom,
            Recurrence::Calendar => RecurrenceKind::Calendar,
        }
    }

    /// Builds a recurrence from the legacy storage shape: a type name plus a
    /// JSON object with `interval`, `unit`, `days` and `day_of_month`.
    ///
    /// An empty `raw` means "all defaults". Unknown type names, unparseable
    /// JSON and a `day_of_month` above 31 are rejected.
    pub fn from_config(kind: &str, raw: &str) -> Result<Self> {
        #[derive(Deserialize, Default)]
        struct LegacyConfig {
            #[serde(default)]
            interval: i64,
            #[serde(default)]
            unit: String,
            #[serde(default)]
            days: Vec<String>,
            #[serde(default)]
            day_of_month: i64,
        }

        let config: LegacyConfig = if raw.trim().is_empty() {
            LegacyConfig::default()
        } else {
            serde_json::from_str(raw)
                .map_err(|e| ChoreError::malformed(format!("parsing {raw:?}: {e}")))?
        };
        if config.day_of_month > 31 {
            return Err(ChoreError::malformed(format!(
                "day_of_month {} is outside 1..=31",
                config.day_of_month
            )));
        }

        let interval = normalize_interval(config.interval);
        let recurrence = match kind.trim().to_lowercase().as_str() {
            "" | "none" => Recurrence::None,
            "daily" => Recurrence::Daily { interval },
            "weekly" => Recurrence::Weekly {
                interval,
                days: config.days,
            },
            "monthly" => Recurrence::Monthly {
                interval,
                day_of_month: u32::try_from(config.day_of_month)
                    .ok()
                    .filter(|day| *day > 0),
            },
            "custom" => Recurrence::Custom {
                interval,
                unit: RecurrenceUnit::parse(&config.unit),
            },
            "calendar" => Recurrence::Calendar,
            other => {
                return Err(ChoreError::malformed(format!(
                    "unknown recurrence type {other:?}"
                )))
            }
        };
        Ok(recurrence)
    }
}

impl fmt::Display for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn every(f: &mut fmt::Formatter<'_>, interval: i64, unit: &str) -> fmt::Result {
            match normalize_interval(interval) {
                1 => write!(f, "every {unit}"),
                n => write!(f, "every {n} {unit}s"),
            }
        }

        match self {
            Recurrence::None => f.write_str("once"),
            Recurrence::Daily { interval } => every(f, *interval, "day"),
            Recurrence::Weekly { days, .. } if !days.is_empty() => {
                write!(f, "weekly on {}", days.join(", "))
            }
            Recurrence::Weekly { interval, .. } => every(f, *interval, "week"),
            Recurrence::Monthly {
                interval,
                day_of_month: Some(day),
            } => {
                every(f, *interval, "month")?;
                write!(f, " on day {day}")
            }
            Recurrence::Monthly { interval, .. } => every(f, *interval, "month"),
            Recurrence::Custom { interval, unit } => {
                let unit = unit.as_str();
                every(f, *interval, &unit[..unit.len() - 1])
            }
            Recurrence::Calendar => f.write_str("every day"),
        }
    }
}

/// Intervals of zero or below mean "every one".
pub fn normalize_interval(interval: i64) -> i64 {
    if interval <= 0 {
        1
    } else {
        interval
    }
}

fn parse_weekday(name: &str) -> Option<Weekday> {
    match name.trim().to_lowercase().as_str() {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

fn add_days(base: NaiveDate, days: i64) -> Result<NaiveDate> {
    u64::try_from(days)
        .ok()
        .and_then(|days| base.checked_add_days(Days::new(days)))
        .ok_or(ChoreError::DateOutOfRange { date: base })
}

fn add_weeks(base: NaiveDate, weeks: i64) -> Result<NaiveDate> {
    let days = weeks
        .checked_mul(7)
        .ok_or(ChoreError::DateOutOfRange { date: base })?;
    add_days(base, days)
}

fn add_months(base: NaiveDate, months: i64) -> Result<NaiveDate> {
    u32::try_from(months)
        .ok()
        .and_then(|months| base.checked_add_months(Months::new(months)))
        .ok_or(ChoreError::DateOutOfRange { date: base })
}

fn last_day_of_month(date: NaiveDate) -> u32 {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

fn next_listed_weekday(base: NaiveDate, names: &[String]) -> Result<NaiveDate> {
    let targets: Vec<Weekday> = names.iter().filter_map(|n| parse_weekday(n)).collect();
    if targets.is_empty() {
        return add_days(base, 7);
    }
    for offset in 1..=7 {
        let candidate = add_days(base, offset)?;
        if targets.contains(&candidate.weekday()) {
            return Ok(candidate);
        }
    }
    add_days(base, 7)
}

/// Computes the date of the occurrence following `base`.
///
/// `Recurrence::None` returns `base` unchanged; callers are expected to
/// handle non-recurring tasks before asking for a next date.
pub fn next_occurrence(base: NaiveDate, recurrence: &Recurrence) -> Result<NaiveDate> {
    match recurrence {
        Recurrence::None => Ok(base),
        Recurrence::Daily { interval } => add_days(base, normalize_interval(*interval)),
        Recurrence::Weekly { days, .. } if !days.is_empty() => next_listed_weekday(base, days),
        Recurrence::Weekly { interval, .. } => add_weeks(base, normalize_interval(*interval)),
        Recurrence::Monthly {
            interval,
            day_of_month,
        } => {
            let advanced = add_months(base, normalize_interval(*interval))?;
            match (*day_of_month).filter(|day| *day > 0) {
                Some(day) => {
                    let day = day.min(last_day_of_month(advanced));
                    advanced
                        .with_day(day)
                        .ok_or(ChoreError::DateOutOfRange { date: advanced })
                }
                None => Ok(advanced),
            }
        }
        Recurrence::Custom { interval, unit } => {
            let interval = normalize_interval(*interval);
            match unit {
                RecurrenceUnit::Days => add_days(base, interval),
                RecurrenceUnit::Weeks => add_weeks(base, interval),
                RecurrenceUnit::Months => add_months(base, interval),
            }
        }
        Recurrence::Calendar => add_days(base, 1),
    }
}

/// Length in days of every step of `recurrence`, when that length is constant.
///
/// Month-based steps are not constant. Listed weekdays repeat every 7 days once
/// the series sits on one of them.
fn fixed_step_days(recurrence: &Recurrence) -> Option<i64> {
    let days = match recurrence {
        Recurrence::None | Recurrence::Monthly { .. } => return None,
        Recurrence::Daily { interval } => normalize_interval(*interval),
        Recurrence::Weekly { days, .. } if !days.is_empty() => 7,
        Recurrence::Weekly { interval, .. } => normalize_interval(*interval).checked_mul(7)?,
        Recurrence::Custom { interval, unit } => match unit {
            RecurrenceUnit::Days => normalize_interval(*interval),
            RecurrenceUnit::Weeks => normalize_interval(*interval).checked_mul(7)?,
            RecurrenceUnit::Months => return None,
        },
        Recurrence::Calendar => 1,
    };
    Some(days)
}

/// [`next_occurrence`] for a moment in time; the time of day is preserved.
pub fn next_occurrence_at(base: NaiveDateTime, recurrence: &Recurrence) -> Result<NaiveDateTime> {
    Ok(next_occurrence(base.date(), recurrence)?.and_time(base.time()))
}

/// Due date for the instance that follows `task` once it is completed at `completed_at`.
///
/// Completion-anchored tasks land exactly one step after completion. Fixed
/// schedules step from the task's own due date and keep stepping until the
/// result is no longer in the past relative to `now`.
pub fn calculate_next_due_date(
    task: &Task,
    completed_at: NaiveDateTime,
    now: NaiveDateTime,
) -> Result<Option<NaiveDate>> {
    if task.recurrence.is_none() {
        return Ok(None);
    }

    let base = if task.recur_on_complete {
        completed_at
    } else {
        task.due_date
            .map(|date| date.and_time(NaiveTime::MIN))
            .unwrap_or(completed_at)
    };

    let mut next = next_occurrence_at(base, &task.recurrence)?;
    if !task.recur_on_complete {
        if let Some(step) = fixed_step_days(&task.recurrence) {
            let behind = (now.date() - next.date()).num_days();
            if behind > step {
                let jump = behind / step * step;
                next = add_days(next.date(), jump)?.and_time(next.time());
                debug!(task_id = %task.id, jumped_days = jump, "fast-forwarded fixed schedule");
            }
        }
        let mut skipped = 0usize;
        while due_has_passed(next.date(), task.due_time, now) {
            next = next_occurrence_at(next, &task.recurrence)?;
            skipped += 1;
        }
        if skipped > 0 {
            debug!(task_id = %task.id, skipped, next = %next.date(), "caught up fixed schedule");
        }
    }
    Ok(Some(next.date()))
}

/// A future date of a recurring task rendered for display only. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualOccurrence {
    pub due_date: NaiveDate,
    /// Copy of the source task with `due_date` substituted.
    pub task: Task,
}

/// Virtual occurrences of `task` falling in `[range_start, range_end)`.
pub fn expand(task: &Task, range_start: NaiveDate, range_end: NaiveDate) -> Vec<VirtualOccurrence> {
    expand_bounded(task, range_start, range_end, MAX_EXPANSION_ITERATIONS)
}

/// [`expand`] with an explicit iteration bound, capped at [`MAX_EXPANSION_ITERATIONS`].
pub fn expand_bounded(
    task: &Task,
    range_start: NaiveDate,
    range_end: NaiveDate,
    max_iterations: usize,
) -> Vec<VirtualOccurrence> {
    let mut occurrences = Vec::new();
    let Some(due) = task.due_date else {
        return occurrences;
    };
    if task.recurrence.is_none() {
        return occurrences;
    }

    let mut current = due;
    for _ in 0..max_iterations.min(MAX_EXPANSION_ITERATIONS) {
        let next = match next_occurrence(current, &task.recurrence) {
            Ok(next) => next,
            Err(e) => {
                debug!(task_id = %task.id, error = %e, "stopping expansion");
                break;
            }
        };
        if next >= range_end {
            break;
        }
        current = next;
        if next == due || next < range_start {
            continue;
        }

        let mut copy = task.clone();
        copy.due_date = Some(next);
        occurrences.push(VirtualOccurrence {
            due_date: next,
            task: copy,
        });
    }
    occurrences
}
