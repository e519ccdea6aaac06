//! Five-field cron expressions for schedule triggers
//!
//! Supports the classic `minute hour day-of-month month day-of-week` grammar:
//! `*`, single values, ranges (`1-5`), lists (`1,15`), steps (`*/15`, `0-30/10`)
//! and three-letter month/weekday names. Day-of-week `7` is an alias for Sunday.
//! All evaluation happens in UTC at minute resolution.

use chrono::{DateTime, Datelike, Duration, DurationRound, TimeZone, Timelike, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error produced when a cron expression cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid cron expression '{expression}': {reason}")]
pub struct CronError {
    pub expression: String,
    pub reason: String,
}

const MONTH_NAMES: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];
const WEEKDAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// How far ahead `next_after` searches before giving up (e.g. `0 0 30 2 *`)
const SEARCH_HORIZON_YEARS: i32 = 5;

#[derive(Debug, Clone, Copy)]
enum Field {
    Minute,
    Hour,
    DayOfMonth,
    Month,
    DayOfWeek,
}

impl Field {
    fn name(self) -> &'static str {
        match self {
            Field::Minute => "minute",
            Field::Hour => "hour",
            Field::DayOfMonth => "day-of-month",
            Field::Month => "month",
            Field::DayOfWeek => "day-of-week",
        }
    }

    fn bounds(self) -> (u32, u32) {
        match self {
            Field::Minute => (0, 59),
            Field::Hour => (0, 23),
            Field::DayOfMonth => (1, 31),
            Field::Month => (1, 12),
            // 7 is folded into 0 after parsing
            Field::DayOfWeek => (0, 7),
        }
    }

    fn names(self) -> Option<(&'static [&'static str], u32)> {
        match self {
            Field::Month => Some((&MONTH_NAMES, 1)),
            Field::DayOfWeek => Some((&WEEKDAY_NAMES, 0)),
            _ => None,
        }
    }
}

/// Set of allowed values for one field, stored as a bitmask
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldSet(u64);

impl FieldSet {
    fn contains(self, value: u32) -> bool {
        self.0 & (1u64 << value) != 0
    }
}

/// A parsed cron schedule
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    minutes: FieldSet,
    hours: FieldSet,
    days_of_month: FieldSet,
    months: FieldSet,
    days_of_week: FieldSet,
    /// Whether day-of-month / day-of-week were given as something other than `*`
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronSchedule {
    /// Parse a five-field cron expression
    pub fn parse(expression: &str) -> Result<Self, CronError> {
        let error = |reason: String| CronError {
            expression: expression.to_string(),
            reason,
        };

        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(error(format!("expected 5 fields, found {}", fields.len())));
        }

        let minutes = parse_field(fields[0], Field::Minute).map_err(error)?;
        let hours = parse_field(fields[1], Field::Hour).map_err(error)?;
        let days_of_month = parse_field(fields[2], Field::DayOfMonth).map_err(error)?;
        let months = parse_field(fields[3], Field::Month).map_err(error)?;
        let mut days_of_week = parse_field(fields[4], Field::DayOfWeek).map_err(error)?;

        if days_of_week.contains(7) {
            days_of_week = FieldSet((days_of_week.0 | 1) & !(1u64 << 7));
        }

        Ok(Self {
            expression: fields.join(" "),
            minutes,
            hours,
            days_of_month,
            months,
            days_of_week,
            dom_restricted: !fields[2].starts_with('*'),
            dow_restricted: !fields[4].starts_with('*'),
        })
    }

    /// The normalized expression text
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Check whether the given instant falls on a scheduled minute
    pub fn matches(&self, at: &DateTime<Utc>) -> bool {
        self.minutes.contains(at.minute())
            && self.hours.contains(at.hour())
            && self.months.contains(at.month())
            && self.day_matches(at)
    }

    /// Find the first scheduled minute strictly after `after`
    pub fn next_after(&self, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = after.duration_trunc(Duration::minutes(1)).ok()? + Duration::minutes(1);
        let horizon = start.year() + SEARCH_HORIZON_YEARS;
        let mut candidate = start;

        while candidate.year() <= horizon {
            if !self.months.contains(candidate.month()) {
                candidate = first_of_next_month(&candidate)?;
                continue;
            }
            if !self.day_matches(&candidate) {
                candidate = start_of_day(&candidate)? + Duration::days(1);
                continue;
            }
            if !self.hours.contains(candidate.hour()) {
                candidate = candidate.duration_trunc(Duration::hours(1)).ok()? + Duration::hours(1);
                continue;
            }
            if !self.minutes.contains(candidate.minute()) {
                candidate += Duration::minutes(1);
                continue;
            }
            return Some(candidate);
        }

        None
    }

    fn day_matches(&self, at: &DateTime<Utc>) -> bool {
        let dom = self.days_of_month.contains(at.day());
        let dow = self.days_of_week.contains(at.weekday().num_days_from_sunday());

        // Classic cron: when both day fields are restricted, either may match
        if self.dom_restricted && self.dow_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }
}

impl FromStr for CronSchedule {
    type Err = CronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

impl PartialEq for CronSchedule {
    fn eq(&self, other: &Self) -> bool {
        self.expression == other.expression
    }
}

impl Serialize for CronSchedule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.expression)
    }
}

fn parse_field(text: &str, field: Field) -> Result<FieldSet, String> {
    let (min, max) = field.bounds();
    let mut mask = 0u64;

    for item in text.split(',') {
        if item.is_empty() {
            return Err(format!("empty list item in {} field", field.name()));
        }

        let (range, step) = match item.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| format!("invalid step '{}' in {} field", step, field.name()))?;
                if step == 0 {
                    return Err(format!("step must be positive in {} field", field.name()));
                }
                (range, step)
            }
            None => (item, 1),
        };

        let (start, end) = if range == "*" {
            (min, max)
        } else if let Some((lo, hi)) = range.split_once('-') {
            (parse_value(lo, field)?, parse_value(hi, field)?)
        } else {
            let value = parse_value(range, field)?;
            // `5/15` means "from 5 to the end, every 15"
            if item.contains('/') {
                (value, max)
            } else {
                (value, value)
            }
        };

        if start > end {
            return Err(format!(
                "range {}-{} is reversed in {} field",
                start,
                end,
                field.name()
            ));
        }

        let mut value = start;
        while value <= end {
            mask |= 1u64 << value;
            value += step;
        }
    }

    Ok(FieldSet(mask))
}

fn parse_value(text: &str, field: Field) -> Result<u32, String> {
    let (min, max) = field.bounds();

    let value = match text.parse::<u32>() {
        Ok(value) => value,
        Err(_) => {
            let upper = text.to_ascii_uppercase();
            field
                .names()
                .and_then(|(names, offset)| {
                    names
                        .iter()
                        .position(|name| *name == upper)
                        .map(|idx| idx as u32 + offset)
                })
                .ok_or_else(|| format!("invalid value '{}' in {} field", text, field.name()))?
        }
    };

    if value < min || value > max {
        return Err(format!(
            "value {} out of range {}-{} in {} field",
            value,
            min,
            max,
            field.name()
        ));
    }

    Ok(value)
}

fn start_of_day(at: &DateTime<Utc>) -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(at.year(), at.month(), at.day(), 0, 0, 0)
        .single()
}

fn first_of_next_month(at: &DateTime<Utc>) -> Option<DateTime<Utc>> {
    let (year, month) = if at.month() == 12 {
        (at.year() + 1, 1)
    } else {
        (at.year(), at.month() + 1)
    };
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single()
}
