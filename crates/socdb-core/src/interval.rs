//! Splitting a date range into bounded, contiguous work units.
//!
//! Large hashtag ranges are collected one interval at a time so a single
//! backend call never has to cover more than `size` units of history.

use std::str::FromStr;

use chrono::{DateTime, Duration, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntervalError {
    #[error("start {start} must be before end {end}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("unsupported interval unit '{0}'; expected days, months, or years")]
    UnsupportedUnit(String),

    #[error("interval size must be at least 1")]
    InvalidSize,

    #[error("unrecognised date '{0}'; expected YYYY-MM-DD, YYYY-MM, or YYYY")]
    InvalidDate(String),
}

/// Unit used to step through a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    /// Fixed 24-hour steps.
    Days,
    /// Calendar months; a day past the end of the target month clamps to its last day.
    Months,
    /// Calendar years (twelve calendar months).
    Years,
}

impl FromStr for TimeUnit {
    type Err = IntervalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" | "days" => Ok(TimeUnit::Days),
            "month" | "months" => Ok(TimeUnit::Months),
            "year" | "years" => Ok(TimeUnit::Years),
            other => Err(IntervalError::UnsupportedUnit(other.to_string())),
        }
    }
}

impl std::fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeUnit::Days => write!(f, "days"),
            TimeUnit::Months => write!(f, "months"),
            TimeUnit::Years => write!(f, "years"),
        }
    }
}

/// Half-open `[start, end)` span of time. `start < end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeInterval {
    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    /// `YYYYMMDD_YYYYMMDD`, used to label per-interval ledger entries.
    #[must_use]
    pub fn compact_label(&self) -> String {
        format!(
            "{}_{}",
            self.start.format("%Y%m%d"),
            self.end.format("%Y%m%d")
        )
    }
}

impl std::fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ~ {}",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

/// Split `[start, end)` into consecutive intervals of `size` units each.
///
/// The first interval starts at `start`, the last ends exactly at `end`, and
/// every interval ends where the next begins. Only the final interval can be
/// shorter than `size` units.
///
/// # Errors
///
/// Returns [`IntervalError::InvalidRange`] when `start >= end` and
/// [`IntervalError::InvalidSize`] when `size` is zero.
pub fn split_range(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    unit: TimeUnit,
    size: u32,
) -> Result<Vec<TimeInterval>, IntervalError> {
    if start >= end {
        return Err(IntervalError::InvalidRange { start, end });
    }
    if size == 0 {
        return Err(IntervalError::InvalidSize);
    }

    let mut intervals = Vec::new();
    let mut cursor = start;

    while cursor < end {
        // Overflowing the calendar means the boundary is past `end` anyway.
        let boundary = step(cursor, unit, size).map_or(end, |b| b.min(end));
        intervals.push(TimeInterval {
            start: cursor,
            end: boundary,
        });
        cursor = boundary;
    }

    Ok(intervals)
}

fn step(from: DateTime<Utc>, unit: TimeUnit, size: u32) -> Option<DateTime<Utc>> {
    match unit {
        TimeUnit::Days => from.checked_add_signed(Duration::days(i64::from(size))),
        TimeUnit::Months => from.checked_add_months(Months::new(size)),
        TimeUnit::Years => from.checked_add_months(Months::new(size.checked_mul(12)?)),
    }
}

/// Parse a calendar date into UTC midnight.
///
/// Accepts `YYYY-MM-DD`, `YYYY/MM/DD`, `YYYY-MM`, `YYYY/MM`, and `YYYY`;
/// partial dates resolve to the first day of the month or year.
///
/// # Errors
///
/// Returns [`IntervalError::InvalidDate`] for anything else.
pub fn parse_date(raw: &str) -> Result<DateTime<Utc>, IntervalError> {
    let trimmed = raw.trim();
    let invalid = || IntervalError::InvalidDate(trimmed.to_string());

    let separator = if trimmed.contains('/') { '/' } else { '-' };
    let parts: Vec<&str> = trimmed.split(separator).collect();
    if parts
        .iter()
        .any(|p| p.is_empty() || !p.chars().all(|c| c.is_ascii_digit()))
    {
        return Err(invalid());
    }

    let number = |s: &str| s.parse::<u32>().map_err(|_| invalid());
    let (year, month, day) = match parts.as_slice() {
        [y] if y.len() == 4 => (number(y)?, 1, 1),
        [y, m] if y.len() == 4 => (number(y)?, number(m)?, 1),
        [y, m, d] if y.len() == 4 => (number(y)?, number(m)?, number(d)?),
        _ => return Err(invalid()),
    };

    let year = i32::try_from(year).map_err(|_| invalid())?;
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(invalid)
}

#[cfg(test)]
#[path = "interval_test.rs"]
mod tests;
