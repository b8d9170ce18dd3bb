//! Cycle dates: `YYYYMMDDHH` labels and inclusive hourly sequences.

use crate::error::{CycleError, Result};
use crate::paths::NO_PREVIOUS_CYCLE;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;

pub const DATE_FORMAT: &str = "%Y%m%d%H";

/// Parse a `YYYYMMDDHH` label into an on-the-hour timestamp.
pub fn parse_date(label: &str) -> Result<NaiveDateTime> {
    let invalid = || CycleError::InvalidDate(label.to_string());
    if label.len() != 10 || !label.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let day = NaiveDate::parse_from_str(&label[..8], "%Y%m%d").map_err(|_| invalid())?;
    let hour: u32 = label[8..].parse().map_err(|_| invalid())?;
    day.and_hms_opt(hour, 0, 0).ok_or_else(invalid)
}

pub fn format_date(date: &NaiveDateTime) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Every `interval_hours` from `start` up to and including `end`.
///
/// When the interval does not divide the span the sequence stops at the
/// last step not past `end`.
pub fn cycle_dates(
    start: NaiveDateTime,
    end: NaiveDateTime,
    interval_hours: u32,
) -> Result<Vec<NaiveDateTime>> {
    if interval_hours == 0 {
        return Err(CycleError::InvalidRange(
            "interval must be at least one hour".to_string(),
        ));
    }
    if start > end {
        return Err(CycleError::InvalidRange(format!(
            "start {} is after end {}",
            format_date(&start),
            format_date(&end)
        )));
    }
    let step = Duration::hours(i64::from(interval_hours));
    let mut dates = Vec::new();
    let mut current = start;
    while current <= end {
        dates.push(current);
        current += step;
    }
    Ok(dates)
}

/// Parse the three command-line arguments into a cycle-date sequence.
pub fn parse_range(start: &str, end: &str, interval_hours: u32) -> Result<Vec<NaiveDateTime>> {
    cycle_dates(parse_date(start)?, parse_date(end)?, interval_hours)
}

/// One assimilation timestep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cycle {
    #[serde(skip)]
    pub date: NaiveDateTime,
    pub date_str: String,
    #[serde(serialize_with = "serialize_prev_label")]
    pub prev_date_str: Option<String>,
}

fn serialize_prev_label<S: serde::Serializer>(prev: &Option<String>, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(prev.as_deref().unwrap_or(NO_PREVIOUS_CYCLE))
}

impl Cycle {
    pub fn new(date: NaiveDateTime, prev_date_str: Option<String>) -> Self {
        Self {
            date_str: format_date(&date),
            date,
            prev_date_str,
        }
    }

    /// Label of the previous processed cycle, `"none"` on the first.
    pub fn prev_label(&self) -> &str {
        self.prev_date_str.as_deref().unwrap_or(NO_PREVIOUS_CYCLE)
    }
}
