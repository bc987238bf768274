//! Timestamp encoding at the Store and API boundaries.
//!
//! Everything inside the scheduler is `DateTime<Utc>`; strings crossing a
//! boundary are ISO-8601 with an explicit `Z` offset. Store columns always
//! carry nine fractional digits so that text order matches time order.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

use crate::error::{Result, SchedulerError};

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

pub fn to_iso(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Fixed-width encoding for Store columns, compared as text by `ORDER BY`.
pub fn to_db_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Decode a timestamp written by [`to_iso`] or [`to_db_time`].
pub fn parse_iso(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse a caller-supplied ISO-8601 timestamp.
///
/// Values with an offset are converted to UTC; values without one are read
/// as UTC wall-clock time.
pub fn parse_user_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Some(dt) = parse_iso(raw) {
        return Ok(dt);
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| SchedulerError::InvalidSchedule(format!("invalid datetime: {raw}")))
}
