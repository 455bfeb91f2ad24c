//! Calendar-day handling for date-filtered listings and reports.
//!
//! Dates arrive as store-local calendar days; storage holds UTC instants.

use crate::errors::ServiceError;
use chrono::{DateTime, Days, Local, NaiveDate, NaiveTime, TimeZone, Utc};

/// Half-open UTC interval `[start, end)`; either side may be unbounded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Period {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl Period {
    /// Covers whole local days from `start` through `end` inclusive
    pub fn local_days(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self {
            start: start.map(local_midnight),
            end: end.map(|day| local_midnight(day.checked_add_days(Days::new(1)).unwrap_or(day))),
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| instant >= s) && self.end.map_or(true, |e| instant < e)
    }
}

/// UTC instant at which the given local day begins
pub fn local_midnight(day: NaiveDate) -> DateTime<Utc> {
    let naive = day.and_time(NaiveTime::MIN);
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

/// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp (reduced to its local day)
pub fn parse_day(field: &str, raw: &str) -> Result<NaiveDate, ServiceError> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| {
            DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Local).date_naive())
        })
        .map_err(|_| {
            ServiceError::ValidationError(format!("{field} must be a date formatted as YYYY-MM-DD"))
        })
}

/// Parses an optional day parameter, treating blank strings as absent
pub fn parse_optional_day(field: &str, raw: Option<&str>) -> Result<Option<NaiveDate>, ServiceError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse_day(field, value).map(Some),
    }
}
