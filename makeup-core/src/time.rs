//! Time helpers: converting org-local wall times to UTC instants.
//!
//! Every org runs in a single configured IANA timezone. Pure logic never
//! reads a global clock; callers pass `now` and the timezone in.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{EngineError, Result};

/// Parse an IANA timezone name like "Europe/Berlin".
pub fn parse_timezone(tz: &str) -> Result<Tz> {
    tz.parse()
        .map_err(|_| EngineError::validation(format!("invalid timezone: {tz}")))
}

/// Convert an org-local date + wall time to UTC.
///
/// Returns `None` for local times that do not exist (spring-forward gap).
/// Ambiguous times (fall-back hour) take the earlier offset.
pub fn local_to_utc(date: NaiveDate, time: NaiveTime, tz: Tz) -> Option<DateTime<Utc>> {
    let ndt = NaiveDateTime::new(date, time);
    tz.from_local_datetime(&ndt)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// The org-local wall time of a UTC instant.
pub fn local_time_of_day(instant: DateTime<Utc>, tz: Tz) -> NaiveTime {
    instant.with_timezone(&tz).time()
}

/// The org-local calendar date of a UTC instant.
pub fn local_date(instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}
