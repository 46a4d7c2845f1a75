//! Wall-clock access and timezone-local calendar arithmetic.
//!
//! Everything that decides "which day is it for this user" goes through
//! here. Day boundaries are computed on the local wall-clock date, never by
//! dividing elapsed hours, so a 23- or 25-hour DST day still counts as one
//! calendar day.

use std::sync::Mutex;

use chrono::{DateTime, Days, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{CoreError, Result};

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Reads the operating system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Used by tests and simulations.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Start at an RFC 3339 timestamp.
    pub fn at(rfc3339: &str) -> Result<Self, chrono::ParseError> {
        let now = DateTime::parse_from_rfc3339(rfc3339)?.with_timezone(&Utc);
        Ok(Self::new(now))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|p| p.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Validate an IANA zone identifier.
///
/// # Errors
/// Returns [`CoreError::InvalidTimezone`] when the identifier is unknown.
pub fn parse_timezone(id: &str) -> Result<Tz> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidTimezone(id.to_string()));
    }
    trimmed
        .parse::<Tz>()
        .map_err(|_| CoreError::InvalidTimezone(id.to_string()))
}

/// The calendar date of `instant` as observed in `tz`.
pub fn today(tz: Tz, instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

/// Whole calendar days from `earlier` to `later`. Negative if `later` comes first.
pub fn calendar_days_between(earlier: NaiveDate, later: NaiveDate) -> i64 {
    (later - earlier).num_days()
}

/// The instant at which `date` begins in `tz`.
///
/// A few zones skip local midnight on their DST switch; the day then begins
/// at the first wall-clock minute that exists.
pub fn start_of_day(tz: Tz, date: NaiveDate) -> DateTime<Utc> {
    resolve_local(tz, date.and_time(NaiveTime::MIN))
}

/// Milliseconds from `instant` until the next local midnight strictly after it.
pub fn millis_until_next_midnight(tz: Tz, instant: DateTime<Utc>) -> u64 {
    let Some(tomorrow) = today(tz, instant).checked_add_days(Days::new(1)) else {
        return Duration::days(1).num_milliseconds() as u64;
    };
    let next = start_of_day(tz, tomorrow);
    (next - instant).num_milliseconds().max(0) as u64
}

/// The same local wall-clock time `days` calendar days later in `tz`.
pub fn shift_local_days(tz: Tz, instant: DateTime<Utc>, days: u64) -> DateTime<Utc> {
    let local = instant.with_timezone(&tz);
    match local.date_naive().checked_add_days(Days::new(days)) {
        Some(date) => resolve_local(tz, date.and_time(local.time())),
        None => instant + Duration::days(days as i64),
    }
}

fn resolve_local(tz: Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            // Gaps are at most a few hours; walk forward to the first valid minute.
            let mut candidate = naive;
            for _ in 0..(24 * 60) {
                candidate += Duration::minutes(1);
                if let Some(dt) = tz.from_local_datetime(&candidate).earliest() {
                    return dt.with_timezone(&Utc);
                }
            }
            naive.and_utc()
        }
    }
}
