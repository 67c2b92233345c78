//! Conversions between patient-local wall-clock time and UTC instants.
//!
//! Everything here is pure. "Now" is always passed in by the caller.

use chrono::{
    DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc,
};
use chrono_tz::Tz;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimezoneError {
    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Invalid time '{0}', expected HH:MM")]
    InvalidTime(String),

    #[error("{wall_clock} does not exist in {timezone} (daylight saving gap)")]
    NonexistentLocalTime { wall_clock: NaiveDateTime, timezone: String },
}

/// Half-open `[start_utc, end_utc)` span of one local calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DayBounds {
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
}

impl DayBounds {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start_utc <= instant && instant < self.end_utc
    }

    pub fn length(&self) -> Duration {
        self.end_utc - self.start_utc
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimezoneInfo {
    pub name: String,
    /// `+HH:MM` / `-HH:MM`
    pub offset: String,
    pub abbreviation: String,
}

pub fn parse_timezone(name: &str) -> Result<Tz, TimezoneError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| TimezoneError::UnknownTimezone(name.to_string()))
}

/// The caller's zone: `requested` when it names a real zone, else `fallback`,
/// else UTC. Never fails.
pub fn resolve_user_timezone(requested: Option<&str>, fallback: &str) -> Tz {
    if let Some(name) = requested.filter(|name| !name.trim().is_empty()) {
        match parse_timezone(name) {
            Ok(tz) => return tz,
            Err(_) => warn!("Ignoring unknown timezone '{}', falling back to {}", name, fallback),
        }
    }

    parse_timezone(fallback).unwrap_or_else(|_| {
        warn!("Configured default timezone '{}' is unknown, using UTC", fallback);
        Tz::UTC
    })
}

pub fn to_local(utc: DateTime<Utc>, tz: Tz) -> DateTime<Tz> {
    utc.with_timezone(&tz)
}

/// Wall-clock → instant. A time inside a DST gap is rejected; a time inside a
/// DST fold resolves to the earlier of the two instants.
pub fn to_utc(wall_clock: NaiveDateTime, tz: Tz) -> Result<DateTime<Utc>, TimezoneError> {
    localize(wall_clock, tz).map(|local| local.with_timezone(&Utc))
}

fn localize(wall_clock: NaiveDateTime, tz: Tz) -> Result<DateTime<Tz>, TimezoneError> {
    match tz.from_local_datetime(&wall_clock) {
        LocalResult::Single(local) => Ok(local),
        LocalResult::Ambiguous(earliest, latest) => {
            debug!("{} is ambiguous in {} ({} / {}), using earliest", wall_clock, tz, earliest, latest);
            Ok(earliest)
        }
        LocalResult::None => Err(TimezoneError::NonexistentLocalTime {
            wall_clock,
            timezone: tz.name().to_string(),
        }),
    }
}

/// First instant of `date` in `tz`. Usually midnight; zones that skip
/// midnight start the day at the end of the gap.
fn start_of_day(date: NaiveDate, tz: Tz) -> DateTime<Tz> {
    let mut wall_clock = date.and_time(NaiveTime::MIN);
    loop {
        if let Ok(local) = localize(wall_clock, tz) {
            return local;
        }
        wall_clock += Duration::minutes(15);
    }
}

pub fn day_bounds_utc(date: NaiveDate, tz: Tz) -> DayBounds {
    let start = start_of_day(date, tz);
    let next_date = date.succ_opt().unwrap_or(date);
    let end = if next_date == date {
        start + Duration::days(1)
    } else {
        start_of_day(next_date, tz)
    };

    DayBounds {
        start_utc: start.with_timezone(&Utc),
        end_utc: end.with_timezone(&Utc),
    }
}

pub fn parse_local_date(value: &str) -> Result<NaiveDate, TimezoneError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| TimezoneError::InvalidDate(value.to_string()))
}

/// Accepts `HH:MM` and `HH:MM:SS`.
pub fn parse_wall_clock_time(value: &str) -> Result<NaiveTime, TimezoneError> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| TimezoneError::InvalidTime(value.to_string()))
}

/// `date` at wall-clock `hhmm` in `tz`.
pub fn local_wall_clock(date: NaiveDate, hhmm: &str, tz: Tz) -> Result<DateTime<Tz>, TimezoneError> {
    let time = parse_wall_clock_time(hhmm)?;
    localize(date.and_time(time), tz)
}

/// A slot starting exactly now is already gone.
pub fn is_in_past(instant: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    instant <= now
}

pub fn today_in(tz: Tz, now: DateTime<Utc>) -> NaiveDate {
    to_local(now, tz).date_naive()
}

pub fn format_in_timezone(instant: DateTime<Utc>, tz: Tz, fmt: &str) -> String {
    to_local(instant, tz).format(fmt).to_string()
}

pub fn timezone_info(tz: Tz, now: DateTime<Utc>) -> TimezoneInfo {
    let local = to_local(now, tz);
    let offset_seconds = local.offset().fix().local_minus_utc();
    let sign = if offset_seconds < 0 { '-' } else { '+' };
    let minutes = offset_seconds.abs() / 60;

    TimezoneInfo {
        name: tz.name().to_string(),
        offset: format!("{}{:02}:{:02}", sign, minutes / 60, minutes % 60),
        abbreviation: local.format("%Z").to_string(),
    }
}
