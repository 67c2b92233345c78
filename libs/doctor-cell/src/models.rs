// libs/doctor-cell/src/models.rs
use chrono::{Duration, NaiveTime, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::warn;

use shared_models::error::AppError;
use shared_utils::timezone::{parse_timezone, parse_wall_clock_time, TimezoneError};

pub const DEFAULT_SLOT_DURATION_MINUTES: i64 = 30;
/// A slot never spans more than one day.
pub const MAX_SLOT_DURATION_MINUTES: i64 = 24 * 60;
pub const DEFAULT_WORKDAY_START: &str = "09:00";
pub const DEFAULT_WORKDAY_END: &str = "17:00";

// ==============================================================================
// DOCTOR
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub specialty: String,
    /// Weekday names, e.g. `["Monday", "Wednesday"]`.
    #[serde(default)]
    pub available_days: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_working_hours")]
    pub working_hours: WorkingHours,
    #[serde(
        default = "default_slot_duration",
        deserialize_with = "deserialize_slot_duration"
    )]
    pub slot_duration_minutes: i64,
    #[serde(default)]
    pub timezone: Option<String>,
    /// Object storage key or absolute URL.
    #[serde(default)]
    pub profile_image_url: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

impl Doctor {
    /// Case-insensitive; full names and three-letter abbreviations both match.
    pub fn is_available_on(&self, weekday: Weekday) -> bool {
        let full = weekday_name(weekday);
        let short = &full[..3];
        self.available_days.iter().any(|day| {
            let day = day.trim();
            day.eq_ignore_ascii_case(full) || day.eq_ignore_ascii_case(short)
        })
    }

    /// The doctor's own zone when it is set and valid, otherwise the caller's.
    pub fn schedule_timezone(&self, caller_tz: Tz) -> Tz {
        match self.timezone.as_deref().filter(|tz| !tz.trim().is_empty()) {
            Some(name) => parse_timezone(name).unwrap_or_else(|_| {
                warn!("Doctor {} has unknown timezone '{}', using {}", self.id, name, caller_tz);
                caller_tz
            }),
            None => caller_tz,
        }
    }
}

/// Slot length as a `Duration`, for `1..=MAX_SLOT_DURATION_MINUTES` minutes.
pub fn slot_length(minutes: i64) -> Result<Duration, DoctorError> {
    if !(1..=MAX_SLOT_DURATION_MINUTES).contains(&minutes) {
        return Err(DoctorError::InvalidSlotDuration(minutes));
    }
    Duration::try_minutes(minutes).ok_or(DoctorError::InvalidSlotDuration(minutes))
}

pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Doctor as served to the portal, with the profile image resolved to a URL.
#[derive(Debug, Clone, Serialize)]
pub struct DoctorProfile {
    #[serde(flatten)]
    pub doctor: Doctor,
    pub image_url: Option<String>,
}

// ==============================================================================
// WORKING HOURS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingHours {
    #[serde(default = "default_start")]
    pub start: String,
    #[serde(default = "default_end")]
    pub end: String,
}

impl Default for WorkingHours {
    fn default() -> Self {
        Self {
            start: default_start(),
            end: default_end(),
        }
    }
}

impl WorkingHours {
    pub fn new(start: &str, end: &str) -> Self {
        Self {
            start: start.to_string(),
            end: end.to_string(),
        }
    }

    /// Parsed `(start, end)`. Equal bounds are allowed and yield no slots.
    pub fn bounds(&self) -> Result<(NaiveTime, NaiveTime), DoctorError> {
        let start = parse_wall_clock_time(&self.start)?;
        let end = parse_wall_clock_time(&self.end)?;
        if end < start {
            return Err(DoctorError::InvalidWorkingHours(format!(
                "end {} is before start {}",
                self.end, self.start
            )));
        }
        Ok((start, end))
    }

    fn or_defaults(self) -> Self {
        Self {
            start: if self.start.trim().is_empty() { default_start() } else { self.start },
            end: if self.end.trim().is_empty() { default_end() } else { self.end },
        }
    }
}

fn default_start() -> String {
    DEFAULT_WORKDAY_START.to_string()
}

fn default_end() -> String {
    DEFAULT_WORKDAY_END.to_string()
}

fn default_slot_duration() -> i64 {
    DEFAULT_SLOT_DURATION_MINUTES
}

/// Stored either as a JSON object or as a JSON-encoded string.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredWorkingHours {
    Structured(WorkingHours),
    Encoded(String),
}

fn deserialize_working_hours<'de, D>(deserializer: D) -> Result<WorkingHours, D::Error>
where
    D: Deserializer<'de>,
{
    let stored = Option::<StoredWorkingHours>::deserialize(deserializer)?;
    let hours = match stored {
        None => WorkingHours::default(),
        Some(StoredWorkingHours::Structured(hours)) => hours,
        Some(StoredWorkingHours::Encoded(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!("Unreadable working_hours '{}': {}, using defaults", raw, e);
            WorkingHours::default()
        }),
    };
    Ok(hours.or_defaults())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredDuration {
    Number(i64),
    Text(String),
}

fn deserialize_slot_duration<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let stored = Option::<StoredDuration>::deserialize(deserializer)?;
    Ok(match stored {
        Some(StoredDuration::Number(minutes)) => minutes,
        Some(StoredDuration::Text(text)) => text.trim().parse().unwrap_or(DEFAULT_SLOT_DURATION_MINUTES),
        None => DEFAULT_SLOT_DURATION_MINUTES,
    })
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DoctorError {
    #[error("Doctor not found: {0}")]
    NotFound(String),

    #[error("Invalid working hours: {0}")]
    InvalidWorkingHours(String),

    #[error("Slot duration must be between 1 and 1440 minutes, got {0}")]
    InvalidSlotDuration(i64),

    #[error(transparent)]
    Timezone(#[from] TimezoneError),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<DoctorError> for AppError {
    fn from(err: DoctorError) -> Self {
        match err {
            DoctorError::NotFound(_) => AppError::NotFound(err.to_string()),
            DoctorError::InvalidWorkingHours(_)
            | DoctorError::InvalidSlotDuration(_)
            | DoctorError::Timezone(_) => AppError::ValidationError(err.to_string()),
            DoctorError::DatabaseError(msg) => AppError::ExternalService(msg),
        }
    }
}
