// libs/appointment-cell/src/models.rs
use std::fmt;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use doctor_cell::DoctorError;
use notification_cell::SideEffectReport;
use shared_models::error::AppError;
use shared_utils::timezone::{TimezoneError, TimezoneInfo};

pub const DEFAULT_APPOINTMENT_DURATION_MINUTES: i64 = 30;
/// Longest stored duration taken at face value; the conflict lookback relies
/// on appointments fitting in one day.
pub const MAX_APPOINTMENT_DURATION_MINUTES: i64 = 24 * 60;
pub const DEFAULT_APPOINTMENT_TITLE: &str = "Consultation";

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: String,
    /// The patient.
    pub user_id: String,
    pub doctor_id: String,
    #[serde(deserialize_with = "deserialize_instant")]
    pub datetime: DateTime<Utc>,
    pub status: AppointmentStatus,
    #[serde(
        rename = "duration",
        default = "default_duration",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub duration_minutes: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Appointment {
    pub fn end(&self) -> DateTime<Utc> {
        interval_end(self.datetime, self.duration_minutes)
    }

    /// Non-cancelled appointments hold their interval.
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn category(&self, now: DateTime<Utc>) -> AppointmentCategory {
        if self.status == AppointmentStatus::Cancelled {
            AppointmentCategory::Cancelled
        } else if self.datetime > now {
            AppointmentCategory::Upcoming
        } else {
            AppointmentCategory::Past
        }
    }
}

/// `start + minutes`, saturating at the latest representable instant.
pub fn interval_end(start: DateTime<Utc>, minutes: i64) -> DateTime<Utc> {
    Duration::try_minutes(minutes)
        .and_then(|length| start.checked_add_signed(length))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Instants are kept to the second.
pub fn truncate_to_seconds(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant.trunc_subsecs(0)
}

fn deserialize_instant<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    DateTime::<Utc>::deserialize(deserializer).map(truncate_to_seconds)
}

fn default_duration() -> i64 {
    DEFAULT_APPOINTMENT_DURATION_MINUTES
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredDuration {
    Number(i64),
    Text(String),
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let minutes = match Option::<StoredDuration>::deserialize(deserializer)? {
        Some(StoredDuration::Number(minutes)) => Some(minutes),
        Some(StoredDuration::Text(text)) => text.trim().parse().ok(),
        None => None,
    };
    Ok(minutes
        .filter(|m| (1..=MAX_APPOINTMENT_DURATION_MINUTES).contains(m))
        .unwrap_or(DEFAULT_APPOINTMENT_DURATION_MINUTES))
}

fn serialize_duration<S>(minutes: &i64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&minutes.to_string())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Rescheduled,
    Cancelled,
}

impl AppointmentStatus {
    pub const ACTIVE: [AppointmentStatus; 3] = [
        AppointmentStatus::Pending,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Rescheduled,
    ];

    pub fn is_active(&self) -> bool {
        *self != AppointmentStatus::Cancelled
    }

    /// `in.(pending,confirmed,rescheduled)`
    pub fn active_filter() -> String {
        let statuses: Vec<String> = Self::ACTIVE.iter().map(|s| s.to_string()).collect();
        format!("in.({})", statuses.join(","))
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Rescheduled => write!(f, "rescheduled"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentCategory {
    Upcoming,
    Past,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppointmentSummary {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub category: AppointmentCategory,
}

/// Insert payload for a new booking.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewAppointment {
    pub user_id: String,
    pub doctor_id: String,
    pub datetime: DateTime<Utc>,
    pub notes: Option<String>,
    pub status: AppointmentStatus,
    pub title: String,
    /// Minutes, string-encoded like the stored column.
    pub duration: String,
}

// ==============================================================================
// SLOTS
// ==============================================================================

/// A bookable interval derived from the doctor's schedule. Never persisted.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Slot {
    /// Start in the caller's zone.
    pub local_start: DateTime<FixedOffset>,
    pub utc_start: DateTime<Utc>,
    pub duration_minutes: i64,
    pub booked: bool,
    pub past: bool,
    pub available: bool,
}

impl Slot {
    pub fn end(&self) -> DateTime<Utc> {
        interval_end(self.utc_start, self.duration_minutes)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DayAvailability {
    pub doctor_id: String,
    pub doctor_name: String,
    pub date: NaiveDate,
    /// Zone `local_start` is expressed in.
    pub timezone: String,
    /// Offset and abbreviation of `timezone` at the start of `date`.
    pub zone: TimezoneInfo,
    /// Zone the doctor's working hours are read in.
    pub schedule_timezone: String,
    pub slot_duration_minutes: i64,
    pub available_count: usize,
    pub slots: Vec<Slot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpcomingAvailability {
    pub doctor_id: String,
    pub doctor_name: String,
    pub timezone: String,
    /// Offset and abbreviation of `timezone` right now.
    pub zone: TimezoneInfo,
    pub days: Vec<DayAvailability>,
}

// ==============================================================================
// REQUEST / RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct BookAppointmentRequest {
    pub doctor_id: String,
    pub datetime: DateTime<Utc>,
    pub notes: Option<String>,
    pub title: Option<String>,
    /// Zone used for the confirmation text; defaults to the configured zone.
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub datetime: DateTime<Utc>,
    pub timezone: Option<String>,
}

/// Result of a mutation plus what happened to its secondary writes.
#[derive(Debug, Clone, Serialize)]
pub struct AppointmentOutcome {
    pub appointment: Appointment,
    pub side_effects: SideEffectReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeletionOutcome {
    pub appointment_id: String,
    pub side_effects: SideEffectReport,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Slot no longer available")]
    SlotNotAvailable,

    #[error("Doctor not found: {0}")]
    DoctorNotFound(String),

    #[error("Doctor not available at requested time: {0}")]
    DoctorNotAvailable(String),

    #[error("Invalid appointment time: {0}")]
    InvalidTime(String),

    #[error("Cannot {action} an appointment that is {from}")]
    InvalidStatusTransition { from: AppointmentStatus, action: &'static str },

    #[error("Unauthorized access to appointment")]
    Unauthorized,

    #[error("Another booking request is still in progress")]
    BookingInProgress,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error(transparent)]
    Timezone(#[from] TimezoneError),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<DoctorError> for AppointmentError {
    fn from(err: DoctorError) -> Self {
        match err {
            DoctorError::NotFound(id) => AppointmentError::DoctorNotFound(id),
            DoctorError::Timezone(e) => AppointmentError::Timezone(e),
            DoctorError::DatabaseError(msg) => AppointmentError::DatabaseError(msg),
            other => AppointmentError::ValidationError(other.to_string()),
        }
    }
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::NotFound | AppointmentError::DoctorNotFound(_) => AppError::NotFound(err.to_string()),
            AppointmentError::SlotNotAvailable | AppointmentError::InvalidStatusTransition { .. } => {
                AppError::Conflict(err.to_string())
            }
            AppointmentError::DoctorNotAvailable(_)
            | AppointmentError::InvalidTime(_)
            | AppointmentError::ValidationError(_)
            | AppointmentError::Timezone(_) => AppError::ValidationError(err.to_string()),
            AppointmentError::Unauthorized => AppError::Forbidden(err.to_string()),
            AppointmentError::BookingInProgress => AppError::TooManyRequests(err.to_string()),
            AppointmentError::DatabaseError(msg) => AppError::ExternalService(msg),
        }
    }
}
