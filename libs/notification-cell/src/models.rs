// libs/notification-cell/src/models.rs
use std::fmt;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use shared_models::error::AppError;

// ==============================================================================
// NOTIFICATIONS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub appointment_id: Option<String>,
    pub title: String,
    pub message: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Insert payload; notifications are write-once apart from `read`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewNotification {
    pub user_id: String,
    pub appointment_id: Option<String>,
    pub title: String,
    pub message: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationFilter {
    #[default]
    All,
    Read,
    Unread,
}

impl NotificationFilter {
    /// PostgREST filter fragment, empty for `All`.
    pub fn query_fragment(&self) -> &'static str {
        match self {
            NotificationFilter::All => "",
            NotificationFilter::Read => "&read=is.true",
            NotificationFilter::Unread => "&read=is.false",
        }
    }

    pub fn matches(&self, notification: &Notification) -> bool {
        match self {
            NotificationFilter::All => true,
            NotificationFilter::Read => notification.read,
            NotificationFilter::Unread => !notification.read,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationPage {
    pub notifications: Vec<Notification>,
    pub total: u64,
    pub has_more: bool,
}

// ==============================================================================
// REMINDERS
// ==============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl fmt::Display for ReminderPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReminderPriority::Low => write!(f, "low"),
            ReminderPriority::Medium => write!(f, "medium"),
            ReminderPriority::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub appointment_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub due_date: DateTime<Utc>,
    #[serde(default)]
    pub priority: ReminderPriority,
    #[serde(default)]
    pub sent: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewReminder {
    pub user_id: String,
    pub appointment_id: Option<String>,
    pub title: String,
    pub description: String,
    pub due_date: DateTime<Utc>,
    pub priority: ReminderPriority,
    pub sent: bool,
    pub created_at: DateTime<Utc>,
}

pub const MAX_REMINDER_TITLE_CHARS: usize = 100;

/// A patient's own reminder, not linked to any appointment.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateReminderRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub due_date: DateTime<Utc>,
    #[serde(default)]
    pub priority: ReminderPriority,
}

/// Partial edit of a reminder. Only the fields present are written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReminderChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<ReminderPriority>,
    /// Set by the service when the due date moves; never taken from clients.
    #[serde(skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub sent: Option<bool>,
}

impl ReminderChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.due_date.is_none() && self.priority.is_none()
    }
}

/// Patch applied to an appointment's existing reminder on reschedule.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReminderUpdate {
    pub title: String,
    pub description: String,
    pub due_date: DateTime<Utc>,
    pub sent: bool,
}

// ==============================================================================
// SIDE EFFECTS
// ==============================================================================

/// What the side-effect writer needs to know about an appointment.
#[derive(Debug, Clone)]
pub struct AppointmentContext {
    pub appointment_id: String,
    pub user_id: String,
    /// `None` when the doctor could not be looked up.
    pub doctor_name: Option<String>,
    pub datetime: DateTime<Utc>,
    /// Zone the patient reads times in.
    pub timezone: Tz,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffectStep {
    DoctorLookup,
    Notification,
    ReminderInsert,
    ReminderUpdate,
    ReminderDelete,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepOutcome {
    pub step: SideEffectStep,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Ordered outcomes of the secondary writes that followed a primary mutation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SideEffectReport {
    pub steps: Vec<StepOutcome>,
}

impl SideEffectReport {
    pub fn succeeded(&mut self, step: SideEffectStep) {
        self.steps.push(StepOutcome { step, succeeded: true, error: None });
    }

    pub fn failed(&mut self, step: SideEffectStep, error: impl fmt::Display) {
        self.steps.push(StepOutcome {
            step,
            succeeded: false,
            error: Some(error.to_string()),
        });
    }

    pub fn record<T, E: fmt::Display>(&mut self, step: SideEffectStep, result: &Result<T, E>) {
        match result {
            Ok(_) => self.succeeded(step),
            Err(e) => self.failed(step, e),
        }
    }

    pub fn merge(&mut self, other: SideEffectReport) {
        self.steps.extend(other.steps);
    }

    pub fn all_succeeded(&self) -> bool {
        self.steps.iter().all(|outcome| outcome.succeeded)
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepOutcome> {
        self.steps.iter().filter(|outcome| !outcome.succeeded)
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NotificationError {
    #[error("Notification not found")]
    NotFound,

    #[error("Reminder not found")]
    ReminderNotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<NotificationError> for AppError {
    fn from(err: NotificationError) -> Self {
        match err {
            NotificationError::NotFound | NotificationError::ReminderNotFound => AppError::NotFound(err.to_string()),
            NotificationError::ValidationError(msg) => AppError::ValidationError(msg),
            NotificationError::DatabaseError(msg) => AppError::ExternalService(msg),
        }
    }
}
