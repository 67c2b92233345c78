// libs/appointment-cell/src/services/lifecycle.rs
use std::fmt;

use tracing::{debug, warn};

use crate::models::{AppointmentError, AppointmentStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppointmentAction {
    Cancel,
    Reschedule,
    Delete,
}

impl AppointmentAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentAction::Cancel => "cancel",
            AppointmentAction::Reschedule => "reschedule",
            AppointmentAction::Delete => "delete",
        }
    }
}

impl fmt::Display for AppointmentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Appointment state machine:
///
/// ```text
/// pending | confirmed | rescheduled --cancel-->     cancelled
/// pending | confirmed | rescheduled --reschedule--> rescheduled
/// cancelled                         --delete-->     (removed)
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that `action` is allowed from `current_status`.
    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        action: AppointmentAction,
    ) -> Result<(), AppointmentError> {
        debug!("Validating {} from {}", action, current_status);

        if !self.get_valid_transitions(current_status).contains(&action) {
            warn!("Invalid status transition attempted: {} on {}", action, current_status);
            return Err(AppointmentError::InvalidStatusTransition {
                from: current_status,
                action: action.as_str(),
            });
        }

        Ok(())
    }

    pub fn get_valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentAction> {
        match current_status {
            AppointmentStatus::Pending | AppointmentStatus::Confirmed | AppointmentStatus::Rescheduled => {
                vec![AppointmentAction::Cancel, AppointmentAction::Reschedule]
            }
            AppointmentStatus::Cancelled => vec![AppointmentAction::Delete],
        }
    }

    /// Status after `action` succeeds; `None` when the row is removed.
    pub fn resulting_status(&self, action: AppointmentAction) -> Option<AppointmentStatus> {
        match action {
            AppointmentAction::Cancel => Some(AppointmentStatus::Cancelled),
            AppointmentAction::Reschedule => Some(AppointmentStatus::Rescheduled),
            AppointmentAction::Delete => None,
        }
    }
}
