// libs/appointment-cell/src/services/conflict.rs
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::{debug, warn};

use shared_utils::timezone::is_in_past;

use crate::models::{interval_end, Appointment, AppointmentError, Slot};
use crate::store::AppointmentStore;

/// How far before a slot's end an overlapping appointment can start. Bounds
/// the range query; appointments longer than this are not expected.
pub const CONFLICT_LOOKBACK_HOURS: i64 = 24;

/// Half-open interval intersection of `[s0, s1)` and `[a0, a1)`.
pub fn intervals_overlap(
    s0: DateTime<Utc>,
    s1: DateTime<Utc>,
    a0: DateTime<Utc>,
    a1: DateTime<Utc>,
) -> bool {
    a0 < s1 && s0 < a1
}

fn blocks(appointment: &Appointment, start: DateTime<Utc>, end: DateTime<Utc>, exclude_id: Option<&str>) -> bool {
    appointment.is_active()
        && exclude_id != Some(appointment.id.as_str())
        && intervals_overlap(start, end, appointment.datetime, appointment.end())
}

/// Marks every candidate booked, past, or available. Candidates keep their
/// order; `local_start` is expressed in `display_tz`.
pub fn reconcile(
    candidates: &[DateTime<Tz>],
    slot_duration_minutes: i64,
    existing: &[Appointment],
    exclude_id: Option<&str>,
    now: DateTime<Utc>,
    display_tz: Tz,
) -> Vec<Slot> {
    candidates
        .iter()
        .map(|candidate| {
            let utc_start = candidate.with_timezone(&Utc);
            let utc_end = interval_end(utc_start, slot_duration_minutes);

            let booked = existing.iter().any(|a| blocks(a, utc_start, utc_end, exclude_id));
            let past = is_in_past(utc_start, now);

            Slot {
                local_start: utc_start.with_timezone(&display_tz).fixed_offset(),
                utc_start,
                duration_minutes: slot_duration_minutes,
                booked,
                past,
                available: !booked && !past,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct ConflictCheckResponse {
    pub has_conflict: bool,
    pub conflicting_appointments: Vec<Appointment>,
}

pub struct ConflictDetectionService {
    appointments: Arc<dyn AppointmentStore>,
}

impl ConflictDetectionService {
    pub fn new(appointments: Arc<dyn AppointmentStore>) -> Self {
        Self { appointments }
    }

    /// Active appointments of `doctor_id` overlapping `[start, start + duration)`.
    pub async fn check_conflicts(
        &self,
        doctor_id: &str,
        start: DateTime<Utc>,
        duration_minutes: i64,
        exclude_appointment_id: Option<&str>,
    ) -> Result<ConflictCheckResponse, AppointmentError> {
        let end = interval_end(start, duration_minutes);
        let lookback_from = end - Duration::hours(CONFLICT_LOOKBACK_HOURS);

        debug!(
            "Checking conflicts for doctor {} from {} to {} (excluding {:?})",
            doctor_id, start, end, exclude_appointment_id
        );

        let existing = self
            .appointments
            .find_active_in_range(doctor_id, lookback_from, end, exclude_appointment_id)
            .await?;

        let conflicting_appointments: Vec<Appointment> = existing
            .into_iter()
            .filter(|a| blocks(a, start, end, exclude_appointment_id))
            .collect();

        let has_conflict = !conflicting_appointments.is_empty();
        if has_conflict {
            warn!(
                "Conflict detected for doctor {} at {} - {} conflicting appointments",
                doctor_id,
                start,
                conflicting_appointments.len()
            );
        }

        Ok(ConflictCheckResponse {
            has_conflict,
            conflicting_appointments,
        })
    }

    /// `SlotNotAvailable` when anything active overlaps the slot.
    pub async fn ensure_slot_free(
        &self,
        doctor_id: &str,
        start: DateTime<Utc>,
        duration_minutes: i64,
        exclude_appointment_id: Option<&str>,
    ) -> Result<(), AppointmentError> {
        let response = self
            .check_conflicts(doctor_id, start, duration_minutes, exclude_appointment_id)
            .await?;

        if response.has_conflict {
            return Err(AppointmentError::SlotNotAvailable);
        }
        Ok(())
    }
}
