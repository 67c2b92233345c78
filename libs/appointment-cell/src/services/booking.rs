// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use doctor_cell::models::weekday_name;
use doctor_cell::{is_on_slot_grid, Doctor};
use notification_cell::{AppointmentContext, SideEffectWriter};
use shared_models::auth::User;
use shared_utils::timezone::{format_in_timezone, is_in_past, resolve_user_timezone};

use crate::models::{
    truncate_to_seconds, AppointmentError, AppointmentOutcome, AppointmentStatus, AppointmentSummary,
    BookAppointmentRequest, NewAppointment, DEFAULT_APPOINTMENT_TITLE,
};
use crate::runtime::SchedulingRuntime;
use crate::services::conflict::ConflictDetectionService;
use crate::store::SchedulingStores;

/// Rejects instants at or before `now`.
pub(crate) fn ensure_future(datetime: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), AppointmentError> {
    if is_in_past(datetime, now) {
        return Err(AppointmentError::InvalidTime(format!(
            "{} is not in the future",
            datetime.to_rfc3339()
        )));
    }
    Ok(())
}

/// Checks that `datetime` is a working day for the doctor and starts one of
/// the doctor's slots, both judged in the doctor's schedule zone.
pub(crate) fn ensure_on_schedule(
    doctor: &Doctor,
    datetime: DateTime<Utc>,
    patient_tz: Tz,
) -> Result<(), AppointmentError> {
    let schedule_tz = doctor.schedule_timezone(patient_tz);
    let local = datetime.with_timezone(&schedule_tz);
    let date = local.date_naive();

    if !doctor.is_available_on(date.weekday()) {
        return Err(AppointmentError::DoctorNotAvailable(format!(
            "{} does not see patients on {}",
            doctor.name,
            weekday_name(date.weekday())
        )));
    }

    if !is_on_slot_grid(doctor, date, schedule_tz, datetime)? {
        return Err(AppointmentError::InvalidTime(format!(
            "{} is not one of {}'s slots",
            format_in_timezone(datetime, schedule_tz, "%Y-%m-%d %H:%M %Z"),
            doctor.name
        )));
    }

    Ok(())
}

pub struct AppointmentBookingService {
    stores: SchedulingStores,
    runtime: Arc<SchedulingRuntime>,
    conflict_service: ConflictDetectionService,
    side_effects: SideEffectWriter,
}

impl AppointmentBookingService {
    pub fn new(stores: SchedulingStores, runtime: Arc<SchedulingRuntime>) -> Self {
        let conflict_service = ConflictDetectionService::new(Arc::clone(&stores.appointments));
        let side_effects = SideEffectWriter::new(
            Arc::clone(&stores.notifications),
            Arc::clone(&stores.reminders),
            Arc::clone(&runtime.clock),
        );

        Self {
            stores,
            runtime,
            conflict_service,
            side_effects,
        }
    }

    /// Books `request.datetime` with `request.doctor_id` for `user`.
    ///
    /// Validation and the conflict re-check happen before anything is
    /// written. A slot taken in between (by the re-check or by the store's
    /// overlap constraint) is reported as `SlotNotAvailable`; the caller
    /// should refresh availability and pick again.
    pub async fn book_appointment(
        &self,
        user: &User,
        request: BookAppointmentRequest,
    ) -> Result<AppointmentOutcome, AppointmentError> {
        info!("Booking appointment for patient {} with doctor {}", user.id, request.doctor_id);

        // **Step 1: One submission per patient at a time**
        let _permit = self.runtime.in_flight.try_acquire(&user.id)?;

        // **Step 2: Resolve the patient's zone**
        let patient_tz = resolve_user_timezone(
            request.timezone.as_deref().or(user.preferred_timezone()),
            &self.runtime.default_timezone,
        );
        let datetime = truncate_to_seconds(request.datetime);

        // **Step 3: Slot must be in the future**
        ensure_future(datetime, self.runtime.clock.now())?;

        // **Step 4: Doctor must exist**
        let doctor = self
            .stores
            .doctors
            .get_doctor(&request.doctor_id)
            .await?
            .ok_or_else(|| AppointmentError::DoctorNotFound(request.doctor_id.clone()))?;

        // **Step 5: Working day and slot grid**
        ensure_on_schedule(&doctor, datetime, patient_tz)?;

        // **Step 6: Re-check for conflicts**
        self.conflict_service
            .ensure_slot_free(&doctor.id, datetime, doctor.slot_duration_minutes, None)
            .await?;

        // **Step 7: Create the appointment**
        let new_appointment = NewAppointment {
            user_id: user.id.clone(),
            doctor_id: doctor.id.clone(),
            datetime,
            notes: request.notes.filter(|n| !n.trim().is_empty()),
            status: AppointmentStatus::Pending,
            title: request
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_APPOINTMENT_TITLE.to_string()),
            duration: doctor.slot_duration_minutes.to_string(),
        };

        let appointment = match self.stores.appointments.insert_appointment(&new_appointment).await {
            Ok(appointment) => appointment,
            Err(AppointmentError::SlotNotAvailable) => {
                warn!("Slot {} with doctor {} was taken during booking", datetime, doctor.id);
                return Err(AppointmentError::SlotNotAvailable);
            }
            Err(e) => return Err(e),
        };

        info!("Appointment {} booked for patient {} at {}", appointment.id, user.id, appointment.datetime);

        // **Step 8: Notification and reminder**
        let side_effects = self
            .side_effects
            .on_booked(&AppointmentContext {
                appointment_id: appointment.id.clone(),
                user_id: user.id.clone(),
                doctor_name: Some(doctor.name.clone()),
                datetime: appointment.datetime,
                timezone: patient_tz,
            })
            .await;

        Ok(AppointmentOutcome { appointment, side_effects })
    }

    /// The patient's appointments, newest first, each with its category.
    pub async fn list_patient_appointments(&self, user: &User) -> Result<Vec<AppointmentSummary>, AppointmentError> {
        let now = self.runtime.clock.now();
        let appointments = self.stores.appointments.list_for_patient(&user.id).await?;
        debug!("Found {} appointments for patient {}", appointments.len(), user.id);

        Ok(appointments
            .into_iter()
            .map(|appointment| AppointmentSummary {
                category: appointment.category(now),
                appointment,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use doctor_cell::WorkingHours;

    fn utc(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).unwrap().with_timezone(&Utc)
    }

    fn doctor(timezone: Option<&str>) -> Doctor {
        Doctor {
            id: "doctor-1".to_string(),
            name: "Dr. Ada Smith".to_string(),
            specialty: "General Practice".to_string(),
            available_days: vec!["Monday".to_string()],
            working_hours: WorkingHours::new("09:00", "17:00"),
            slot_duration_minutes: 30,
            timezone: timezone.map(str::to_string),
            profile_image_url: None,
            location: None,
            bio: None,
        }
    }

    #[test]
    fn now_is_not_in_the_future() {
        let now = utc("2024-01-08T10:00:00Z");
        assert_matches!(ensure_future(now, now), Err(AppointmentError::InvalidTime(_)));
        assert!(ensure_future(utc("2024-01-08T10:00:01Z"), now).is_ok());
    }

    #[test]
    fn schedule_checks_use_the_doctors_zone() {
        let doctor = doctor(Some("America/New_York"));

        // 09:00 New York on a Monday.
        assert!(ensure_on_schedule(&doctor, utc("2024-01-08T14:00:00Z"), Tz::UTC).is_ok());
        // 09:00 UTC is 04:00 in New York.
        assert_matches!(
            ensure_on_schedule(&doctor, utc("2024-01-08T09:00:00Z"), Tz::UTC),
            Err(AppointmentError::InvalidTime(_))
        );
    }

    #[test]
    fn off_grid_and_non_working_days_are_rejected() {
        let doctor = doctor(None);
        assert_matches!(
            ensure_on_schedule(&doctor, utc("2024-01-08T09:10:00Z"), Tz::UTC),
            Err(AppointmentError::InvalidTime(_))
        );
        assert_matches!(
            ensure_on_schedule(&doctor, utc("2024-01-09T09:00:00Z"), Tz::UTC),
            Err(AppointmentError::DoctorNotAvailable(_))
        );
    }
}
