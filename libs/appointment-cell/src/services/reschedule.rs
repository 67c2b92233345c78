use std::sync::Arc;

use chrono_tz::Tz;
use tracing::{info, warn};

use doctor_cell::Doctor;
use notification_cell::{AppointmentContext, SideEffectReport, SideEffectStep, SideEffectWriter};
use shared_models::auth::User;
use shared_utils::timezone::resolve_user_timezone;

use crate::models::{
    truncate_to_seconds, Appointment, AppointmentError, AppointmentOutcome, AppointmentStatus,
    DeletionOutcome, RescheduleAppointmentRequest,
};
use crate::runtime::SchedulingRuntime;
use crate::services::booking::{ensure_future, ensure_on_schedule};
use crate::services::conflict::ConflictDetectionService;
use crate::services::lifecycle::{AppointmentAction, AppointmentLifecycleService};
use crate::store::SchedulingStores;

/// Runs reschedule, cancel and delete as one primary store write followed by
/// best-effort notification and reminder writes.
pub struct AppointmentOrchestrator {
    stores: SchedulingStores,
    runtime: Arc<SchedulingRuntime>,
    conflict_service: ConflictDetectionService,
    lifecycle_service: AppointmentLifecycleService,
    side_effects: SideEffectWriter,
}

impl AppointmentOrchestrator {
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
            lifecycle_service: AppointmentLifecycleService::new(),
            side_effects,
        }
    }

    fn patient_timezone(&self, user: &User, requested: Option<&str>) -> Tz {
        resolve_user_timezone(requested.or(user.preferred_timezone()), &self.runtime.default_timezone)
    }

    /// Loads the appointment and checks it belongs to `user`.
    async fn load_owned(&self, user: &User, appointment_id: &str) -> Result<Appointment, AppointmentError> {
        let appointment = self
            .stores
            .appointments
            .get_appointment(appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound)?;

        if !user.owns(&appointment.user_id) {
            warn!("User {} attempted to modify appointment {} they do not own", user.id, appointment_id);
            return Err(AppointmentError::Unauthorized);
        }

        Ok(appointment)
    }

    /// Doctor for the follow-up messages. A failed lookup is recorded in
    /// `report` instead of failing the operation.
    async fn lookup_doctor(&self, doctor_id: &str, report: &mut SideEffectReport) -> Option<Doctor> {
        match self.stores.doctors.get_doctor(doctor_id).await {
            Ok(Some(doctor)) => {
                report.succeeded(SideEffectStep::DoctorLookup);
                Some(doctor)
            }
            Ok(None) => {
                warn!("Doctor {} not found, messages will not name them", doctor_id);
                report.failed(SideEffectStep::DoctorLookup, format!("doctor {} not found", doctor_id));
                None
            }
            Err(e) => {
                warn!("Doctor lookup for {} failed: {}", doctor_id, e);
                report.failed(SideEffectStep::DoctorLookup, e);
                None
            }
        }
    }

    // ==============================================================================
    // RESCHEDULE
    // ==============================================================================

    /// Moves an active appointment to `request.datetime`. The appointment's
    /// own current interval never counts as a conflict.
    pub async fn reschedule_appointment(
        &self,
        user: &User,
        appointment_id: &str,
        request: RescheduleAppointmentRequest,
    ) -> Result<AppointmentOutcome, AppointmentError> {
        info!("Rescheduling appointment {} for patient {}", appointment_id, user.id);

        // **Step 1: One submission per patient at a time**
        let _permit = self.runtime.in_flight.try_acquire(&user.id)?;

        // **Step 2: Ownership and state**
        let current = self.load_owned(user, appointment_id).await?;
        self.lifecycle_service
            .validate_status_transition(current.status, AppointmentAction::Reschedule)?;

        // **Step 3: New slot must be in the future**
        let patient_tz = self.patient_timezone(user, request.timezone.as_deref());
        let datetime = truncate_to_seconds(request.datetime);
        ensure_future(datetime, self.runtime.clock.now())?;

        // **Step 4: Doctor's schedule (best-effort lookup)**
        let mut report = SideEffectReport::default();
        let doctor = self.lookup_doctor(&current.doctor_id, &mut report).await;
        if let Some(doctor) = &doctor {
            ensure_on_schedule(doctor, datetime, patient_tz)?;
        }

        // **Step 5: Conflict check excluding this appointment**
        self.conflict_service
            .ensure_slot_free(&current.doctor_id, datetime, current.duration_minutes, Some(current.id.as_str()))
            .await?;

        // **Step 6: Move the appointment**
        let appointment = self
            .stores
            .appointments
            .reschedule_appointment(&current.id, datetime)
            .await?;
        info!("Appointment {} moved from {} to {}", appointment.id, current.datetime, appointment.datetime);

        // **Step 7: Notification and reminder**
        let ctx = AppointmentContext {
            appointment_id: appointment.id.clone(),
            user_id: appointment.user_id.clone(),
            doctor_name: doctor.map(|d| d.name),
            datetime: appointment.datetime,
            timezone: patient_tz,
        };
        report.merge(self.side_effects.on_rescheduled(&ctx).await);

        Ok(AppointmentOutcome {
            appointment,
            side_effects: report,
        })
    }

    // ==============================================================================
    // CANCEL / DELETE
    // ==============================================================================

    /// Cancels an active appointment, freeing its slot.
    pub async fn cancel_appointment(
        &self,
        user: &User,
        appointment_id: &str,
        timezone: Option<&str>,
    ) -> Result<AppointmentOutcome, AppointmentError> {
        info!("Cancelling appointment {} for patient {}", appointment_id, user.id);

        let current = self.load_owned(user, appointment_id).await?;
        self.lifecycle_service
            .validate_status_transition(current.status, AppointmentAction::Cancel)?;

        let status = self
            .lifecycle_service
            .resulting_status(AppointmentAction::Cancel)
            .unwrap_or(AppointmentStatus::Cancelled);
        let appointment = self.stores.appointments.set_status(&current.id, status).await?;
        info!("Appointment {} cancelled", appointment.id);

        let ctx = AppointmentContext {
            appointment_id: appointment.id.clone(),
            user_id: appointment.user_id.clone(),
            doctor_name: None,
            datetime: appointment.datetime,
            timezone: self.patient_timezone(user, timezone),
        };
        let side_effects = self.side_effects.on_cancelled(&ctx).await;

        Ok(AppointmentOutcome { appointment, side_effects })
    }

    /// Removes a cancelled appointment. Reminder cleanup is best-effort; a
    /// failed row delete fails the whole operation.
    pub async fn delete_appointment(&self, user: &User, appointment_id: &str) -> Result<DeletionOutcome, AppointmentError> {
        info!("Deleting appointment {} for patient {}", appointment_id, user.id);

        let current = self.load_owned(user, appointment_id).await?;
        self.lifecycle_service
            .validate_status_transition(current.status, AppointmentAction::Delete)?;

        let side_effects = self.side_effects.remove_reminders(&current.id).await;

        self.stores.appointments.delete_appointment(&current.id).await.map_err(|e| {
            warn!("Deleting appointment {} failed after reminder cleanup: {}", current.id, e);
            e
        })?;
        info!("Appointment {} deleted", current.id);

        Ok(DeletionOutcome {
            appointment_id: current.id,
            side_effects,
        })
    }
}
