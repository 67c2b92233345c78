use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::debug;

use shared_utils::timezone::local_wall_clock;

use crate::models::{slot_length, Doctor, DoctorError, WorkingHours};
use crate::store::DoctorStore;

/// Candidate slot starts for `date`, in `tz`, stepping by
/// `slot_duration_minutes` from the start of working hours. A candidate is
/// kept only if it also ends within working hours.
///
/// Callers are responsible for checking that `date` is a working day.
pub fn generate_slots_for_day(
    date: NaiveDate,
    working_hours: &WorkingHours,
    slot_duration_minutes: i64,
    tz: Tz,
) -> Result<Vec<DateTime<Tz>>, DoctorError> {
    let step = slot_length(slot_duration_minutes)?;
    working_hours.bounds()?;

    let start = local_wall_clock(date, &working_hours.start, tz)?;
    let end = local_wall_clock(date, &working_hours.end, tz)?;

    let mut slots = Vec::new();
    let mut current = start;
    // Stepping on absolute instants keeps every candidate a real instant,
    // even across a DST change inside working hours.
    while let Some(next) = current.checked_add_signed(step).filter(|next| *next <= end) {
        slots.push(current);
        current = next;
    }

    Ok(slots)
}

/// Slot grid of one doctor for one local date. Empty on non-working days;
/// an unusable slot duration is an error on every day.
pub fn doctor_candidate_slots(
    doctor: &Doctor,
    date: NaiveDate,
    tz: Tz,
) -> Result<Vec<DateTime<Tz>>, DoctorError> {
    slot_length(doctor.slot_duration_minutes)?;
    if !doctor.is_available_on(date.weekday()) {
        debug!("Doctor {} does not work on {}", doctor.id, date.weekday());
        return Ok(Vec::new());
    }

    generate_slots_for_day(date, &doctor.working_hours, doctor.slot_duration_minutes, tz)
}

/// Whether `instant` is the start of one of the doctor's slots on `date`.
pub fn is_on_slot_grid(
    doctor: &Doctor,
    date: NaiveDate,
    tz: Tz,
    instant: DateTime<Utc>,
) -> Result<bool, DoctorError> {
    Ok(doctor_candidate_slots(doctor, date, tz)?
        .iter()
        .any(|slot| slot.with_timezone(&Utc) == instant))
}

#[derive(Debug, Clone)]
pub struct DaySchedule {
    pub doctor: Doctor,
    pub date: NaiveDate,
    /// Zone the grid was generated in.
    pub timezone: Tz,
    pub slot_duration_minutes: i64,
    pub candidates: Vec<DateTime<Tz>>,
}

pub struct AvailabilityService {
    doctors: Arc<dyn DoctorStore>,
}

impl AvailabilityService {
    pub fn new(doctors: Arc<dyn DoctorStore>) -> Self {
        Self { doctors }
    }

    pub async fn get_doctor(&self, doctor_id: &str) -> Result<Doctor, DoctorError> {
        self.doctors
            .get_doctor(doctor_id)
            .await?
            .ok_or_else(|| DoctorError::NotFound(doctor_id.to_string()))
    }

    /// Candidate slots for `doctor_id` on the local `date`. The grid is built
    /// in the doctor's zone, or the caller's when the doctor has none.
    pub async fn candidate_slots(
        &self,
        doctor_id: &str,
        date: NaiveDate,
        caller_tz: Tz,
    ) -> Result<DaySchedule, DoctorError> {
        let doctor = self.get_doctor(doctor_id).await?;
        Self::schedule_for(doctor, date, caller_tz)
    }

    pub fn schedule_for(doctor: Doctor, date: NaiveDate, caller_tz: Tz) -> Result<DaySchedule, DoctorError> {
        let timezone = doctor.schedule_timezone(caller_tz);
        let candidates = doctor_candidate_slots(&doctor, date, timezone)?;

        debug!(
            "Generated {} candidate slots for doctor {} on {} ({})",
            candidates.len(),
            doctor.id,
            date,
            timezone
        );

        Ok(DaySchedule {
            slot_duration_minutes: doctor.slot_duration_minutes,
            doctor,
            date,
            timezone,
            candidates,
        })
    }
}
