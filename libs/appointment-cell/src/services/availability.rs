use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::debug;

use doctor_cell::{AvailabilityService, DaySchedule, DoctorStore};
use shared_utils::clock::Clock;
use shared_utils::timezone::{day_bounds_utc, timezone_info, today_in};

use crate::models::{interval_end, Appointment, AppointmentError, DayAvailability, UpcomingAvailability};
use crate::services::conflict::{reconcile, CONFLICT_LOOKBACK_HOURS};
use crate::store::AppointmentStore;

pub const DEFAULT_UPCOMING_DAYS: u32 = 7;
pub const MAX_UPCOMING_DAYS: u32 = 31;

/// Patient-facing view of a doctor's open slots.
pub struct SlotAvailabilityService {
    appointments: Arc<dyn AppointmentStore>,
    schedules: AvailabilityService,
    clock: Arc<dyn Clock>,
}

impl SlotAvailabilityService {
    pub fn new(
        appointments: Arc<dyn AppointmentStore>,
        doctors: Arc<dyn DoctorStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            appointments,
            schedules: AvailabilityService::new(doctors),
            clock,
        }
    }

    /// Every slot of `doctor_id` on the local `date`, marked booked, past, or
    /// available. `exclude_appointment_id` frees that appointment's own
    /// interval, which is what a reschedule picker needs.
    pub async fn day_slots(
        &self,
        doctor_id: &str,
        date: NaiveDate,
        caller_tz: Tz,
        exclude_appointment_id: Option<&str>,
    ) -> Result<DayAvailability, AppointmentError> {
        let schedule = self.schedules.candidate_slots(doctor_id, date, caller_tz).await?;
        let existing = self
            .existing_for(doctor_id, &[&schedule], exclude_appointment_id)
            .await?;

        Ok(self.build_day(&schedule, &existing, exclude_appointment_id, caller_tz))
    }

    /// Days from today (in the caller's zone) that still have an available
    /// slot. `days` defaults to a week and is capped at a month.
    pub async fn upcoming(
        &self,
        doctor_id: &str,
        days: Option<u32>,
        caller_tz: Tz,
    ) -> Result<UpcomingAvailability, AppointmentError> {
        let days = days.unwrap_or(DEFAULT_UPCOMING_DAYS).clamp(1, MAX_UPCOMING_DAYS);
        let doctor = self.schedules.get_doctor(doctor_id).await?;
        let today = today_in(caller_tz, self.clock.now());

        let schedules = today
            .iter_days()
            .take(days as usize)
            .map(|date| AvailabilityService::schedule_for(doctor.clone(), date, caller_tz))
            .collect::<Result<Vec<DaySchedule>, _>>()?;

        let refs: Vec<&DaySchedule> = schedules.iter().collect();
        let existing = self.existing_for(doctor_id, &refs, None).await?;

        let open_days: Vec<DayAvailability> = schedules
            .iter()
            .map(|schedule| self.build_day(schedule, &existing, None, caller_tz))
            .filter(|day| day.available_count > 0)
            .collect();

        debug!(
            "Doctor {} has {} open days in the next {} days",
            doctor.id,
            open_days.len(),
            days
        );

        Ok(UpcomingAvailability {
            doctor_id: doctor.id,
            doctor_name: doctor.name,
            timezone: caller_tz.name().to_string(),
            zone: timezone_info(caller_tz, self.clock.now()),
            days: open_days,
        })
    }

    /// One range query covering every candidate in `schedules`, reaching back
    /// far enough to catch appointments that started earlier and still run.
    async fn existing_for(
        &self,
        doctor_id: &str,
        schedules: &[&DaySchedule],
        exclude_appointment_id: Option<&str>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let span = schedules
            .iter()
            .flat_map(|schedule| {
                let minutes = schedule.slot_duration_minutes;
                schedule.candidates.iter().map(move |start| {
                    let start = start.with_timezone(&Utc);
                    (start, interval_end(start, minutes))
                })
            })
            .fold(None, |span: Option<(DateTime<Utc>, DateTime<Utc>)>, (start, end)| match span {
                None => Some((start, end)),
                Some((lo, hi)) => Some((lo.min(start), hi.max(end))),
            });

        let Some((first_start, last_end)) = span else {
            return Ok(Vec::new());
        };

        self.appointments
            .find_active_in_range(
                doctor_id,
                first_start - Duration::hours(CONFLICT_LOOKBACK_HOURS),
                last_end,
                exclude_appointment_id,
            )
            .await
    }

    fn build_day(
        &self,
        schedule: &DaySchedule,
        existing: &[Appointment],
        exclude_appointment_id: Option<&str>,
        caller_tz: Tz,
    ) -> DayAvailability {
        let slots = reconcile(
            &schedule.candidates,
            schedule.slot_duration_minutes,
            existing,
            exclude_appointment_id,
            self.clock.now(),
            caller_tz,
        );

        DayAvailability {
            doctor_id: schedule.doctor.id.clone(),
            doctor_name: schedule.doctor.name.clone(),
            date: schedule.date,
            timezone: caller_tz.name().to_string(),
            zone: timezone_info(caller_tz, day_bounds_utc(schedule.date, caller_tz).start_utc),
            schedule_timezone: schedule.timezone.name().to_string(),
            slot_duration_minutes: schedule.slot_duration_minutes,
            available_count: slots.iter().filter(|slot| slot.available).count(),
            slots,
        }
    }
}
