mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{NaiveDate, Timelike};
use chrono_tz::Tz;

use appointment_cell::{
    AppointmentBookingService, AppointmentCategory, AppointmentError, AppointmentOrchestrator, AppointmentStatus,
    BookAppointmentRequest, RescheduleAppointmentRequest, SchedulingRuntime, SlotAvailabilityService,
};
use notification_cell::SideEffectStep;

use common::{monday_doctor, patient, runtime_at, utc, InMemoryScheduling};

const NOW: &str = "2024-01-01T08:00:00Z";

struct Harness {
    store: Arc<InMemoryScheduling>,
    runtime: Arc<SchedulingRuntime>,
}

impl Harness {
    fn new() -> Self {
        Self::at(NOW)
    }

    fn at(now: &str) -> Self {
        Self {
            store: InMemoryScheduling::with_doctor(monday_doctor()),
            runtime: runtime_at(now),
        }
    }

    fn booking(&self) -> AppointmentBookingService {
        AppointmentBookingService::new(self.store.stores(), self.runtime.clone())
    }

    fn orchestrator(&self) -> AppointmentOrchestrator {
        AppointmentOrchestrator::new(self.store.stores(), self.runtime.clone())
    }

    fn availability(&self) -> SlotAvailabilityService {
        SlotAvailabilityService::new(self.store.clone(), self.store.clone(), self.runtime.clock.clone())
    }

    async fn book(&self, user_id: &str, at: &str) -> Result<String, AppointmentError> {
        self.booking()
            .book_appointment(&patient(user_id), request(at))
            .await
            .map(|outcome| outcome.appointment.id)
    }

    async fn reschedule(&self, user_id: &str, appointment_id: &str, at: &str) -> Result<(), AppointmentError> {
        self.orchestrator()
            .reschedule_appointment(
                &patient(user_id),
                appointment_id,
                RescheduleAppointmentRequest { datetime: utc(at), timezone: None },
            )
            .await
            .map(|_| ())
    }

    async fn cancel(&self, user_id: &str, appointment_id: &str) -> Result<(), AppointmentError> {
        self.orchestrator()
            .cancel_appointment(&patient(user_id), appointment_id, None)
            .await
            .map(|_| ())
    }
}

fn request(at: &str) -> BookAppointmentRequest {
    BookAppointmentRequest {
        doctor_id: "doctor-1".to_string(),
        datetime: utc(at),
        notes: Some("Follow-up".to_string()),
        title: None,
        timezone: None,
    }
}

fn date(value: &str) -> NaiveDate {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap()
}

// ==============================================================================
// BOOKING
// ==============================================================================

#[tokio::test]
async fn test_booking_creates_pending_appointment_with_notification_and_reminder() {
    let h = Harness::new();

    let outcome = h
        .booking()
        .book_appointment(&patient("patient-1"), request("2024-01-08T09:00:00Z"))
        .await
        .unwrap();

    assert_eq!(outcome.appointment.status, AppointmentStatus::Pending);
    assert_eq!(outcome.appointment.duration_minutes, 30);
    assert_eq!(outcome.appointment.title.as_deref(), Some("Consultation"));
    assert!(outcome.side_effects.all_succeeded());

    let notifications = h.store.notifications.lock().unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].title, "Appointment Booked");
    assert!(notifications[0].message.contains("Dr. Ada Smith"));

    let reminders = h.store.reminders_for(&outcome.appointment.id);
    assert_eq!(reminders.len(), 1);
    assert_eq!(reminders[0].due_date, utc("2024-01-08T08:00:00Z"));
}

#[tokio::test]
async fn test_booking_a_taken_slot_fails_and_writes_nothing() {
    let h = Harness::new();
    h.store
        .seed_appointment("existing", "patient-2", "doctor-1", "2024-01-08T10:00:00Z", AppointmentStatus::Confirmed);

    let result = h.book("patient-1", "2024-01-08T10:00:00Z").await;

    assert_matches!(result, Err(AppointmentError::SlotNotAvailable));
    assert_eq!(h.store.appointments.lock().unwrap().len(), 1);
    assert!(h.store.notifications.lock().unwrap().is_empty());
    assert!(h.store.reminders.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_overlap_caught_by_store_is_slot_not_available() {
    let h = Harness::new();
    h.store
        .seed_appointment("existing", "patient-2", "doctor-1", "2024-01-08T10:00:00Z", AppointmentStatus::Pending);
    InMemoryScheduling::fail(&h.store.blind_range_queries);

    let result = h.book("patient-1", "2024-01-08T10:00:00Z").await;

    assert_matches!(result, Err(AppointmentError::SlotNotAvailable));
    assert_eq!(h.store.appointments.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_invalid_bookings_are_rejected_before_any_write() {
    let h = Harness::at("2024-01-08T12:00:00Z");

    assert_matches!(
        h.book("patient-1", "2024-01-08T11:00:00Z").await,
        Err(AppointmentError::InvalidTime(_))
    );
    assert_matches!(
        h.book("patient-1", "2024-01-08T12:00:00Z").await,
        Err(AppointmentError::InvalidTime(_))
    );
    assert_matches!(
        h.book("patient-1", "2024-01-09T10:00:00Z").await,
        Err(AppointmentError::DoctorNotAvailable(_))
    );
    assert_matches!(
        h.book("patient-1", "2024-01-15T10:15:00Z").await,
        Err(AppointmentError::InvalidTime(_))
    );
    assert_matches!(
        h.book("patient-1", "2024-01-15T17:00:00Z").await,
        Err(AppointmentError::InvalidTime(_))
    );

    let mut unknown = request("2024-01-15T10:00:00Z");
    unknown.doctor_id = "doctor-404".to_string();
    assert_matches!(
        h.booking().book_appointment(&patient("patient-1"), unknown).await,
        Err(AppointmentError::DoctorNotFound(id)) if id == "doctor-404"
    );

    assert!(h.store.appointments.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_second_submission_while_one_is_in_flight_is_rejected() {
    let h = Harness::new();

    let permit = h.runtime.in_flight.try_acquire("patient-1").unwrap();
    assert_matches!(
        h.book("patient-1", "2024-01-08T09:00:00Z").await,
        Err(AppointmentError::BookingInProgress)
    );
    assert!(h.book("patient-2", "2024-01-08T09:30:00Z").await.is_ok());

    drop(permit);
    assert!(h.book("patient-1", "2024-01-08T09:00:00Z").await.is_ok());
}

#[tokio::test]
async fn test_cancel_then_rebook_the_freed_slot() {
    let h = Harness::new();
    let first = h.book("patient-2", "2024-01-08T10:00:00Z").await.unwrap();

    assert_matches!(
        h.book("patient-1", "2024-01-08T10:00:00Z").await,
        Err(AppointmentError::SlotNotAvailable)
    );

    h.cancel("patient-2", &first).await.unwrap();
    assert!(h.store.reminders_for(&first).is_empty());

    let second = h.book("patient-1", "2024-01-08T10:00:00Z").await.unwrap();
    assert_ne!(first, second);
    h.store.assert_no_overlaps();
}

// ==============================================================================
// RESCHEDULE / CANCEL / DELETE
// ==============================================================================

#[tokio::test]
async fn test_rescheduling_onto_its_own_slot_does_not_conflict() {
    let h = Harness::new();
    let id = h.book("patient-1", "2024-01-08T09:00:00Z").await.unwrap();

    h.reschedule("patient-1", &id, "2024-01-08T09:00:00Z").await.unwrap();

    let appointment = h.store.appointment(&id).unwrap();
    assert_eq!(appointment.status, AppointmentStatus::Rescheduled);
    assert_eq!(appointment.datetime, utc("2024-01-08T09:00:00Z"));
}

#[tokio::test]
async fn test_rescheduling_into_its_own_overlapping_interval() {
    let h = Harness::new();
    h.store
        .seed_appointment("long", "patient-1", "doctor-1", "2024-01-08T09:00:00Z", AppointmentStatus::Confirmed);
    h.store.appointments.lock().unwrap()[0].duration_minutes = 60;

    h.reschedule("patient-1", "long", "2024-01-08T09:30:00Z").await.unwrap();

    assert_eq!(h.store.appointment("long").unwrap().datetime, utc("2024-01-08T09:30:00Z"));
}

#[tokio::test]
async fn test_rescheduling_onto_another_booking_fails_and_keeps_the_original() {
    let h = Harness::new();
    let mine = h.book("patient-1", "2024-01-08T09:00:00Z").await.unwrap();
    h.book("patient-2", "2024-01-08T11:00:00Z").await.unwrap();

    assert_matches!(
        h.reschedule("patient-1", &mine, "2024-01-08T11:00:00Z").await,
        Err(AppointmentError::SlotNotAvailable)
    );

    let appointment = h.store.appointment(&mine).unwrap();
    assert_eq!(appointment.datetime, utc("2024-01-08T09:00:00Z"));
    assert_eq!(appointment.status, AppointmentStatus::Pending);
}

#[tokio::test]
async fn test_rescheduling_twice_leaves_one_reminder() {
    let h = Harness::new();
    let id = h.book("patient-1", "2024-01-08T09:00:00Z").await.unwrap();

    h.reschedule("patient-1", &id, "2024-01-08T11:00:00Z").await.unwrap();
    h.reschedule("patient-1", &id, "2024-01-15T14:30:00Z").await.unwrap();

    let reminders = h.store.reminders_for(&id);
    assert_eq!(reminders.len(), 1);
    assert_eq!(reminders[0].due_date, utc("2024-01-15T13:30:00Z"));
    assert!(!reminders[0].sent);
}

#[tokio::test]
async fn test_reschedule_survives_a_failed_doctor_lookup() {
    let h = Harness::new();
    let id = h.book("patient-1", "2024-01-08T09:00:00Z").await.unwrap();
    InMemoryScheduling::fail(&h.store.fail_doctor_lookup);

    let outcome = h
        .orchestrator()
        .reschedule_appointment(
            &patient("patient-1"),
            &id,
            RescheduleAppointmentRequest {
                datetime: utc("2024-01-08T13:00:00Z"),
                timezone: Some("Europe/Berlin".to_string()),
            },
        )
        .await
        .unwrap();

    assert_eq!(outcome.appointment.datetime, utc("2024-01-08T13:00:00Z"));
    let failed: Vec<_> = outcome.side_effects.failures().map(|f| f.step).collect();
    assert_eq!(failed, vec![SideEffectStep::DoctorLookup]);

    let notifications = h.store.notifications.lock().unwrap();
    let last = notifications.last().unwrap();
    assert_eq!(last.title, "Appointment Rescheduled");
    assert_eq!(
        last.message,
        "Your appointment with your doctor has been rescheduled to Jan 8, 2024, 2:00:00 PM."
    );
}

#[tokio::test]
async fn test_status_machine_is_enforced() {
    let h = Harness::new();
    let id = h.book("patient-1", "2024-01-08T09:00:00Z").await.unwrap();

    assert_matches!(
        h.orchestrator().delete_appointment(&patient("patient-1"), &id).await,
        Err(AppointmentError::InvalidStatusTransition { from: AppointmentStatus::Pending, action: "delete" })
    );

    h.cancel("patient-1", &id).await.unwrap();

    assert_matches!(
        h.reschedule("patient-1", &id, "2024-01-08T10:00:00Z").await,
        Err(AppointmentError::InvalidStatusTransition { from: AppointmentStatus::Cancelled, .. })
    );
    assert_matches!(
        h.cancel("patient-1", &id).await,
        Err(AppointmentError::InvalidStatusTransition { .. })
    );
}

#[tokio::test]
async fn test_only_the_owner_can_change_an_appointment() {
    let h = Harness::new();
    let id = h.book("patient-1", "2024-01-08T09:00:00Z").await.unwrap();

    assert_matches!(
        h.reschedule("patient-2", &id, "2024-01-08T10:00:00Z").await,
        Err(AppointmentError::Unauthorized)
    );
    assert_matches!(h.cancel("patient-2", &id).await, Err(AppointmentError::Unauthorized));
    assert_matches!(h.cancel("patient-1", "missing").await, Err(AppointmentError::NotFound));
}

#[tokio::test]
async fn test_delete_removes_row_and_reminders() {
    let h = Harness::new();
    let id = h.book("patient-1", "2024-01-08T09:00:00Z").await.unwrap();
    h.cancel("patient-1", &id).await.unwrap();

    let outcome = h.orchestrator().delete_appointment(&patient("patient-1"), &id).await.unwrap();

    assert_eq!(outcome.appointment_id, id);
    assert!(outcome.side_effects.all_succeeded());
    assert!(h.store.appointment(&id).is_none());
}

#[tokio::test]
async fn test_failed_row_delete_is_reported_even_after_reminder_cleanup() {
    let h = Harness::new();
    h.store
        .seed_appointment("old", "patient-1", "doctor-1", "2024-01-08T09:00:00Z", AppointmentStatus::Cancelled);
    InMemoryScheduling::fail(&h.store.fail_appointment_delete);

    assert_matches!(
        h.orchestrator().delete_appointment(&patient("patient-1"), "old").await,
        Err(AppointmentError::DatabaseError(_))
    );
    assert!(h.store.appointment("old").is_some());
}

#[tokio::test]
async fn test_no_overlap_after_mixed_operations() {
    let h = Harness::new();
    let slots = [
        "2024-01-08T09:00:00Z",
        "2024-01-08T09:30:00Z",
        "2024-01-08T10:00:00Z",
        "2024-01-08T10:30:00Z",
    ];

    let mut booked = Vec::new();
    for (i, user) in ["patient-1", "patient-2", "patient-3", "patient-4", "patient-5", "patient-6"]
        .iter()
        .enumerate()
    {
        if let Ok(id) = h.book(user, slots[i % slots.len()]).await {
            booked.push((user.to_string(), id));
        }
    }
    h.store.assert_no_overlaps();

    for (i, (user, id)) in booked.iter().enumerate() {
        let _ = h.reschedule(user, id, slots[(i + 1) % slots.len()]).await;
        h.store.assert_no_overlaps();
        if i % 2 == 0 {
            let _ = h.cancel(user, id).await;
        }
    }
    for (i, user) in ["patient-7", "patient-8", "patient-9"].iter().enumerate() {
        let _ = h.book(user, slots[i]).await;
        h.store.assert_no_overlaps();
    }
}

// ==============================================================================
// AVAILABILITY AND LISTING
// ==============================================================================

#[tokio::test]
async fn test_day_slots_mark_booked_and_past() {
    let h = Harness::at("2024-01-08T09:45:00Z");
    h.store
        .seed_appointment("existing", "patient-2", "doctor-1", "2024-01-08T10:00:00Z", AppointmentStatus::Confirmed);

    let day = h
        .availability()
        .day_slots("doctor-1", date("2024-01-08"), Tz::UTC, None)
        .await
        .unwrap();

    assert_eq!(day.slots.len(), 16);
    assert!(day.slots[0].past && day.slots[1].past);
    assert!(day.slots[2].booked && !day.slots[2].available);
    assert!(day.slots[3].available);
    assert_eq!(day.available_count, 13);

    let picker = h
        .availability()
        .day_slots("doctor-1", date("2024-01-08"), Tz::UTC, Some("existing"))
        .await
        .unwrap();
    assert!(picker.slots[2].available);
}

#[tokio::test]
async fn test_non_working_day_has_no_slots() {
    let h = Harness::new();

    let day = h
        .availability()
        .day_slots("doctor-1", date("2024-01-09"), Tz::UTC, None)
        .await
        .unwrap();

    assert!(day.slots.is_empty());
    assert_eq!(day.available_count, 0);
}

#[tokio::test]
async fn test_unusable_slot_duration_is_a_validation_error() {
    let mut doctor = monday_doctor();
    doctor.slot_duration_minutes = 1_000_000_000_000;
    let h = Harness {
        store: InMemoryScheduling::with_doctor(doctor),
        runtime: runtime_at(NOW),
    };

    for day in ["2024-01-08", "2024-01-09"] {
        assert_matches!(
            h.availability().day_slots("doctor-1", date(day), Tz::UTC, None).await,
            Err(AppointmentError::ValidationError(_))
        );
    }
    assert_matches!(
        h.availability().upcoming("doctor-1", None, Tz::UTC).await,
        Err(AppointmentError::ValidationError(_))
    );
    assert_matches!(
        h.book("patient-1", "2024-01-08T09:00:00Z").await,
        Err(AppointmentError::ValidationError(_))
    );
    assert!(h.store.appointments.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_slots_are_shown_in_the_callers_zone() {
    let h = Harness::new();

    let day = h
        .availability()
        .day_slots("doctor-1", date("2024-01-08"), Tz::America__New_York, None)
        .await
        .unwrap();

    assert_eq!(day.schedule_timezone, "UTC");
    assert_eq!(day.timezone, "America/New_York");
    assert_eq!(day.slots[0].utc_start, utc("2024-01-08T09:00:00Z"));
    assert_eq!(day.slots[0].local_start.hour(), 4);
    assert_eq!(day.zone.offset, "-05:00");
    assert_eq!(day.zone.abbreviation, "EST");

    let summer = h
        .availability()
        .day_slots("doctor-1", date("2024-07-08"), Tz::America__New_York, None)
        .await
        .unwrap();
    assert_eq!(summer.zone.offset, "-04:00");

    let upcoming = h.availability().upcoming("doctor-1", None, Tz::Europe__Berlin).await.unwrap();
    assert_eq!(upcoming.zone.name, "Europe/Berlin");
    assert_eq!(upcoming.zone.offset, "+01:00");
}

#[tokio::test]
async fn test_upcoming_lists_only_open_days() {
    let h = Harness::new();

    let week = h.availability().upcoming("doctor-1", None, Tz::UTC).await.unwrap();
    let dates: Vec<_> = week.days.iter().map(|d| d.date).collect();
    assert_eq!(dates, vec![date("2024-01-01")]);

    let month = h.availability().upcoming("doctor-1", Some(400), Tz::UTC).await.unwrap();
    assert_eq!(month.days.len(), 5);

    assert_matches!(
        h.availability().upcoming("doctor-404", None, Tz::UTC).await,
        Err(AppointmentError::DoctorNotFound(_))
    );
}

#[tokio::test]
async fn test_patient_listing_is_newest_first_with_categories() {
    let h = Harness::at("2024-01-08T12:00:00Z");
    h.store
        .seed_appointment("past", "patient-1", "doctor-1", "2024-01-08T09:00:00Z", AppointmentStatus::Confirmed);
    h.store
        .seed_appointment("gone", "patient-1", "doctor-1", "2024-01-15T09:00:00Z", AppointmentStatus::Cancelled);
    h.store
        .seed_appointment("next", "patient-1", "doctor-1", "2024-01-22T09:00:00Z", AppointmentStatus::Pending);
    h.store
        .seed_appointment("other", "patient-2", "doctor-1", "2024-01-22T10:00:00Z", AppointmentStatus::Pending);

    let listing = h.booking().list_patient_appointments(&patient("patient-1")).await.unwrap();

    let summary: Vec<_> = listing
        .iter()
        .map(|s| (s.appointment.id.as_str(), s.category))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("next", AppointmentCategory::Upcoming),
            ("gone", AppointmentCategory::Cancelled),
            ("past", AppointmentCategory::Past),
        ]
    );
}
