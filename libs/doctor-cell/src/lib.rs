pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod store;

pub use models::{slot_length, Doctor, DoctorError, DoctorProfile, WorkingHours, MAX_SLOT_DURATION_MINUTES};
pub use services::availability::{doctor_candidate_slots, generate_slots_for_day, is_on_slot_grid, DaySchedule};
pub use services::{AvailabilityService, DoctorService};
pub use store::{DoctorStore, SupabaseDoctorStore};
