pub mod availability;
pub mod booking;
pub mod conflict;
pub mod lifecycle;
pub mod reschedule;

pub use availability::SlotAvailabilityService;
pub use booking::AppointmentBookingService;
pub use conflict::ConflictDetectionService;
pub use lifecycle::{AppointmentAction, AppointmentLifecycleService};
pub use reschedule::AppointmentOrchestrator;
