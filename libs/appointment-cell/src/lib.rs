pub mod handlers;
pub mod models;
pub mod router;
pub mod runtime;
pub mod services;
pub mod store;

pub use models::*;
pub use runtime::{InFlightGuard, SchedulingRuntime};
pub use services::{
    AppointmentBookingService, AppointmentLifecycleService, AppointmentOrchestrator, ConflictDetectionService,
    SlotAvailabilityService,
};
pub use store::{AppointmentStore, SchedulingStores, SupabaseAppointmentStore};
