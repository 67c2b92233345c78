use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::warn;

use shared_config::AppConfig;
use shared_database::ChangeFeed;
use shared_utils::clock::{Clock, SystemClock};

use crate::models::AppointmentError;

/// Process-wide scheduling state shared by every request through
/// `Extension<Arc<SchedulingRuntime>>`.
pub struct SchedulingRuntime {
    pub feed: Arc<ChangeFeed>,
    pub in_flight: InFlightGuard,
    pub clock: Arc<dyn Clock>,
    /// Zone used when the caller names none (or an unknown one).
    pub default_timezone: String,
}

impl SchedulingRuntime {
    pub fn new(config: &AppConfig, feed: Arc<ChangeFeed>) -> Self {
        Self::with_clock(feed, Arc::new(SystemClock), &config.default_timezone)
    }

    pub fn with_clock(feed: Arc<ChangeFeed>, clock: Arc<dyn Clock>, default_timezone: &str) -> Self {
        Self {
            feed,
            in_flight: InFlightGuard::default(),
            clock,
            default_timezone: default_timezone.to_string(),
        }
    }
}

/// At most one booking or reschedule per patient at a time.
#[derive(Debug, Default)]
pub struct InFlightGuard {
    users: Mutex<HashSet<String>>,
}

impl InFlightGuard {
    pub fn try_acquire(&self, user_id: &str) -> Result<InFlightPermit<'_>, AppointmentError> {
        let mut users = self.users.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if !users.insert(user_id.to_string()) {
            warn!("Rejecting concurrent scheduling request for user {}", user_id);
            return Err(AppointmentError::BookingInProgress);
        }

        Ok(InFlightPermit {
            guard: self,
            user_id: user_id.to_string(),
        })
    }

    pub fn is_held(&self, user_id: &str) -> bool {
        self.users
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(user_id)
    }
}

/// Releases the patient's slot in the guard when dropped.
#[derive(Debug)]
pub struct InFlightPermit<'a> {
    guard: &'a InFlightGuard,
    user_id: String,
}

impl Drop for InFlightPermit<'_> {
    fn drop(&mut self) {
        let mut users = self.guard.users.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        users.remove(&self.user_id);
    }
}
