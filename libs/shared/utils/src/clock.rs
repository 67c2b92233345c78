use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// Source of "now" for anything that compares against the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests.
#[derive(Debug)]
pub struct FixedClock {
    instant: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self { instant: Mutex::new(instant) }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        if let Ok(mut current) = self.instant.lock() {
            *current = instant;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut current) = self.instant.lock() {
            *current += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.instant.lock() {
            Ok(current) => *current,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
