pub mod clock;
pub mod extractor;
pub mod jwt;
pub mod test_utils;
pub mod timezone;

pub use clock::{Clock, FixedClock, SystemClock};
pub use extractor::auth_middleware;
pub use timezone::{DayBounds, TimezoneError, TimezoneInfo};
