//! Time and timestamp helpers.

use chrono::{DateTime, Utc};

/// UTC timestamp used for hub events and request signing.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Seconds since the Unix epoch, as placed in request headers.
#[must_use]
pub fn unix_seconds() -> i64 {
    now().timestamp()
}
