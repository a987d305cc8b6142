//! Time utilities for record timestamps.
//!
//! Records always hold UTC instants; `use_universal_time` only affects how
//! they are rendered.

use chrono::{DateTime, Local, SecondsFormat, Utc};

/// Current instant.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// The "never" timestamp used as a record default.
pub fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// Render a timestamp as RFC 3339, in UTC or in the local zone.
pub fn to_rfc3339(instant: DateTime<Utc>, use_universal_time: bool) -> String {
    if use_universal_time {
        instant.to_rfc3339_opts(SecondsFormat::Secs, true)
    } else {
        instant
            .with_timezone(&Local)
            .to_rfc3339_opts(SecondsFormat::Secs, false)
    }
}
