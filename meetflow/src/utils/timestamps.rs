//! Timestamp helpers.

use chrono::{DateTime, Utc};

/// Timestamp type used on every record.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Returns seconds since the Unix epoch as a float.
#[must_use]
pub fn unix_seconds() -> f64 {
    let now = Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_seconds_is_recent() {
        let secs = unix_seconds();
        // 2020-01-01
        assert!(secs > 1_577_836_800.0);
    }

    #[test]
    fn test_now_utc_is_monotonic_enough() {
        let a = now_utc();
        let b = now_utc();
        assert!(b >= a);
    }
}
