//! vs-db: database access and persistence layer.
//!
//! This crate provides SQLite-backed storage with connection pooling,
//! embedded migrations, typed models, and query modules for users, channels,
//! assets and the durable finalize job queue.

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;

use chrono::{DateTime, SecondsFormat, Utc};

/// Canonical text form for every timestamp column.
///
/// Fixed-width millisecond RFC 3339 with a `Z` suffix, so string comparison
/// in SQL (`run_after <= ?`, `expires_at > ?`) orders correctly.
pub fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// [`timestamp`] of the current instant.
pub fn now() -> String {
    timestamp(Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_are_fixed_width() {
        let a = timestamp(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());
        assert_eq!(a, "2024-01-02T03:04:05.000Z");
        let b = timestamp(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 6).unwrap());
        assert!(a < b);
    }
}
