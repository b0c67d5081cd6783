//! Timestamps stored in system tables.
//!
//! Format: `2024-01-31 08:15:00.000Z` (UTC, millisecond precision). The
//! format sorts lexicographically, which the stale-lock sweep relies on.

use chrono::{DateTime, Utc};
use std::time::Duration;

const FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3fZ";

pub(crate) fn now() -> String {
    format(Utc::now())
}

pub(crate) fn format(at: DateTime<Utc>) -> String {
    at.format(FORMAT).to_string()
}

/// The timestamp `age` before now.
pub(crate) fn before_now(age: Duration) -> String {
    let age = chrono::Duration::from_std(age).unwrap_or_else(|_| chrono::Duration::days(36_500));
    let at = Utc::now()
        .checked_sub_signed(age)
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    format(at)
}
