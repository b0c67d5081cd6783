//! Embedded DDL for the system tables.
//!
//! Each migration is a numbered `.sql` file embedded via `include_str!`.
//! The [`MIGRATIONS`] array is ordered by version number and consumed by
//! [`crate::bootstrap::bootstrap`].

/// A single system-table migration.
pub struct Migration {
    /// Sequential version number (1-based).
    pub version: i32,
    /// Raw SQL to execute.
    pub sql: &'static str,
}

/// All known system-table migrations, in order.
pub static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: include_str!("v001_system_tables.sql"),
    },
    Migration {
        version: 2,
        sql: include_str!("v002_collection_versions.sql"),
    },
];
