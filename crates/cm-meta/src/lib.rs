//! Meta-store for colmig.
//!
//! Owns the system tables (`_collections`, `_migrations`,
//! `_migration_lock`) and the [`Dao`] through which migration steps read and
//! change collections. Collection writes are planned by `cm-sql` and executed
//! in the caller's transaction together with the snapshot upsert.

mod bootstrap;
pub mod connection;
pub mod dao;
pub mod ddl;
pub mod error;
pub mod ledger;
pub mod lock;
mod timestamp;

pub use bootstrap::bootstrap;
pub use connection::MetaDb;
pub use dao::Dao;
pub use error::{MetaError, MetaResult};
pub use ledger::MigrationRecord;
pub use lock::LockHolder;
