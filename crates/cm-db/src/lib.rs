//! cm-db - Storage adapter for colmig
//!
//! This crate wraps rusqlite with a small connection pool (one writer and a
//! few read-only readers), the open-time pragmas, and a [`Tx`] scope that
//! rolls back unless committed.

pub mod adapter;
pub mod error;
pub mod schema;
pub mod tx;

pub use adapter::{Adapter, DbOptions};
pub use error::{DbError, DbResult};
pub use tx::Tx;
