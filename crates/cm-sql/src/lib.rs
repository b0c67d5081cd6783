//! cm-sql - SQL layer for colmig
//!
//! This crate parses and normalises index declarations with sqlparser-rs
//! (SQLite dialect), renders column definitions for collection fields, and
//! plans the DDL that moves a table from one collection snapshot to the next.

pub mod column;
pub mod dialect;
pub mod error;
pub mod index;
pub mod planner;
pub mod view;

pub use column::{ColumnDef, ColumnType};
pub use dialect::{parse_sqlite, quote_ident, quote_literal};
pub use error::{SqlError, SqlResult};
pub use index::{declared_indexes, effective_indexes, retarget_indexes, IndexDecl};
pub use planner::{plan, DdlOp, DdlStatement};
pub use view::{rename_relation, view_dependencies};
