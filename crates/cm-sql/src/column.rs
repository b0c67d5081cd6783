//! Column definitions derived from collection fields.
//!
//! Storage follows one table per field shape:
//!
//! | shape                         | optional                   | required                                  |
//! |-------------------------------|----------------------------|-------------------------------------------|
//! | text-like scalar              | `TEXT DEFAULT '' NOT NULL` | `TEXT NOT NULL CHECK ("c" != '')`          |
//! | number                        | `NUMERIC DEFAULT 0 NOT NULL` | `NUMERIC NOT NULL CHECK ("c" != 0)`      |
//! | bool                          | `BOOLEAN DEFAULT 0 NOT NULL` | `BOOLEAN NOT NULL CHECK ("c" = 1)`       |
//! | multi select/file/relation    | `JSON DEFAULT '[]' NOT NULL` | `JSON NOT NULL CHECK (json_array_length("c") > 0)` |
//! | json                          | `JSON DEFAULT NULL`        | `JSON NOT NULL CHECK ("c" NOT IN (...))`   |

use crate::dialect::quote_ident;
use cm_core::collection::is_primary_key_override;
use cm_core::{Collection, Field, FieldKind};
use std::fmt;

/// Physical storage shape of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Text,
    Numeric,
    Boolean,
    JsonArray,
    Json,
}

impl ColumnType {
    /// Storage shape for a field kind.
    pub fn for_kind(kind: &FieldKind) -> Self {
        if kind.is_multi_valued() {
            return ColumnType::JsonArray;
        }
        match kind {
            FieldKind::Number(_) => ColumnType::Numeric,
            FieldKind::Bool(_) => ColumnType::Boolean,
            FieldKind::Json(_) => ColumnType::Json,
            _ => ColumnType::Text,
        }
    }

    /// SQL type name.
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Numeric => "NUMERIC",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::JsonArray | ColumnType::Json => "JSON",
        }
    }

    /// The "kind zero" literal used to backfill a freshly added column.
    pub fn zero_literal(self) -> &'static str {
        match self {
            ColumnType::Text => "''",
            ColumnType::Numeric | ColumnType::Boolean => "0",
            ColumnType::JsonArray => "'[]'",
            ColumnType::Json => "'{}'",
        }
    }
}

/// A single physical column.
///
/// Two definitions with equal `ty`, `required` and `primary_key` produce the
/// same DDL up to the column name, so renames alone never need a rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub ty: ColumnType,
    pub required: bool,
    pub primary_key: bool,
}

impl ColumnDef {
    fn optional(name: &str, ty: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            ty,
            required: false,
            primary_key: false,
        }
    }

    fn primary_key() -> Self {
        Self {
            name: "id".to_string(),
            ty: ColumnType::Text,
            required: false,
            primary_key: true,
        }
    }

    pub fn for_field(field: &Field) -> Self {
        Self {
            name: field.name.clone(),
            ty: ColumnType::for_kind(&field.kind),
            required: field.required,
            primary_key: false,
        }
    }

    /// Whether the definitions differ in anything but the name.
    pub fn shape_differs(&self, other: &ColumnDef) -> bool {
        self.ty != other.ty || self.required != other.required || self.primary_key != other.primary_key
    }

    /// Definition used by the first half of a required add: nullable and
    /// unchecked so existing rows can receive the backfill value.
    pub fn relaxed(&self) -> String {
        format!("{} {}", quote_ident(&self.name), self.ty.sql_type())
    }
}

impl fmt::Display for ColumnDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = quote_ident(&self.name);
        let ty = self.ty.sql_type();
        if self.primary_key {
            return write!(f, "{c} {ty} PRIMARY KEY NOT NULL");
        }
        match (self.ty, self.required) {
            (ColumnType::Text, false) => write!(f, "{c} {ty} DEFAULT '' NOT NULL"),
            (ColumnType::Text, true) => write!(f, "{c} {ty} NOT NULL CHECK ({c} != '')"),
            (ColumnType::Numeric, false) => write!(f, "{c} {ty} DEFAULT 0 NOT NULL"),
            (ColumnType::Numeric, true) => write!(f, "{c} {ty} NOT NULL CHECK ({c} != 0)"),
            (ColumnType::Boolean, false) => write!(f, "{c} {ty} DEFAULT 0 NOT NULL"),
            (ColumnType::Boolean, true) => write!(f, "{c} {ty} NOT NULL CHECK ({c} = 1)"),
            (ColumnType::JsonArray, false) => write!(f, "{c} {ty} DEFAULT '[]' NOT NULL"),
            (ColumnType::JsonArray, true) => {
                write!(f, "{c} {ty} NOT NULL CHECK (json_array_length({c}) > 0)")
            }
            (ColumnType::Json, false) => write!(f, "{c} {ty} DEFAULT NULL"),
            (ColumnType::Json, true) => write!(
                f,
                "{c} {ty} NOT NULL CHECK ({c} NOT IN ('', 'null', '\"\"', '[]', '{{}}'))"
            ),
        }
    }
}

/// System columns in physical order (`id`, `created`, `updated`, then the
/// auth columns for auth collections).
pub fn system_columns(collection: &Collection) -> Vec<ColumnDef> {
    let mut cols = vec![
        ColumnDef::primary_key(),
        ColumnDef::optional("created", ColumnType::Text),
        ColumnDef::optional("updated", ColumnType::Text),
    ];
    if collection.is_auth() {
        cols.extend([
            ColumnDef::optional("email", ColumnType::Text),
            ColumnDef::optional("tokenKey", ColumnType::Text),
            ColumnDef::optional("passwordHash", ColumnType::Text),
            ColumnDef::optional("verified", ColumnType::Boolean),
            ColumnDef::optional("emailVisibility", ColumnType::Boolean),
        ]);
    }
    cols
}

/// Columns backed by declared fields, in declaration order. A primary-key
/// `id` field is folded into the system `id` column.
pub fn field_columns(collection: &Collection) -> Vec<(&Field, ColumnDef)> {
    collection
        .fields
        .iter()
        .filter(|f| !is_primary_key_override(f))
        .map(|f| (f, ColumnDef::for_field(f)))
        .collect()
}

/// Every physical column of a table-backed collection.
pub fn table_columns(collection: &Collection) -> Vec<ColumnDef> {
    let mut cols = system_columns(collection);
    cols.extend(field_columns(collection).into_iter().map(|(_, c)| c));
    cols
}

/// Whether `name` is a physical column of the collection (case-insensitive).
pub fn has_column(collection: &Collection, name: &str) -> bool {
    table_columns(collection)
        .iter()
        .any(|c| c.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
#[path = "column_test.rs"]
mod tests;
