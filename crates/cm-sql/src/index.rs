//! Index declarations: parsing, structural comparison, and rendering.
//!
//! Declarations are stored as SQL text. Two declarations are the same index
//! when their normalised forms agree: identifiers unquoted and lowercased,
//! explicit `ASC` dropped, keyword case folded by re-rendering through the
//! AST. The table component is not part of the comparison; callers check
//! separately that it names the owning collection.

use crate::dialect::{parse_single, quote_ident};
use crate::error::{SqlError, SqlResult};
use cm_core::Collection;
use sqlparser::ast::{
    visit_expressions, visit_expressions_mut, CreateIndex, Expr, Ident, ObjectName,
    ObjectNamePart, Statement,
};
use std::collections::{BTreeSet, HashMap};
use std::ops::ControlFlow;

/// A parsed `CREATE [UNIQUE] INDEX` declaration.
#[derive(Debug, Clone)]
pub struct IndexDecl {
    /// Index name as written
    pub name: String,
    /// Target table as written
    pub table: String,
    pub unique: bool,
    /// The declaration text this was parsed from
    pub sql: String,
    stmt: CreateIndex,
}

impl IndexDecl {
    /// Parse a single `CREATE INDEX` statement.
    pub fn parse(sql: &str) -> SqlResult<Self> {
        let stmt = match parse_single(sql)? {
            Statement::CreateIndex(ci) => ci,
            other => {
                return Err(SqlError::invalid_index(
                    sql,
                    format!("expected CREATE INDEX, got {}", statement_keyword(&other)),
                ))
            }
        };

        let name = stmt
            .name
            .as_ref()
            .and_then(last_ident)
            .ok_or_else(|| SqlError::invalid_index(sql, "index must be named"))?;
        let table = last_ident(&stmt.table_name)
            .ok_or_else(|| SqlError::invalid_index(sql, "missing table name"))?;
        if stmt.columns.is_empty() {
            return Err(SqlError::invalid_index(sql, "index has no columns"));
        }

        Ok(Self {
            name,
            table,
            unique: stmt.unique,
            sql: sql.trim().to_string(),
            stmt,
        })
    }

    /// Lowercased name; index names are case-insensitive in SQLite.
    pub fn key(&self) -> String {
        self.name.to_ascii_lowercase()
    }

    pub fn is_partial(&self) -> bool {
        self.stmt.predicate.is_some()
    }

    /// Whether the declaration targets `table` (case-insensitive).
    pub fn targets(&self, table: &str) -> bool {
        self.table.eq_ignore_ascii_case(table)
    }

    /// Lowercased names of every column the declaration references.
    pub fn referenced_columns(&self) -> BTreeSet<String> {
        let mut cols = BTreeSet::new();
        let mut collect = |expr: &Expr| {
            match expr {
                Expr::Identifier(ident) => {
                    cols.insert(ident.value.to_ascii_lowercase());
                }
                Expr::CompoundIdentifier(parts) => {
                    if let Some(last) = parts.last() {
                        cols.insert(last.value.to_ascii_lowercase());
                    }
                }
                _ => {}
            }
            ControlFlow::<()>::Continue(())
        };
        for col in &self.stmt.columns {
            let _ = visit_expressions(&col.column.expr, &mut collect);
        }
        if let Some(predicate) = &self.stmt.predicate {
            let _ = visit_expressions(predicate, &mut collect);
        }
        cols
    }

    /// The single indexed column when the index is a plain one-column index.
    pub fn single_column(&self) -> Option<String> {
        match self.stmt.columns.as_slice() {
            [only] => match &only.column.expr {
                Expr::Identifier(ident) => Some(ident.value.to_ascii_lowercase()),
                _ => None,
            },
            _ => None,
        }
    }

    /// Structural fingerprint used for diffing.
    ///
    /// `renames` maps lowercased old column names to lowercased new ones so
    /// that an index on a renamed column compares equal to its declaration
    /// under the new name.
    pub fn fingerprint(&self, renames: &HashMap<String, String>) -> String {
        let mut parts = Vec::with_capacity(self.stmt.columns.len());
        for col in &self.stmt.columns {
            let mut expr = col.column.expr.clone();
            normalise_expr(&mut expr, renames);
            let desc = col.column.options.asc == Some(false);
            parts.push(if desc {
                format!("{expr} DESC")
            } else {
                expr.to_string()
            });
        }

        let mut out = format!(
            "{}INDEX ({})",
            if self.unique { "UNIQUE " } else { "" },
            parts.join(", ")
        );
        if let Some(predicate) = &self.stmt.predicate {
            let mut expr = predicate.clone();
            normalise_expr(&mut expr, renames);
            out.push_str(&format!(" WHERE {expr}"));
        }
        out
    }

    /// Render the declaration against `table`.
    ///
    /// When the declaration already targets `table` the original text is
    /// returned verbatim; otherwise the table component is substituted.
    pub fn render_for(&self, table: &str) -> String {
        if self.table == table {
            return self.sql.clone();
        }
        let mut stmt = self.stmt.clone();
        stmt.table_name = ObjectName(vec![ObjectNamePart::Identifier(Ident::with_quote(
            '"', table,
        ))]);
        Statement::CreateIndex(stmt).to_string()
    }

    /// `DROP INDEX` for this declaration.
    pub fn drop_sql(&self) -> String {
        format!("DROP INDEX IF EXISTS {}", quote_ident(&self.name))
    }
}

fn last_ident(name: &ObjectName) -> Option<String> {
    match name.0.last()? {
        ObjectNamePart::Identifier(ident) => Some(ident.value.clone()),
        _ => None,
    }
}

fn statement_keyword(stmt: &Statement) -> String {
    stmt.to_string()
        .split_whitespace()
        .take(2)
        .collect::<Vec<_>>()
        .join(" ")
}

fn normalise_ident(ident: &mut Ident, renames: &HashMap<String, String>) {
    let lower = ident.value.to_ascii_lowercase();
    ident.value = renames.get(&lower).cloned().unwrap_or(lower);
    ident.quote_style = None;
}

fn normalise_expr(expr: &mut Expr, renames: &HashMap<String, String>) {
    let _ = visit_expressions_mut(expr, |e| {
        match e {
            Expr::Identifier(ident) => normalise_ident(ident, renames),
            Expr::CompoundIdentifier(parts) => {
                for ident in parts.iter_mut() {
                    normalise_ident(ident, renames);
                }
            }
            _ => {}
        }
        ControlFlow::<()>::Continue(())
    });
}

/// Parse and check every declared index of `collection`.
///
/// Each declaration must name the collection's table and reference only its
/// physical columns; names must be unique within the collection.
pub fn declared_indexes(collection: &Collection) -> SqlResult<Vec<IndexDecl>> {
    let mut out: Vec<IndexDecl> = Vec::with_capacity(collection.indexes.len());
    for sql in &collection.indexes {
        let decl = IndexDecl::parse(sql)?;
        if !decl.targets(&collection.name) {
            return Err(SqlError::invalid_index(
                sql,
                format!("targets '{}' instead of '{}'", decl.table, collection.name),
            ));
        }
        for col in decl.referenced_columns() {
            if !crate::column::has_column(collection, &col) {
                return Err(SqlError::invalid_index(sql, format!("unknown column '{col}'")));
            }
        }
        if out.iter().any(|d| d.key() == decl.key()) {
            return Err(SqlError::invalid_index(sql, "duplicate index name"));
        }
        out.push(decl);
    }
    Ok(out)
}

/// Indexes derived from the snapshot rather than declared: `unique` field
/// sugar and the auth email/token indexes.
pub fn implicit_indexes(collection: &Collection, declared: &[IndexDecl]) -> SqlResult<Vec<IndexDecl>> {
    let id = collection.id.as_str();
    let table = quote_ident(&collection.name);
    let mut sqls = Vec::new();

    for field in collection.fields.iter().filter(|f| f.unique) {
        let col = field.name.to_ascii_lowercase();
        let covered = declared.iter().any(|d| {
            d.unique && !d.is_partial() && d.single_column().as_deref() == Some(col.as_str())
        });
        if !covered {
            sqls.push(format!(
                "CREATE UNIQUE INDEX {} ON {table} ({})",
                quote_ident(&format!("_{id}_unique_{}", field.name)),
                quote_ident(&field.name)
            ));
        }
    }

    if collection.is_auth() {
        sqls.push(format!(
            "CREATE UNIQUE INDEX {} ON {table} (\"email\") WHERE \"email\" != ''",
            quote_ident(&format!("_{id}_email_idx"))
        ));
        sqls.push(format!(
            "CREATE UNIQUE INDEX {} ON {table} (\"tokenKey\")",
            quote_ident(&format!("_{id}_tokenKey_idx"))
        ));
    }

    sqls.iter().map(|s| IndexDecl::parse(s)).collect()
}

/// Declared plus implicit indexes: everything that must exist on the table.
pub fn effective_indexes(collection: &Collection) -> SqlResult<Vec<IndexDecl>> {
    if collection.is_view() {
        return Ok(Vec::new());
    }
    let mut all = declared_indexes(collection)?;
    let implicit = implicit_indexes(collection, &all)?;
    all.extend(implicit);
    Ok(all)
}

/// Rewrite the table component of every declaration to `table`, leaving
/// declarations that already target it untouched.
pub fn retarget_indexes(indexes: &[String], table: &str) -> SqlResult<Vec<String>> {
    indexes
        .iter()
        .map(|sql| {
            let decl = IndexDecl::parse(sql)?;
            Ok(if decl.targets(table) {
                sql.clone()
            } else {
                decl.render_for(table)
            })
        })
        .collect()
}

#[cfg(test)]
#[path = "index_test.rs"]
mod tests;
