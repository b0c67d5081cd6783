//! Schema diff planner.
//!
//! [`plan`] turns a pair of collection snapshots into the ordered DDL that
//! moves the physical schema from `old` to `new`. It is a pure function:
//! nothing is executed here.
//!
//! Statement order for an altered table:
//!
//! 1. drop removed or altered indexes (skipped when a rewrite follows)
//! 2. column renames, ordered so a freed name can be reused
//! 3. column adds; required adds are added relaxed and backfilled
//! 4. table rewrite when a column is removed or changes shape, then every
//!    effective index is recreated
//! 5. create added or altered indexes (when there was no rewrite)
//! 6. table rename
//!
//! Everything before step 6 addresses the physical (old) table name.

use crate::column::{field_columns, system_columns, table_columns, ColumnDef};
use crate::dialect::quote_ident;
use crate::error::{SqlError, SqlResult};
use crate::index::{effective_indexes, IndexDecl};
use cm_core::{Collection, FieldKind};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Kind of a planned statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DdlOp {
    CreateTable,
    DropTable,
    RenameTable,
    AddColumn,
    RenameColumn,
    Backfill,
    CopyRows,
    CreateIndex,
    DropIndex,
    CreateView,
    DropView,
}

/// One planned SQL statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DdlStatement {
    pub op: DdlOp,
    pub sql: String,
}

impl DdlStatement {
    fn new(op: DdlOp, sql: impl Into<String>) -> Self {
        Self { op, sql: sql.into() }
    }
}

impl fmt::Display for DdlStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Plan the DDL that moves the schema from `old` to `new`.
///
/// `dependents` are the other collections whose relation fields point at
/// this one; they are only consulted when fields are removed.
pub fn plan(
    old: Option<&Collection>,
    new: Option<&Collection>,
    dependents: &[Collection],
) -> SqlResult<Vec<DdlStatement>> {
    let statements = match (old, new) {
        (None, None) => Vec::new(),
        (None, Some(new)) => plan_create(new)?,
        (Some(old), None) => plan_drop(old)?,
        (Some(old), Some(new)) => plan_alter(old, new, dependents)?,
    };
    log::debug!(
        "Planned {} statement(s) for {}",
        statements.len(),
        new.or(old).map_or("<none>", |c| c.name.as_str())
    );
    Ok(statements)
}

fn create_table_sql(table: &str, columns: &[ColumnDef]) -> String {
    let body = columns
        .iter()
        .map(|c| format!("    {c}"))
        .collect::<Vec<_>>()
        .join(",\n");
    format!("CREATE TABLE {} (\n{body}\n)", quote_ident(table))
}

fn create_view_sql(view: &Collection) -> SqlResult<String> {
    let query = view.options.query.as_deref().ok_or_else(|| SqlError::Validation {
        field: "options.query".to_string(),
        rule: "view requires a query".to_string(),
    })?;
    Ok(format!(
        "CREATE VIEW {} AS {}",
        quote_ident(&view.name),
        query.trim().trim_end_matches(';')
    ))
}

fn drop_view_sql(name: &str) -> String {
    format!("DROP VIEW IF EXISTS {}", quote_ident(name))
}

fn plan_create(new: &Collection) -> SqlResult<Vec<DdlStatement>> {
    if new.is_view() {
        return Ok(vec![DdlStatement::new(DdlOp::CreateView, create_view_sql(new)?)]);
    }

    let mut out = vec![DdlStatement::new(
        DdlOp::CreateTable,
        create_table_sql(&new.name, &table_columns(new)),
    )];
    for idx in effective_indexes(new)? {
        out.push(DdlStatement::new(DdlOp::CreateIndex, idx.render_for(&new.name)));
    }
    Ok(out)
}

fn plan_drop(old: &Collection) -> SqlResult<Vec<DdlStatement>> {
    if old.is_view() {
        return Ok(vec![DdlStatement::new(DdlOp::DropView, drop_view_sql(&old.name))]);
    }

    let mut out: Vec<DdlStatement> = effective_indexes(old)?
        .iter()
        .map(|idx| DdlStatement::new(DdlOp::DropIndex, idx.drop_sql()))
        .collect();
    out.push(DdlStatement::new(
        DdlOp::DropTable,
        format!("DROP TABLE {}", quote_ident(&old.name)),
    ));
    Ok(out)
}

fn plan_alter(
    old: &Collection,
    new: &Collection,
    dependents: &[Collection],
) -> SqlResult<Vec<DdlStatement>> {
    if old.kind != new.kind {
        return Err(SqlError::Validation {
            field: "type".to_string(),
            rule: format!("cannot change collection type from {} to {}", old.kind, new.kind),
        });
    }

    if old.is_view() {
        let changed = old.name != new.name || old.options.query != new.options.query;
        if !changed {
            return Ok(Vec::new());
        }
        return Ok(vec![
            DdlStatement::new(DdlOp::DropView, drop_view_sql(&old.name)),
            DdlStatement::new(DdlOp::CreateView, create_view_sql(new)?),
        ]);
    }

    check_field_types(old, new)?;
    check_removals(old, new, dependents)?;

    let physical = old.name.as_str();
    let table = quote_ident(physical);
    let old_cols = field_columns(old);
    let new_cols = field_columns(new);

    let mut renames: HashMap<String, String> = HashMap::new();
    let mut moves = Vec::new();
    let mut add_stmts = Vec::new();
    let mut needs_rewrite = system_columns(old) != system_columns(new);

    for (field, col) in &new_cols {
        match old_cols.iter().find(|(f, _)| f.id == field.id) {
            Some((old_field, old_col)) => {
                if old_field.name != field.name {
                    renames.insert(
                        old_field.name.to_ascii_lowercase(),
                        field.name.to_ascii_lowercase(),
                    );
                    moves.push((old_field.name.clone(), field.name.clone()));
                }
                if old_col.shape_differs(col) {
                    needs_rewrite = true;
                }
            }
            None if col.required => {
                add_stmts.push(DdlStatement::new(
                    DdlOp::AddColumn,
                    format!("ALTER TABLE {table} ADD COLUMN {}", col.relaxed()),
                ));
                add_stmts.push(DdlStatement::new(
                    DdlOp::Backfill,
                    format!(
                        "UPDATE {table} SET {} = {}",
                        quote_ident(&col.name),
                        col.ty.zero_literal()
                    ),
                ));
                needs_rewrite = true;
            }
            None => {
                add_stmts.push(DdlStatement::new(
                    DdlOp::AddColumn,
                    format!("ALTER TABLE {table} ADD COLUMN {col}"),
                ));
            }
        }
    }

    let removed: Vec<&str> = old_cols
        .iter()
        .filter(|(f, _)| !new_cols.iter().any(|(n, _)| n.id == f.id))
        .map(|(_, c)| c.name.as_str())
        .collect();
    if !removed.is_empty() {
        needs_rewrite = true;
    }

    let rename_stmts = order_column_moves(old, new, &removed, moves)?
        .into_iter()
        .map(|(from, to)| {
            DdlStatement::new(
                DdlOp::RenameColumn,
                format!(
                    "ALTER TABLE {table} RENAME COLUMN {} TO {}",
                    quote_ident(&from),
                    quote_ident(&to)
                ),
            )
        })
        .collect::<Vec<_>>();

    let old_indexes = effective_indexes(old)?;
    let new_indexes = effective_indexes(new)?;
    let no_renames = HashMap::new();

    let mut out = Vec::new();

    if !needs_rewrite {
        for idx in &old_indexes {
            if !has_twin(idx, &renames, &new_indexes, &no_renames) {
                out.push(DdlStatement::new(DdlOp::DropIndex, idx.drop_sql()));
            }
        }
    }

    out.extend(rename_stmts);
    out.extend(add_stmts);

    if needs_rewrite {
        out.extend(rewrite_table(physical, new));
        for idx in &new_indexes {
            out.push(DdlStatement::new(DdlOp::CreateIndex, idx.render_for(physical)));
        }
    } else {
        for idx in &new_indexes {
            if !has_twin(idx, &no_renames, &old_indexes, &renames) {
                out.push(DdlStatement::new(DdlOp::CreateIndex, idx.render_for(physical)));
            }
        }
    }

    if old.name != new.name {
        out.extend(rename_table(&old.name, &new.name));
    }

    Ok(out)
}

/// Order column renames so that no statement targets a name still in use.
///
/// Removed columns whose name is reused by `new` are parked under a
/// temporary name first; the rewrite that follows drops them. Chains run
/// back to front and cycles (including case-only renames) go through a
/// temporary name.
fn order_column_moves(
    old: &Collection,
    new: &Collection,
    removed: &[&str],
    mut pending: Vec<(String, String)>,
) -> SqlResult<Vec<(String, String)>> {
    let mut taken: HashSet<String> = table_columns(old)
        .iter()
        .map(|c| c.name.to_ascii_lowercase())
        .collect();
    let wanted: HashSet<String> = table_columns(new)
        .iter()
        .map(|c| c.name.to_ascii_lowercase())
        .collect();
    let mut out = Vec::new();

    for name in removed {
        let key = name.to_ascii_lowercase();
        if wanted.contains(&key) {
            let parked = spare_name(name, "old", &taken, &wanted);
            taken.remove(&key);
            taken.insert(parked.to_ascii_lowercase());
            out.push((name.to_string(), parked));
        }
    }

    for (from, to) in &pending {
        let target = to.to_ascii_lowercase();
        let freed = pending.iter().any(|(f, _)| f.eq_ignore_ascii_case(&target));
        if taken.contains(&target) && !freed {
            return Err(SqlError::Validation {
                field: format!("schema.{to}"),
                rule: format!("cannot rename {from} to {to}: column name already in use"),
            });
        }
    }

    while !pending.is_empty() {
        let ready = pending
            .iter()
            .position(|(_, to)| !taken.contains(&to.to_ascii_lowercase()));
        match ready {
            Some(i) => {
                let (from, to) = pending.remove(i);
                taken.remove(&from.to_ascii_lowercase());
                taken.insert(to.to_ascii_lowercase());
                out.push((from, to));
            }
            None => {
                // every target is held by another pending source: a cycle
                let from = pending[0].0.clone();
                let tmp = spare_name(&from, "tmp", &taken, &wanted);
                taken.remove(&from.to_ascii_lowercase());
                taken.insert(tmp.to_ascii_lowercase());
                pending[0].0 = tmp.clone();
                out.push((from, tmp));
            }
        }
    }
    Ok(out)
}

/// First `{name}__{tag}`, `{name}__{tag}2`, ... that is free in both sets.
fn spare_name(name: &str, tag: &str, taken: &HashSet<String>, wanted: &HashSet<String>) -> String {
    let mut n = 1;
    loop {
        let candidate = if n == 1 {
            format!("{name}__{tag}")
        } else {
            format!("{name}__{tag}{n}")
        };
        let key = candidate.to_ascii_lowercase();
        if !taken.contains(&key) && !wanted.contains(&key) {
            return candidate;
        }
        n += 1;
    }
}

/// Rebuild `physical` with the column layout of `new`, copying every row.
///
/// Assumes renames and adds already ran, so every column of `new` exists in
/// the old table under its new name.
fn rewrite_table(physical: &str, new: &Collection) -> Vec<DdlStatement> {
    let tmp = format!("{physical}__new");
    let columns = table_columns(new);
    let names = columns
        .iter()
        .map(|c| quote_ident(&c.name))
        .collect::<Vec<_>>()
        .join(", ");

    vec![
        DdlStatement::new(DdlOp::CreateTable, create_table_sql(&tmp, &columns)),
        DdlStatement::new(
            DdlOp::CopyRows,
            format!(
                "INSERT INTO {} ({names}) SELECT {names} FROM {}",
                quote_ident(&tmp),
                quote_ident(physical)
            ),
        ),
        DdlStatement::new(DdlOp::DropTable, format!("DROP TABLE {}", quote_ident(physical))),
        DdlStatement::new(
            DdlOp::RenameTable,
            format!(
                "ALTER TABLE {} RENAME TO {}",
                quote_ident(&tmp),
                quote_ident(physical)
            ),
        ),
    ]
}

/// Whether `others` holds an index with the same name and structure as `decl`.
fn has_twin(
    decl: &IndexDecl,
    decl_renames: &HashMap<String, String>,
    others: &[IndexDecl],
    other_renames: &HashMap<String, String>,
) -> bool {
    let key = decl.key();
    let fingerprint = decl.fingerprint(decl_renames);
    others
        .iter()
        .any(|o| o.key() == key && o.fingerprint(other_renames) == fingerprint)
}

fn rename_table(from: &str, to: &str) -> Vec<DdlStatement> {
    let stmt = |a: &str, b: &str| {
        DdlStatement::new(
            DdlOp::RenameTable,
            format!("ALTER TABLE {} RENAME TO {}", quote_ident(a), quote_ident(b)),
        )
    };
    if from.eq_ignore_ascii_case(to) {
        // SQLite rejects a rename that only changes case
        let tmp = format!("{to}__rename");
        vec![stmt(from, &tmp), stmt(&tmp, to)]
    } else {
        vec![stmt(from, to)]
    }
}

fn check_field_types(old: &Collection, new: &Collection) -> SqlResult<()> {
    for field in &new.fields {
        if let Some(prev) = old.field_by_id(field.id.as_str()) {
            if prev.kind.type_name() != field.kind.type_name() {
                return Err(SqlError::Validation {
                    field: format!("schema.{}", field.name),
                    rule: format!(
                        "cannot change field type from {} to {}",
                        prev.kind.type_name(),
                        field.kind.type_name()
                    ),
                });
            }
        }
    }
    Ok(())
}

/// Refuse to remove a field that a cascading relation of another collection
/// displays.
fn check_removals(old: &Collection, new: &Collection, dependents: &[Collection]) -> SqlResult<()> {
    let removed = old
        .fields
        .iter()
        .filter(|f| new.field_by_id(f.id.as_str()).is_none());

    for field in removed {
        for dep in dependents {
            for rel in &dep.fields {
                let FieldKind::Relation(opts) = &rel.kind else {
                    continue;
                };
                if opts.collection_id != old.id || !opts.cascade_delete {
                    continue;
                }
                let displayed = opts
                    .display_fields
                    .iter()
                    .flatten()
                    .any(|d| d == &field.name || field.id == d.as_str());
                if displayed {
                    return Err(SqlError::ReferentialPolicy {
                        message: format!(
                            "cannot remove {}.{}: displayed by cascading relation {}.{}",
                            old.name, field.name, dep.name, rel.name
                        ),
                    });
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "planner_test.rs"]
mod tests;
