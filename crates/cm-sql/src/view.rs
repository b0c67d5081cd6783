//! View collection queries

use crate::dialect::parse_single;
use crate::error::{SqlError, SqlResult};
use sqlparser::ast::{
    visit_expressions_mut, visit_relations, visit_relations_mut, Expr, ObjectNamePart, Statement,
};
use std::collections::BTreeSet;
use std::ops::ControlFlow;

/// Check that `query` is a single SELECT and return the lowercased names of
/// the tables and views it reads from.
pub fn view_dependencies(query: &str) -> SqlResult<BTreeSet<String>> {
    let stmt = parse_single(query)?;
    if !matches!(stmt, Statement::Query(_)) {
        return Err(SqlError::Validation {
            field: "options.query".to_string(),
            rule: "view query must be a SELECT".to_string(),
        });
    }

    let mut deps = BTreeSet::new();
    let _ = visit_relations(&stmt, |relation| {
        if let Some(ObjectNamePart::Identifier(ident)) = relation.0.last() {
            deps.insert(ident.value.to_ascii_lowercase());
        }
        ControlFlow::<()>::Continue(())
    });
    Ok(deps)
}

/// Rewrite `query` so every reference to table `from` names `to` instead.
///
/// Covers relations in FROM/JOIN and `table.column` qualifiers.
pub fn rename_relation(query: &str, from: &str, to: &str) -> SqlResult<String> {
    let mut stmt = parse_single(query)?;
    let _ = visit_relations_mut(&mut stmt, |relation| {
        if let Some(ObjectNamePart::Identifier(ident)) = relation.0.last_mut() {
            if ident.value.eq_ignore_ascii_case(from) {
                ident.value = to.to_string();
            }
        }
        ControlFlow::<()>::Continue(())
    });
    let _ = visit_expressions_mut(&mut stmt, |expr| {
        if let Expr::CompoundIdentifier(parts) = expr {
            let qualifier = parts.len().checked_sub(2).and_then(|i| parts.get_mut(i));
            if let Some(ident) = qualifier.filter(|i| i.value.eq_ignore_ascii_case(from)) {
                ident.value = to.to_string();
            }
        }
        ControlFlow::<()>::Continue(())
    });
    Ok(stmt.to_string())
}
