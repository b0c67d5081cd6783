//! SQLite parsing entry points and identifier quoting

use sqlparser::ast::Statement;
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;

use crate::error::{SqlError, SqlResult};

/// Parse SQLite SQL into AST statements.
pub fn parse_sqlite(sql: &str) -> SqlResult<Vec<Statement>> {
    let sql = sql.trim();
    if sql.is_empty() {
        return Err(SqlError::EmptySql);
    }
    Parser::parse_sql(&SQLiteDialect {}, sql).map_err(|e| {
        let msg = e.to_string();
        let (line, column) = parse_location_from_error(&msg);
        SqlError::ParseError {
            message: msg,
            line,
            column,
        }
    })
}

/// Parse SQL that must contain exactly one statement.
pub fn parse_single(sql: &str) -> SqlResult<Statement> {
    let mut stmts = parse_sqlite(sql)?;
    if stmts.len() > 1 {
        return Err(SqlError::ParseError {
            message: format!("expected one statement, found {}", stmts.len()),
            line: 0,
            column: 0,
        });
    }
    stmts.pop().ok_or(SqlError::EmptySql)
}

/// Quote an identifier with double quotes, doubling embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a string literal with single quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Extract "Line: N, Column: M" from a sqlparser error message.
fn parse_location_from_error(msg: &str) -> (usize, usize) {
    let number_after = |label: &str| -> Option<usize> {
        let start = msg.find(label)? + label.len();
        let rest = &msg[start..];
        let end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        rest[..end].parse().ok()
    };
    match (number_after("Line: "), number_after("Column: ")) {
        (Some(line), Some(column)) => (line, column),
        _ => (0, 0),
    }
}

#[cfg(test)]
#[path = "dialect_test.rs"]
mod tests;
