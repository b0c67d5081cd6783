//! Catalog queries against `sqlite_master` and pragmas.

use crate::error::DbResult;
use rusqlite::{Connection, OptionalExtension};

/// Whether a table or view called `name` exists (case-insensitive).
pub fn table_exists(conn: &Connection, name: &str) -> DbResult<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1 COLLATE NOCASE",
            [name],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// The `CREATE` statement SQLite stored for a table, view or index.
pub fn table_sql(conn: &Connection, name: &str) -> DbResult<Option<String>> {
    let sql = conn
        .query_row(
            "SELECT sql FROM sqlite_master WHERE name = ?1 COLLATE NOCASE",
            [name],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()?;
    Ok(sql.flatten())
}

/// Column names of a table in physical order.
pub fn column_names(conn: &Connection, table: &str) -> DbResult<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
    let names = stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

/// Names of the explicitly created indexes on `table`, sorted.
pub fn index_names(conn: &Connection, table: &str) -> DbResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master \
         WHERE type = 'index' AND tbl_name = ?1 COLLATE NOCASE AND sql IS NOT NULL \
         ORDER BY name",
    )?;
    let names = stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

/// Run `PRAGMA integrity_check` and return the reported problems.
///
/// An empty vector means the database is consistent.
pub fn integrity_check(conn: &Connection) -> DbResult<Vec<String>> {
    let mut stmt = conn.prepare("PRAGMA integrity_check")?;
    let lines = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(lines.into_iter().filter(|l| l != "ok").collect())
}

/// Number of rows in `table`.
pub fn row_count(conn: &Connection, table: &str) -> DbResult<i64> {
    let sql = format!("SELECT COUNT(*) FROM \"{}\"", table.replace('"', "\"\""));
    Ok(conn.query_row(&sql, [], |row| row.get(0))?)
}
