//! Identifier rules for collection and column names.

use regex::Regex;
use std::sync::OnceLock;

/// System columns every table-backed collection carries, in physical order.
pub const BASE_SYSTEM_COLUMNS: &[&str] = &["id", "created", "updated"];

/// Extra system columns owned by `auth` collections, in physical order.
pub const AUTH_SYSTEM_COLUMNS: &[&str] = &[
    "email",
    "tokenKey",
    "passwordHash",
    "verified",
    "emailVisibility",
];

/// Length of a freshly generated collection id.
pub const COLLECTION_ID_LEN: usize = 15;

static IDENT_RE: OnceLock<Regex> = OnceLock::new();

fn ident_re() -> &'static Regex {
    IDENT_RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"))
}

/// Whether `name` is usable as a SQL table or column identifier.
pub fn is_valid_identifier(name: &str) -> bool {
    ident_re().is_match(name)
}

/// Whether `s` has the shape of a generated collection id (15 alphanumerics).
///
/// Used to decide whether a name-or-id lookup tries the id first.
pub fn looks_like_collection_id(s: &str) -> bool {
    s.len() == COLLECTION_ID_LEN && s.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Whether `name` collides with a system column of a collection.
///
/// SQLite column names are case-insensitive, so the comparison is too.
pub fn is_reserved_column(name: &str, is_auth: bool) -> bool {
    let hit = |cols: &[&str]| cols.iter().any(|c| c.eq_ignore_ascii_case(name));
    hit(BASE_SYSTEM_COLUMNS) || (is_auth && hit(AUTH_SYSTEM_COLUMNS))
}
