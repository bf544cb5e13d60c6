//! Policy table naming and idempotent schema sync.
//!
//! # Responsibility
//! - Validate the (optionally prefixed) policy table name.
//! - Create the flat `(id, ptype, v0..v5)` table when it is absent.
//!
//! # Invariants
//! - `ensure_rule_table` is safe to run any number of times.
//! - Existing rows are never touched by schema sync.

use crate::db::StoreResult;
use crate::model::rule::RuleValidationError;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Connection;
use std::fmt::{Display, Formatter};

/// Table name used when the caller does not pick one.
pub const DEFAULT_TABLE_NAME: &str = "casbin_rule";

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Validated SQL identifier of the policy table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName(String);

impl TableName {
    /// Joins `prefix` and `name`; an empty `name` falls back to the default.
    ///
    /// # Errors
    /// - `InvalidTableName` when the result is not a plain identifier.
    pub fn new(prefix: &str, name: &str) -> Result<Self, RuleValidationError> {
        let name = if name.trim().is_empty() {
            DEFAULT_TABLE_NAME
        } else {
            name.trim()
        };
        let full = format!("{}{}", prefix.trim(), name);
        if !IDENTIFIER_RE.is_match(&full) {
            return Err(RuleValidationError::InvalidTableName(full));
        }
        Ok(Self(full))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TableName {
    fn default() -> Self {
        Self(DEFAULT_TABLE_NAME.to_string())
    }
}

impl Display for TableName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Creates the policy table and its ptype index if they do not exist.
pub fn ensure_rule_table(conn: &Connection, table: &TableName) -> StoreResult<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ptype TEXT NOT NULL DEFAULT '',
            v0 TEXT NOT NULL DEFAULT '',
            v1 TEXT NOT NULL DEFAULT '',
            v2 TEXT NOT NULL DEFAULT '',
            v3 TEXT NOT NULL DEFAULT '',
            v4 TEXT NOT NULL DEFAULT '',
            v5 TEXT NOT NULL DEFAULT ''
        );
        CREATE INDEX IF NOT EXISTS idx_{table}_ptype ON {table} (ptype);"
    ))?;
    Ok(())
}

/// Returns whether a table with the given name exists.
pub fn table_exists(conn: &Connection, table: &str) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}
