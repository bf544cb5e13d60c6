//! SQLite store bootstrap and policy table schema sync.
//!
//! # Responsibility
//! - Resolve a driver identifier and connection string into a connection.
//! - Ensure the single flat policy table exists before first use.
//!
//! # Invariants
//! - Only SQLite drivers are accepted; other identifiers are rejected up front.
//! - Table names reaching SQL text are validated identifiers.
//!
//! # See also
//! - src/repo/rule_repo.rs

use std::error::Error;
use std::fmt::{Display, Formatter};

mod open;
pub mod schema;

pub use open::{open_store, StoreTarget};
pub use schema::{ensure_rule_table, table_exists, TableName, DEFAULT_TABLE_NAME};

pub type StoreResult<T> = Result<T, StoreError>;

/// Failures raised by the store collaborator.
#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    UnsupportedDriver(String),
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedDriver(driver) => {
                write!(f, "unsupported store driver `{driver}`; expected sqlite|sqlite3")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted rule data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedDriver(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
