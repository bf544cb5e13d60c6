//! Connection bootstrap for the policy store.
//!
//! # Responsibility
//! - Map a driver identifier and connection string to a SQLite target.
//! - Open and configure the connection shared by adapter calls.
//!
//! # Invariants
//! - Returned connections have a busy timeout configured.
//! - Schema sync is not done here; the repository runs it lazily on first use.
//!
//! # See also
//! - src/logging.rs

use super::{StoreError, StoreResult};
use log::{error, info};
use rusqlite::Connection;
use std::path::PathBuf;
use std::time::{Duration, Instant};

const MEMORY_DSN: &str = ":memory:";

/// Where the SQLite database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreTarget {
    Memory,
    File(PathBuf),
}

impl StoreTarget {
    /// Resolves `driver` + `dsn` into a target.
    ///
    /// # Errors
    /// - `UnsupportedDriver` for anything other than `sqlite`/`sqlite3`.
    /// - `InvalidData` for an empty connection string.
    pub fn parse(driver: &str, dsn: &str) -> StoreResult<Self> {
        match driver.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => {}
            other => return Err(StoreError::UnsupportedDriver(other.to_string())),
        }

        let dsn = dsn.trim();
        let path = dsn.strip_prefix("sqlite://").unwrap_or(dsn);
        match path {
            "" => Err(StoreError::InvalidData(
                "connection string must not be empty".to_string(),
            )),
            MEMORY_DSN => Ok(Self::Memory),
            path => Ok(Self::File(PathBuf::from(path))),
        }
    }

    fn mode(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File(_) => "file",
        }
    }
}

/// Opens the store described by `driver` and `dsn`.
///
/// # Side effects
/// - Creates the database file when it does not exist.
/// - Emits `store_open` logging events with duration and status.
pub fn open_store(driver: &str, dsn: &str, busy_timeout: Duration) -> StoreResult<Connection> {
    let target = StoreTarget::parse(driver, dsn)?;
    let started_at = Instant::now();
    let mode = target.mode();
    info!("event=store_open module=db status=start mode={mode}");

    let opened = match &target {
        StoreTarget::Memory => Connection::open_in_memory(),
        StoreTarget::File(path) => Connection::open(path),
    };
    let conn = match opened.and_then(|conn| conn.busy_timeout(busy_timeout).map(|()| conn)) {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=store_open module=db status=error mode={mode} duration_ms={} error_code=store_open_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    info!(
        "event=store_open module=db status=ok mode={mode} duration_ms={}",
        started_at.elapsed().as_millis()
    );
    Ok(conn)
}
