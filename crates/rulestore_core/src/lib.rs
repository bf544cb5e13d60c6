//! Relational persistence for authorization policy rules.
//!
//! Every adapter operation runs as one store transaction raced against a
//! caller-supplied `Context`. A fired context stops the caller's wait, never
//! the store's work.

pub mod adapter;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod execute;
pub mod logging;
pub mod model;
pub mod repo;

pub use adapter::ContextAdapter;
pub use config::AdapterConfig;
pub use context::{CancelHandle, Context, ContextError};
pub use db::{StoreError, StoreResult, TableName};
pub use error::{AdapterError, AdapterResult};
pub use execute::{execute_with_context, BlockingExecutor, Executor};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::filter::RuleFilter;
pub use model::policy::{MemoryModel, PolicyModel};
pub use model::rule::{PolicyRow, RuleValidationError, FIELD_COUNT};
pub use repo::rule_repo::{RuleRepository, SqliteRuleRepository};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
