//! Policy data model shared by the repository and the adapter.
//!
//! # Responsibility
//! - Define the persisted row shape and its token conversions.
//! - Define the engine-side model contract the adapter reads and fills.
//!
//! # Invariants
//! - Rows are never updated in place; mutation is delete + insert.
//!
//! # See also
//! - src/repo/rule_repo.rs

pub mod filter;
pub mod policy;
pub mod rule;
