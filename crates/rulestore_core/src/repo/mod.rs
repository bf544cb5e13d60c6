//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the row-level store contract the adapter drives.
//! - Isolate SQLite query details from adapter orchestration.
//!
//! # Invariants
//! - Repository calls are synchronous and run on blocking tasks.
//! - Repository APIs validate nothing the adapter already validated; they
//!   report store failures only.

pub mod rule_repo;
