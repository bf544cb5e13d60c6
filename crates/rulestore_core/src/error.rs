//! Adapter-level error taxonomy.
//!
//! # Invariants
//! - Context failures, store failures and validation failures stay distinct
//!   variants; callers branch on kind, never on message text.
//! - `Context` displays exactly as the underlying `ContextError`.

use crate::context::ContextError;
use crate::db::StoreError;
use crate::model::rule::RuleValidationError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type AdapterResult<T> = Result<T, AdapterError>;

/// Error returned by every adapter operation.
#[derive(Debug)]
pub enum AdapterError {
    /// The caller's context fired before the operation reported back.
    Context(ContextError),
    /// Driver, transaction or SQL failure.
    Store(StoreError),
    /// Malformed input rejected before any store work.
    Validation(RuleValidationError),
    /// The operation died (panicked) before producing a result.
    Execution(String),
}

impl AdapterError {
    pub fn is_context(&self) -> bool {
        matches!(self, Self::Context(_))
    }

    pub fn is_store(&self) -> bool {
        matches!(self, Self::Store(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns the context reason when this is a context failure.
    pub fn context_error(&self) -> Option<ContextError> {
        match self {
            Self::Context(err) => Some(*err),
            _ => None,
        }
    }
}

impl Display for AdapterError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Context(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::Execution(message) => write!(f, "operation failed to complete: {message}"),
        }
    }
}

impl Error for AdapterError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Context(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::Execution(_) => None,
        }
    }
}

impl From<ContextError> for AdapterError {
    fn from(value: ContextError) -> Self {
        Self::Context(value)
    }
}

impl From<StoreError> for AdapterError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<RuleValidationError> for AdapterError {
    fn from(value: RuleValidationError) -> Self {
        Self::Validation(value)
    }
}
