//! Cancellation and deadline signal passed into adapter operations.
//!
//! # Responsibility
//! - Carry an optional deadline and a cancellation token from the caller.
//! - Report why the signal fired as a typed `ContextError`.
//!
//! # Invariants
//! - A derived context fires no later than its parent.
//! - Once `err()` returns `Some`, it never returns `None` again.
//! - A passed deadline takes precedence over cancellation when both hold.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Reason a context fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    DeadlineExceeded,
    Canceled,
}

impl Display for ContextError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DeadlineExceeded => write!(f, "context deadline exceeded"),
            Self::Canceled => write!(f, "context canceled"),
        }
    }
}

impl Error for ContextError {}

/// Caller-side deadline/cancellation signal.
///
/// Cloning is cheap; clones share the same cancellation state.
#[derive(Debug, Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

/// Cancels the context it was created with, and every context derived from it.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl Context {
    /// Returns a context that never fires on its own.
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Derives a context that also fires `timeout` from now.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derives a context that also fires at `deadline`.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Derives a context plus a handle that cancels it.
    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        let token = self.token.child_token();
        let handle = CancelHandle {
            token: token.clone(),
        };
        (
            Self {
                token,
                deadline: self.deadline,
            },
            handle,
        )
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the firing reason, or `None` while the context is live.
    pub fn err(&self) -> Option<ContextError> {
        if self
            .deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
        {
            return Some(ContextError::DeadlineExceeded);
        }
        if self.token.is_cancelled() {
            return Some(ContextError::Canceled);
        }
        None
    }

    /// Waits until the context fires and returns the reason.
    ///
    /// Pends forever for a background context.
    pub async fn done(&self) -> ContextError {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
        self.err().unwrap_or(ContextError::Canceled)
    }
}
