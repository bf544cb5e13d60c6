//! Run-under-context execution wrapper.
//!
//! # Responsibility
//! - Start a store operation as detached blocking work.
//! - Race its completion against the caller's `Context`.
//!
//! # Invariants
//! - This cancels the wait, not the work. A dispatched operation always runs to
//!   completion; SQLite I/O cannot be interrupted. When the context wins, the
//!   operation keeps running in the background and its outcome is discarded.
//! - Anything torn down after a timed-out call (connection, adapter) may still
//!   be touched by that background operation. `Executor::drain` waits for it.
//! - An already-fired context is reported without starting the operation.
//! - Invocations share nothing except the task tracker used for draining.
//!   Concurrent drains are serialized.

use crate::context::Context;
use crate::error::{AdapterError, AdapterResult};
use log::{debug, warn};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::task::TaskTracker;

/// Execution strategy injected into the adapter.
///
/// Tests substitute slow or instrumented strategies through this seam.
pub trait Executor: Send + Sync + 'static {
    /// Runs `op` under `ctx`, returning whichever of the two finishes first.
    fn execute<'a, T, F>(
        &'a self,
        ctx: &'a Context,
        op: F,
    ) -> impl Future<Output = AdapterResult<T>> + Send + 'a
    where
        T: Send + 'static,
        F: FnOnce() -> AdapterResult<T> + Send + 'static;

    /// Waits until every operation started so far, including abandoned ones,
    /// has finished.
    fn drain(&self) -> impl Future<Output = ()> + Send + '_;
}

/// Runs operations on tokio's blocking pool.
///
/// Clones share the tracker, so draining any clone waits for all of them.
#[derive(Debug, Clone, Default)]
pub struct BlockingExecutor {
    tracker: TaskTracker,
    // close/wait/reopen must not interleave between concurrent drains
    drain_lock: Arc<Mutex<()>>,
}

impl BlockingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of operations still running, abandoned ones included.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }
}

impl Executor for BlockingExecutor {
    fn execute<'a, T, F>(
        &'a self,
        ctx: &'a Context,
        op: F,
    ) -> impl Future<Output = AdapterResult<T>> + Send + 'a
    where
        T: Send + 'static,
        F: FnOnce() -> AdapterResult<T> + Send + 'static,
    {
        execute_with_context(ctx, &self.tracker, op)
    }

    fn drain(&self) -> impl Future<Output = ()> + Send + '_ {
        async move {
            let _guard = self.drain_lock.lock().await;
            self.tracker.close();
            self.tracker.wait().await;
            self.tracker.reopen();
        }
    }
}

/// Races `op` against `ctx`.
///
/// Returns the operation's own result when it finishes first, or the context
/// error as soon as the context fires. The blocking task is never aborted.
pub async fn execute_with_context<T, F>(
    ctx: &Context,
    tracker: &TaskTracker,
    op: F,
) -> AdapterResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> AdapterResult<T> + Send + 'static,
{
    if let Some(err) = ctx.err() {
        debug!("event=execute module=execute status=skipped reason={err}");
        return Err(AdapterError::Context(err));
    }

    let abandoned = Arc::new(AtomicBool::new(false));
    let task_abandoned = Arc::clone(&abandoned);
    let token = tracker.token();
    let handle = tokio::task::spawn_blocking(move || {
        let _token = token;
        let result = op();
        if task_abandoned.load(Ordering::Acquire) {
            match &result {
                Ok(_) => debug!("event=execute module=execute status=discarded outcome=ok"),
                Err(err) => debug!(
                    "event=execute module=execute status=discarded outcome=error error={err}"
                ),
            }
        }
        result
    });

    tokio::select! {
        biased;
        err = ctx.done() => {
            abandoned.store(true, Ordering::Release);
            warn!("event=execute module=execute status=abandoned reason={err}");
            Err(AdapterError::Context(err))
        }
        joined = handle => match joined {
            Ok(result) => result,
            Err(err) => Err(AdapterError::Execution(err.to_string())),
        },
    }
}
