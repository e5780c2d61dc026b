// src/exec/mod.rs

//! The executor contract and its implementations.
//!
//! An [`Executor`] is anything the coordinator can drive from the watcher's
//! event stream: a single command ([`CommandExecutor`]), a tree of
//! sequential/parallel command groups ([`GroupExecutor`]), or a push-style
//! notification sink ([`SseExecutor`]).

pub mod command;
pub mod group;
pub mod sse;

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Mutex;

use anyhow::Result;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

pub use command::{CommandExecutor, CommandSpec};
pub use group::{CommandGroup, GroupExecutor};
pub use sse::SseExecutor;

/// A watch event as delivered to executors (and, for the notification sink,
/// to its subscribers — one JSON object per line).
#[derive(Debug, Clone, Serialize)]
pub struct WatchEvent {
    #[serde(rename = "Source")]
    pub source: PathBuf,
}

/// Boxed future used by [`Executor`] so the trait stays object safe.
pub type ExecutorFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Anything that can be started, stopped, and notified of a watch event.
///
/// Contract:
/// - `start` blocks until the current run finishes or is cancelled.
/// - `stop` is idempotent and safe to call when nothing is running; it
///   requests cancellation and returns without waiting for teardown.
/// - `on_watch_event` restarts the executor; at most one run is active per
///   executor at any time.
pub trait Executor: Send + Sync {
    fn start(&self) -> ExecutorFuture<'_>;
    fn stop(&self) -> ExecutorFuture<'_>;
    fn on_watch_event(&self, event: WatchEvent) -> ExecutorFuture<'_>;
}

/// The cancellation scope of the executor's current run.
///
/// Each run gets a fresh child token of the executor's parent scope, so a
/// restart cancels only the run it replaces. Replacement is serialized by
/// the mutex, which is what keeps at most one run active across concurrent
/// `stop`/restart calls.
pub(crate) struct RunScope {
    parent: CancellationToken,
    current: Mutex<Option<CancellationToken>>,
}

impl RunScope {
    pub(crate) fn new(parent: CancellationToken) -> Self {
        Self {
            parent,
            current: Mutex::new(None),
        }
    }

    /// Cancel any in-flight run and open a fresh scope for a new one.
    ///
    /// Returns `None` when the parent scope is already cancelled, i.e. the
    /// program is shutting down and no new run should start.
    pub(crate) fn begin(&self) -> Option<CancellationToken> {
        if self.parent.is_cancelled() {
            return None;
        }

        let mut current = match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(old) = current.take() {
            old.cancel();
        }
        let scope = self.parent.child_token();
        *current = Some(scope.clone());
        Some(scope)
    }

    /// Cancel the in-flight run, if any. Teardown happens on the run's own
    /// call stack; this returns immediately.
    pub(crate) fn cancel(&self) {
        let mut current = match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(scope) = current.take() {
            scope.cancel();
        }
    }
}
