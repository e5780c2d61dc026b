// src/engine/coordinator.rs

//! Wires the watcher's event stream to a set of executors.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::exec::{Executor, WatchEvent};
use crate::watch::DirWatcher;

/// Drive `executors` from the watcher's event stream until `shutdown`
/// fires.
///
/// For each executor this spawns one task running `start` and one task that
/// waits for shutdown and calls `stop`; the watch loop runs in a task of its
/// own. The calling task drains the event stream and fans every accepted
/// event out to all executors in registration order, without waiting for any
/// executor's restart — a slow executor never delays delivery to the others.
///
/// Returns once the event stream closes and every spawned task has finished.
pub async fn watch_and_execute(
    mut watcher: DirWatcher,
    executors: Vec<Arc<dyn Executor>>,
    shutdown: CancellationToken,
) -> Result<()> {
    let mut events = watcher
        .take_events()
        .context("the watcher's event stream was already claimed")?;

    let mut tasks = JoinSet::new();

    for (idx, executor) in executors.iter().enumerate() {
        let ex = Arc::clone(executor);
        tasks.spawn(async move {
            if let Err(err) = ex.start().await {
                error!(executor = idx, error = %err, "executor failed");
            }
            debug!(executor = idx, "executor start finished");
        });

        let ex = Arc::clone(executor);
        let stop_signal = shutdown.clone();
        tasks.spawn(async move {
            stop_signal.cancelled().await;
            if let Err(err) = ex.stop().await {
                error!(executor = idx, error = %err, "executor stop failed");
            }
            debug!(executor = idx, "executor stopped");
        });
    }

    let watch_scope = shutdown.clone();
    tasks.spawn(async move { watcher.watch(watch_scope).await });

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let mut counter: u64 = 0;

    while let Some(event) = events.recv().await {
        debug!(?event, "accepted change event");
        counter += 1;
        let shown = event.path.strip_prefix(&cwd).unwrap_or(&event.path);
        info!("[RELOADING ({counter})] due to changes in {}", shown.display());

        for executor in &executors {
            let notice = WatchEvent {
                source: event.path.clone(),
            };
            if let Err(err) = executor.on_watch_event(notice).await {
                warn!(error = %err, "executor rejected watch event");
            }
        }
    }

    while tasks.join_next().await.is_some() {}

    Ok(())
}
