// src/exec/group.rs

//! Recursive command-group scheduling.
//!
//! A [`CommandGroup`] is a tree: direct commands plus nested subgroups, with
//! a per-node execution mode. Sequential nodes run their direct commands in
//! declared order and halt on the first failure; nested subgroups still
//! follow, after the direct commands, in declared order. Parallel nodes run
//! every command and subgroup concurrently and never let one branch take
//! down its siblings.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::exec::command::{run_command, CommandSpec};
use crate::exec::{Executor, ExecutorFuture, RunScope, WatchEvent};

/// A tree node of the command pipeline.
#[derive(Debug, Clone, Default)]
pub struct CommandGroup {
    pub commands: Vec<CommandSpec>,
    pub groups: Vec<CommandGroup>,
    pub parallel: bool,
}

impl CommandGroup {
    /// A flat group running `commands` one after another.
    pub fn sequential(commands: Vec<CommandSpec>) -> Self {
        Self {
            commands,
            groups: Vec::new(),
            parallel: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.groups.is_empty()
    }
}

/// Exposes a whole [`CommandGroup`] tree as one restartable [`Executor`].
///
/// Every branch of a run shares the run's cancellation scope, so `stop`
/// cancels all in-flight leaves, not just the most recent one.
pub struct GroupExecutor {
    inner: Arc<GroupRun>,
}

struct GroupRun {
    group: CommandGroup,
    interactive: bool,
    scope: RunScope,
}

impl GroupExecutor {
    pub fn new(group: CommandGroup, interactive: bool, parent: CancellationToken) -> Self {
        Self {
            inner: Arc::new(GroupRun {
                group,
                interactive,
                scope: RunScope::new(parent),
            }),
        }
    }
}

impl GroupRun {
    async fn run(&self) -> Result<()> {
        let Some(scope) = self.scope.begin() else {
            return Ok(());
        };
        run_group(self.group.clone(), scope, self.interactive).await
    }
}

impl Executor for GroupExecutor {
    fn start(&self) -> ExecutorFuture<'_> {
        let run = Arc::clone(&self.inner);
        Box::pin(async move { run.run().await })
    }

    fn stop(&self) -> ExecutorFuture<'_> {
        let run = Arc::clone(&self.inner);
        Box::pin(async move {
            run.scope.cancel();
            Ok(())
        })
    }

    fn on_watch_event(&self, event: WatchEvent) -> ExecutorFuture<'_> {
        let run = Arc::clone(&self.inner);
        Box::pin(async move {
            debug!(source = %event.source.display(), "restarting command group");
            run.scope.cancel();
            tokio::spawn(async move {
                if let Err(err) = run.run().await {
                    warn!(error = %err, "command group run failed");
                }
            });
            Ok(())
        })
    }
}

/// Run one group node. Boxed so the recursion through nested groups has a
/// finite future type.
fn run_group(
    group: CommandGroup,
    scope: CancellationToken,
    interactive: bool,
) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
    Box::pin(async move {
        if group.is_empty() {
            return Ok(());
        }
        if group.parallel {
            run_parallel(group, scope).await
        } else {
            run_sequential(group, scope, interactive).await
        }
    })
}

async fn run_sequential(
    group: CommandGroup,
    scope: CancellationToken,
    interactive: bool,
) -> Result<()> {
    let mut group_err: Option<anyhow::Error> = None;

    for spec in &group.commands {
        if scope.is_cancelled() {
            return Ok(());
        }
        if let Err(err) = run_command(spec, &scope, interactive).await {
            warn!(
                command = %spec.display(),
                error = %err,
                "command failed, skipping the remaining commands of this group"
            );
            group_err = Some(err);
            break;
        }
    }

    // Nested groups follow the direct commands, in declared order, even
    // when a command above already failed.
    for sub in group.groups {
        if scope.is_cancelled() {
            return Ok(());
        }
        if let Err(err) = run_group(sub, scope.clone(), interactive).await {
            if group_err.is_none() {
                group_err = Some(err);
                break;
            }
            warn!(error = %err, "nested group failed");
        }
    }

    match group_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

async fn run_parallel(group: CommandGroup, scope: CancellationToken) -> Result<()> {
    let mut branches: JoinSet<(String, Result<()>)> = JoinSet::new();

    for spec in group.commands {
        let scope = scope.clone();
        branches.spawn(async move {
            let label = spec.display();
            let result = run_command(&spec, &scope, false).await;
            (label, result)
        });
    }
    for sub in group.groups {
        let scope = scope.clone();
        branches.spawn(async move {
            let result = run_group(sub, scope, false).await;
            ("nested group".to_string(), result)
        });
    }

    // Wait for every branch; one branch failing never cancels the others.
    while let Some(joined) = branches.join_next().await {
        match joined {
            Ok((_, Ok(()))) => {}
            Ok((branch, Err(err))) => {
                warn!(branch = %branch, error = %err, "parallel branch failed");
            }
            Err(err) => {
                warn!(error = %err, "parallel branch panicked");
            }
        }
    }

    Ok(())
}
