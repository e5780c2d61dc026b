// src/exec/command.rs

//! Single-command execution with process-group lifecycle.

use std::process::Stdio;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::exec::{Executor, ExecutorFuture, RunScope, WatchEvent};

/// Immutable description of one runnable command. A fresh OS process
/// descriptor is built from it on every run.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Run `command` through the platform shell.
    pub fn shell(command: &str) -> Self {
        if cfg!(windows) {
            Self::new("cmd", vec!["/C".to_string(), command.to_string()])
        } else {
            Self::new("sh", vec!["-c".to_string(), command.to_string()])
        }
    }

    /// Human-readable form for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(|s| s.as_str()))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

/// Runs one command per watch event, killing the previous run's whole
/// process group first.
pub struct CommandExecutor {
    inner: Arc<CommandRun>,
}

struct CommandRun {
    spec: CommandSpec,
    interactive: bool,
    scope: RunScope,
}

impl CommandExecutor {
    pub fn new(spec: CommandSpec, interactive: bool, parent: CancellationToken) -> Self {
        Self {
            inner: Arc::new(CommandRun {
                spec,
                interactive,
                scope: RunScope::new(parent),
            }),
        }
    }
}

impl CommandRun {
    async fn run(&self) -> Result<()> {
        let Some(scope) = self.scope.begin() else {
            return Ok(());
        };
        run_command(&self.spec, &scope, self.interactive).await
    }
}

impl Executor for CommandExecutor {
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
            debug!(
                source = %event.source.display(),
                command = %run.spec.display(),
                "restarting command"
            );
            run.scope.cancel();
            tokio::spawn(async move {
                if let Err(err) = run.run().await {
                    warn!(command = %run.spec.display(), error = %err, "command run failed");
                }
            });
            Ok(())
        })
    }
}

/// Spawn `spec` as the leader of a new process group and drive it until it
/// exits or `scope` is cancelled.
///
/// Whatever happens, the whole group is signalled before this returns, so
/// descendants never outlive a run. A non-zero exit is an error; a zero exit
/// and a cancelled run both count as success.
pub(crate) async fn run_command(
    spec: &CommandSpec,
    scope: &CancellationToken,
    interactive: bool,
) -> Result<()> {
    if scope.is_cancelled() {
        return Ok(());
    }

    let mut cmd = spec.command();
    cmd.kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
    if interactive {
        cmd.stdin(Stdio::inherit());
    }

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning '{}'", spec.display()))?;
    let pid = child.id();
    debug!(pid, command = %spec.display(), "process started");

    #[cfg(unix)]
    if interactive {
        if let Some(pid) = pid {
            give_terminal_foreground(nix::unistd::Pid::from_raw(pid as i32));
        }
    }

    let exit = tokio::select! {
        status = child.wait() => {
            Some(status.with_context(|| format!("waiting for '{}'", spec.display()))?)
        }
        _ = scope.cancelled() => {
            debug!(pid, command = %spec.display(), "run cancelled");
            None
        }
    };

    #[cfg(unix)]
    if interactive {
        // The user was watching this command on our terminal; notify the
        // hosting process so the surrounding program can wind down too.
        if let Err(err) =
            nix::sys::signal::kill(nix::unistd::Pid::this(), nix::sys::signal::Signal::SIGTERM)
        {
            warn!(error = %err, "failed to signal own process after interactive command");
        }
    }

    #[cfg(unix)]
    if let Some(pid) = pid {
        kill_process_group(nix::unistd::Pid::from_raw(pid as i32))?;
    }
    #[cfg(not(unix))]
    if exit.is_none() {
        let _ = child.kill().await;
    }

    if exit.is_none() {
        // Reap the direct child after the group kill so no zombie lingers.
        let _ = child.wait().await;
    }

    match exit {
        Some(status) if !status.success() => Err(anyhow!(
            "command '{}' exited with {}",
            spec.display(),
            status
        )),
        _ => {
            debug!(pid, command = %spec.display(), "command fully processed");
            Ok(())
        }
    }
}

/// SIGKILL the whole process group. Killing an already-gone group is not an
/// error.
#[cfg(unix)]
fn kill_process_group(pgid: nix::unistd::Pid) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};

    debug!(pid = pgid.as_raw(), "killing process group");
    match killpg(pgid, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(err) => Err(anyhow!(
            "failed to kill process group {}: {err}",
            pgid.as_raw()
        )),
    }
}

/// Hand the controlling terminal's foreground to the command's process
/// group. Fails quietly when stdin is not a terminal.
#[cfg(unix)]
fn give_terminal_foreground(pgid: nix::unistd::Pid) {
    if let Err(err) = nix::unistd::tcsetpgrp(std::io::stdin(), pgid) {
        debug!(error = %err, "failed to hand terminal foreground to command");
    }
}
