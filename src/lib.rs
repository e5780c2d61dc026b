// src/lib.rs

pub mod cli;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod watch;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cli::CliArgs;
use crate::errors::WatchrunError;
use crate::exec::{CommandGroup, CommandSpec, Executor, GroupExecutor, SseExecutor};
use crate::watch::{DirWatcher, WatcherArgs, DEFAULT_IGNORE_DIRS};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - filter policy + watcher construction
/// - the command group (or the notification sink)
/// - Ctrl-C / SIGTERM handling
/// - the coordinator loop
pub async fn run(args: CliArgs) -> Result<()> {
    let cooldown = cli::parse_duration(&args.cooldown).map_err(WatchrunError::Config)?;

    let (watch_dirs, excluded_from_watch) = split_prefixed(&args.watch);
    let (only_suffixes, ignore_suffixes) = split_prefixed(&args.ext);

    let mut exclude_dirs = excluded_from_watch;
    if args.ignore_list.is_empty() {
        exclude_dirs.extend(DEFAULT_IGNORE_DIRS.iter().map(|s| s.to_string()));
    } else {
        exclude_dirs.extend(args.ignore_list.iter().cloned());
    }

    let watcher = DirWatcher::new(WatcherArgs {
        watch_dirs: watch_dirs.into_iter().map(PathBuf::from).collect(),
        exclude_dirs,
        ignore_suffixes,
        only_suffixes,
        cooldown: Some(cooldown),
    })?;

    let shutdown = CancellationToken::new();
    spawn_signal_listener(shutdown.clone());

    let executor: Arc<dyn Executor> = if args.sse {
        let addr: SocketAddr = args.sse_addr.parse().map_err(|_| {
            WatchrunError::Config(format!("invalid --sse-addr '{}'", args.sse_addr))
        })?;
        Arc::new(SseExecutor::new(addr, shutdown.clone()))
    } else {
        let group = command_group_from_args(&args)?;
        Arc::new(GroupExecutor::new(group, args.interactive, shutdown.clone()))
    };

    engine::watch_and_execute(watcher, vec![executor], shutdown).await
}

/// Split a flag list into (plain values, values that carried a '-' prefix).
fn split_prefixed(values: &[String]) -> (Vec<String>, Vec<String>) {
    let mut keep = Vec::new();
    let mut negated = Vec::new();
    for value in values {
        match value.strip_prefix('-') {
            Some(rest) => negated.push(rest.to_string()),
            None => keep.push(value.clone()),
        }
    }
    (keep, negated)
}

/// Build the top-level command group from `--command` occurrences and the
/// trailing argv.
fn command_group_from_args(args: &CliArgs) -> Result<CommandGroup> {
    let mut commands: Vec<CommandSpec> = args
        .commands
        .iter()
        .map(|command| CommandSpec::shell(command))
        .collect();

    if !args.exec.is_empty() {
        commands.push(CommandSpec::new(
            args.exec[0].clone(),
            args.exec[1..].to_vec(),
        ));
    }

    if commands.is_empty() {
        return Err(WatchrunError::Config(
            "no command given; pass one after `--` or via --command".to_string(),
        )
        .into());
    }

    Ok(CommandGroup {
        commands,
        groups: Vec::new(),
        parallel: args.parallel,
    })
}

/// Cancel `shutdown` on Ctrl-C or, on Unix, SIGTERM.
fn spawn_signal_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        res = ctrl_c => {
                            if let Err(err) = res {
                                eprintln!("failed to listen for Ctrl+C: {err}");
                            }
                        }
                        _ = term.recv() => {}
                    }
                }
                Err(err) => {
                    eprintln!("failed to listen for SIGTERM: {err}");
                    if let Err(err) = ctrl_c.await {
                        eprintln!("failed to listen for Ctrl+C: {err}");
                    }
                }
            }
        }

        #[cfg(not(unix))]
        if let Err(err) = ctrl_c.await {
            eprintln!("failed to listen for Ctrl+C: {err}");
        }

        debug!("shutdown signal received");
        shutdown.cancel();
    });
}
