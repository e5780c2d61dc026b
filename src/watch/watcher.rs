// src/watch/watcher.rs

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use anyhow::{Context, Result};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::watch::filter::{ChangeEvent, ChangeOp, FilterPolicy};

/// Cooldown applied when the caller does not configure one.
const DEFAULT_COOLDOWN: Duration = Duration::from_millis(500);

/// Construction arguments for [`DirWatcher`].
#[derive(Debug, Clone, Default)]
pub struct WatcherArgs {
    /// Root directories to watch recursively. Defaults to the current
    /// working directory when empty.
    pub watch_dirs: Vec<PathBuf>,

    /// Directory names excluded from watching and from event dispatch.
    pub exclude_dirs: Vec<String>,

    /// Path suffixes whose events are dropped.
    pub ignore_suffixes: Vec<String>,

    /// When non-empty, only events for paths ending in one of these
    /// suffixes are dispatched.
    pub only_suffixes: Vec<String>,

    /// Minimum time between two dispatched events.
    pub cooldown: Option<Duration>,
}

/// Watches a growing set of directories and emits a filtered, debounced
/// stream of [`ChangeEvent`]s.
///
/// The watcher owns recursion itself: every directory is registered
/// non-recursively with the notification primitive, and directories created
/// while watching are added from inside the watch loop. Dropping the watcher
/// (which [`DirWatcher::watch`] does on shutdown) releases the primitive and
/// closes the event stream.
pub struct DirWatcher {
    watcher: RecommendedWatcher,
    policy: FilterPolicy,

    /// Directories registered so far; insertion is idempotent and only ever
    /// happens from the setup path or the watch loop itself.
    watching: HashSet<PathBuf>,
    dir_count: usize,

    raw_rx: mpsc::UnboundedReceiver<Event>,
    events_tx: mpsc::Sender<ChangeEvent>,
    events_rx: Option<mpsc::Receiver<ChangeEvent>>,
}

impl DirWatcher {
    /// Create a watcher and register all configured roots.
    ///
    /// A root that cannot be inspected or enumerated is a setup failure;
    /// the same condition during live watching is treated as a benign race.
    pub fn new(args: WatcherArgs) -> Result<Self> {
        let policy = FilterPolicy::new(
            args.exclude_dirs,
            args.ignore_suffixes,
            args.only_suffixes,
            args.cooldown.unwrap_or(DEFAULT_COOLDOWN),
        );

        // Channel from the blocking notify callback into the async world.
        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<Event>();

        // Closure called synchronously by notify whenever an event arrives.
        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if raw_tx.send(event).is_err() {
                        // The callback runs on notify's own thread, so
                        // fall back to stderr.
                        eprintln!("watchrun: failed to forward notify event: watch loop is gone");
                    }
                }
                Err(err) => {
                    eprintln!("watchrun: file watch error: {err}");
                }
            },
            Config::default(),
        )
        .context("creating filesystem watcher")?;

        let (events_tx, events_rx) = mpsc::channel::<ChangeEvent>(1);

        let mut dir_watcher = Self {
            watcher,
            policy,
            watching: HashSet::new(),
            dir_count: 0,
            raw_rx,
            events_tx,
            events_rx: Some(events_rx),
        };

        let roots = if args.watch_dirs.is_empty() {
            vec![std::env::current_dir().context("resolving current directory")?]
        } else {
            args.watch_dirs
        };
        dir_watcher.recursive_add(&roots)?;

        Ok(dir_watcher)
    }

    /// Take the output stream. The stream must be drained by exactly one
    /// consumer, so this returns `None` on every call after the first.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<ChangeEvent>> {
        self.events_rx.take()
    }

    /// Register `dirs` and all their subdirectories, skipping anything
    /// already registered and any directory whose name is excluded.
    ///
    /// Errors from stat/enumeration are propagated; this is the strict
    /// variant used during setup.
    pub fn recursive_add(&mut self, dirs: &[PathBuf]) -> Result<()> {
        for dir in dirs {
            self.add_tree(dir, true)?;
        }
        Ok(())
    }

    fn add_tree(&mut self, dir: &Path, strict: bool) -> Result<()> {
        if !self.watching.insert(dir.to_path_buf()) {
            return Ok(());
        }

        let meta = match std::fs::symlink_metadata(dir) {
            Ok(meta) => meta,
            Err(err) if strict => {
                return Err(err).with_context(|| format!("inspecting watch root {dir:?}"));
            }
            // The path vanished between the event and the stat.
            Err(_) => return Ok(()),
        };

        if !meta.is_dir() {
            return Ok(());
        }

        if let Some(name) = dir.file_name().and_then(|n| n.to_str()) {
            if self.policy.is_excluded_dir(name) {
                debug!(dir = %dir.display(), "excluded from watch set");
                return Ok(());
            }
        }

        self.register(dir);

        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if strict => {
                return Err(err).with_context(|| format!("enumerating watch root {dir:?}"));
            }
            Err(err) => {
                debug!(dir = %dir.display(), error = %err, "skipping unreadable directory");
                return Ok(());
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) if strict => {
                    return Err(err).with_context(|| format!("enumerating watch root {dir:?}"));
                }
                Err(_) => continue,
            };
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                self.add_tree(&entry.path(), strict)?;
            }
        }

        Ok(())
    }

    fn register(&mut self, dir: &Path) {
        if let Err(err) = self.watcher.watch(dir, RecursiveMode::NonRecursive) {
            // Registration failures never take the watcher down; the rest of
            // the tree is still observed.
            error!(dir = %dir.display(), error = %err, "failed to add directory to watch set");
            return;
        }
        self.dir_count += 1;
        debug!(dir = %dir.display(), count = self.dir_count, "added to watch set");
    }

    /// The main loop: classify and debounce raw events until `shutdown`
    /// fires or the notification primitive goes away.
    ///
    /// Consumes the watcher; returning drops it, which closes the output
    /// stream and releases the notification primitive.
    pub async fn watch(mut self, shutdown: CancellationToken) {
        // None until the first accepted event, so the first change is never
        // rejected by the cooldown.
        let mut last_accepted: Option<Instant> = None;

        loop {
            tokio::select! {
                maybe_event = self.raw_rx.recv() => {
                    let Some(raw) = maybe_event else {
                        debug!("raw event channel closed, watcher exiting");
                        break;
                    };
                    self.process_raw_event(raw, &mut last_accepted).await;
                }
                _ = shutdown.cancelled() => {
                    debug!("watcher is closing (shutdown requested)");
                    break;
                }
            }
        }
    }

    async fn process_raw_event(&mut self, raw: Event, last_accepted: &mut Option<Instant>) {
        debug!(event = ?raw, "received notify event");

        let op = ChangeOp::from_event_kind(&raw.kind);

        for path in &raw.paths {
            // Directories that appear while watching join the watch set
            // before any filtering, so new subtrees are never missed.
            if op == Some(ChangeOp::Create) {
                self.grow_on_create(path);
            }

            let Some(op) = op else {
                debug!(path = %path.display(), kind = ?raw.kind, "ignoring uninteresting event kind");
                continue;
            };

            if let Some(reason) = self.policy.ignore_reason(path, op) {
                debug!(path = %path.display(), %reason, "ignoring event");
                continue;
            }

            if let Some(last) = *last_accepted {
                if last.elapsed() < self.policy.cooldown() {
                    debug!(
                        path = %path.display(),
                        cooldown = ?self.policy.cooldown(),
                        "event burst within cooldown window, ignoring"
                    );
                    continue;
                }
            }
            *last_accepted = Some(Instant::now());

            let event = ChangeEvent {
                path: path.clone(),
                op,
                at: SystemTime::now(),
            };
            if self.events_tx.send(event).await.is_err() {
                debug!("event stream consumer is gone");
                return;
            }
        }
    }

    /// Live watch-set growth for a freshly created directory. All failures
    /// here are benign races and only logged.
    fn grow_on_create(&mut self, path: &Path) {
        let Ok(meta) = std::fs::metadata(path) else {
            return;
        };
        if !meta.is_dir() || self.policy.is_excluded_path(path) {
            return;
        }
        if let Err(err) = self.add_tree(path, false) {
            debug!(dir = %path.display(), error = %err, "failed to grow watch set");
        }
    }
}
