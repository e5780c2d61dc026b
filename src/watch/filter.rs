// src/watch/filter.rs

//! Event classification for the directory watcher.
//!
//! A raw notification only reaches the executors when it survives every rule
//! in [`FilterPolicy::ignore_reason`] and the global cooldown window kept by
//! the watch loop.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use notify::event::{EventKind, ModifyKind};

/// Directory names that are never worth watching, unless the user overrides
/// the list from the CLI.
pub const DEFAULT_IGNORE_DIRS: &[&str] = &[
    ".git", ".svn", ".hg", // version control
    ".idea", ".vscode", // IDEs
    ".direnv",      // direnv nix
    "node_modules", // node
    ".DS_Store",    // macOS
    ".log",         // logs
];

/// Vim/Neovim creates this file to probe whether a directory is writable.
/// It would otherwise look like a legitimate change on every save.
const VIM_PROBE_FILE: &str = "4913";

/// The kind of filesystem change, reduced to the operations the watcher
/// reasons about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOp {
    Create,
    Write,
    Remove,
    Rename,
    Chmod,
}

impl ChangeOp {
    /// Map a raw notify event kind onto a [`ChangeOp`].
    ///
    /// Returns `None` for kinds that carry no signal for us (access events,
    /// unclassified noise).
    pub fn from_event_kind(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(ChangeOp::Create),
            EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => {
                Some(ChangeOp::Write)
            }
            EventKind::Modify(ModifyKind::Name(_)) => Some(ChangeOp::Rename),
            EventKind::Modify(ModifyKind::Metadata(_)) => Some(ChangeOp::Chmod),
            EventKind::Remove(_) => Some(ChangeOp::Remove),
            _ => None,
        }
    }
}

/// One accepted change, as emitted on the watcher's output stream.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub op: ChangeOp,
    pub at: SystemTime,
}

/// Immutable per-watcher filter configuration.
#[derive(Debug, Clone)]
pub struct FilterPolicy {
    exclude_dirs: HashSet<String>,
    ignore_suffixes: Vec<String>,
    only_suffixes: Vec<String>,
    cooldown: Duration,
}

impl FilterPolicy {
    pub fn new(
        exclude_dirs: Vec<String>,
        ignore_suffixes: Vec<String>,
        only_suffixes: Vec<String>,
        cooldown: Duration,
    ) -> Self {
        Self {
            exclude_dirs: exclude_dirs.into_iter().collect(),
            ignore_suffixes,
            only_suffixes,
            cooldown,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Whether a directory base name is on the exclude list. Used when
    /// growing the watch set, so excluded subtrees are never registered.
    pub fn is_excluded_dir(&self, base_name: &str) -> bool {
        self.exclude_dirs.contains(base_name)
    }

    /// Whether any excluded directory name occurs somewhere in the path.
    pub fn is_excluded_path(&self, path: &Path) -> bool {
        let text = path.to_string_lossy();
        self.exclude_dirs.iter().any(|dir| text.contains(dir.as_str()))
    }

    /// Decide whether an event must be dropped. Returns the reason, or
    /// `None` when the event should be forwarded (cooldown permitting).
    pub fn ignore_reason(&self, path: &Path, op: ChangeOp) -> Option<String> {
        // Any file change emits a chain of events, but a logical save always
        // produces a write somewhere in that chain; everything else is noise.
        if op != ChangeOp::Write {
            return Some(format!("event ({op:?}) is not a write"));
        }

        let base = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if base == VIM_PROBE_FILE {
            return Some("temporary file created by vim/neovim".to_string());
        }

        let text = path.to_string_lossy();

        // Editor backup files, e.g. `main.go~`.
        if text.ends_with('~') {
            return Some("editor backup file".to_string());
        }

        for dir in &self.exclude_dirs {
            if text.contains(dir.as_str()) {
                return Some(format!("path is under excluded directory '{dir}'"));
            }
        }

        for suffix in &self.ignore_suffixes {
            if text.ends_with(suffix.as_str()) {
                return Some(format!("suffix '{suffix}' is on the ignore list"));
            }
        }

        if self.only_suffixes.is_empty() {
            return None;
        }

        if self
            .only_suffixes
            .iter()
            .any(|suffix| text.ends_with(suffix.as_str()))
        {
            None
        } else {
            Some("suffix is not on the watched suffix list".to_string())
        }
    }
}
