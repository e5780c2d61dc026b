// src/watch/mod.rs

pub mod filter;
pub mod watcher;

pub use filter::{ChangeEvent, ChangeOp, FilterPolicy, DEFAULT_IGNORE_DIRS};
pub use watcher::{DirWatcher, WatcherArgs};
