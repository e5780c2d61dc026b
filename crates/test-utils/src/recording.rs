use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use watchrun::exec::{Executor, ExecutorFuture, WatchEvent};

/// One observed call on a [`RecordingExecutor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    Started,
    Stopped,
    Event(PathBuf),
}

/// A fake executor that records every call made to it.
///
/// Useful for coordinator tests: assert that `start` ran, that each accepted
/// event was fanned out, and that shutdown produced a `stop`.
pub struct RecordingExecutor {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl RecordingExecutor {
    pub fn new(calls: Arc<Mutex<Vec<RecordedCall>>>) -> Self {
        Self { calls }
    }

    fn record(&self, call: RecordedCall) {
        let mut guard = self.calls.lock().unwrap();
        guard.push(call);
    }
}

impl Executor for RecordingExecutor {
    fn start(&self) -> ExecutorFuture<'_> {
        self.record(RecordedCall::Started);
        Box::pin(async { Ok(()) })
    }

    fn stop(&self) -> ExecutorFuture<'_> {
        self.record(RecordedCall::Stopped);
        Box::pin(async { Ok(()) })
    }

    fn on_watch_event(&self, event: WatchEvent) -> ExecutorFuture<'_> {
        self.record(RecordedCall::Event(event.source));
        Box::pin(async { Ok(()) })
    }
}
