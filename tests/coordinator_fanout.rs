use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use watchrun::engine::watch_and_execute;
use watchrun::exec::Executor;
use watchrun::watch::{DirWatcher, WatcherArgs};
use watchrun_test_utils::{init_tracing, RecordedCall, RecordingExecutor};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn events_fan_out_to_every_executor_and_shutdown_stops_them() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;

    let watcher = DirWatcher::new(WatcherArgs {
        watch_dirs: vec![dir.path().to_path_buf()],
        cooldown: Some(Duration::from_millis(10)),
        ..Default::default()
    })?;

    let calls_a = Arc::new(Mutex::new(Vec::new()));
    let calls_b = Arc::new(Mutex::new(Vec::new()));
    let executors: Vec<Arc<dyn Executor>> = vec![
        Arc::new(RecordingExecutor::new(Arc::clone(&calls_a))),
        Arc::new(RecordingExecutor::new(Arc::clone(&calls_b))),
    ];

    let shutdown = CancellationToken::new();
    let coordinator = tokio::spawn(watch_and_execute(
        watcher,
        executors,
        shutdown.clone(),
    ));

    tokio::time::sleep(Duration::from_millis(300)).await;
    std::fs::write(dir.path().join("change.txt"), b"touch")?;
    tokio::time::sleep(Duration::from_millis(500)).await;

    shutdown.cancel();
    timeout(Duration::from_secs(5), coordinator).await???;

    for calls in [&calls_a, &calls_b] {
        let calls = calls.lock().unwrap().clone();

        assert_eq!(calls.first(), Some(&RecordedCall::Started));
        assert!(
            calls.iter().any(|call| matches!(
                call,
                RecordedCall::Event(path) if path.ends_with("change.txt")
            )),
            "missing event in {calls:?}"
        );
        assert!(calls.contains(&RecordedCall::Stopped), "missing stop in {calls:?}");
    }

    Ok(())
}

#[tokio::test]
async fn coordinator_returns_cleanly_without_any_events() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;

    let watcher = DirWatcher::new(WatcherArgs {
        watch_dirs: vec![dir.path().to_path_buf()],
        ..Default::default()
    })?;

    let calls = Arc::new(Mutex::new(Vec::new()));
    let executors: Vec<Arc<dyn Executor>> =
        vec![Arc::new(RecordingExecutor::new(Arc::clone(&calls)))];

    let shutdown = CancellationToken::new();
    let coordinator = tokio::spawn(watch_and_execute(
        watcher,
        executors,
        shutdown.clone(),
    ));

    tokio::time::sleep(Duration::from_millis(200)).await;
    shutdown.cancel();
    timeout(Duration::from_secs(5), coordinator).await???;

    let calls = calls.lock().unwrap().clone();
    assert_eq!(calls.first(), Some(&RecordedCall::Started));
    assert!(calls.contains(&RecordedCall::Stopped));
    assert!(!calls.iter().any(|c| matches!(c, RecordedCall::Event(_))));

    Ok(())
}
