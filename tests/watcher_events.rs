use std::error::Error;
use std::time::Duration;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use watchrun::watch::{DirWatcher, WatcherArgs};
use watchrun_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

/// Give the platform watcher a moment to settle before generating events.
const SETTLE: Duration = Duration::from_millis(250);

#[tokio::test]
async fn allow_list_and_cooldown_coalesce_a_burst_into_one_event() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let src = dir.path().join("src");
    std::fs::create_dir(&src)?;

    let mut watcher = DirWatcher::new(WatcherArgs {
        watch_dirs: vec![dir.path().to_path_buf()],
        only_suffixes: vec![".go".to_string()],
        cooldown: Some(Duration::from_millis(400)),
        ..Default::default()
    })?;
    let mut events = watcher.take_events().ok_or("event stream already taken")?;

    let shutdown = CancellationToken::new();
    let loop_handle = tokio::spawn(watcher.watch(shutdown.clone()));

    tokio::time::sleep(SETTLE).await;
    std::fs::write(src.join("a.go"), b"package a")?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    std::fs::write(src.join("b.txt"), b"not watched")?;
    std::fs::write(src.join("c.go"), b"package c")?;

    let event = timeout(Duration::from_secs(2), events.recv())
        .await?
        .ok_or("event stream closed early")?;
    assert!(event.path.ends_with("a.go"), "got {:?}", event.path);

    // b.txt fails the allow list and c.go lands inside the cooldown window,
    // so nothing else arrives.
    assert!(timeout(Duration::from_millis(250), events.recv())
        .await
        .is_err());

    shutdown.cancel();
    loop_handle.await?;
    Ok(())
}

#[tokio::test]
async fn events_keep_flowing_after_the_cooldown_elapses() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;

    let mut watcher = DirWatcher::new(WatcherArgs {
        watch_dirs: vec![dir.path().to_path_buf()],
        cooldown: Some(Duration::from_millis(50)),
        ..Default::default()
    })?;
    let mut events = watcher.take_events().ok_or("event stream already taken")?;

    let shutdown = CancellationToken::new();
    let loop_handle = tokio::spawn(watcher.watch(shutdown.clone()));

    tokio::time::sleep(SETTLE).await;
    std::fs::write(dir.path().join("first.txt"), b"one")?;
    let first = timeout(Duration::from_secs(2), events.recv())
        .await?
        .ok_or("event stream closed early")?;
    assert!(first.path.ends_with("first.txt"), "got {:?}", first.path);

    tokio::time::sleep(Duration::from_millis(200)).await;
    std::fs::write(dir.path().join("second.txt"), b"two")?;
    let second = timeout(Duration::from_secs(2), events.recv())
        .await?
        .ok_or("event stream closed early")?;
    assert!(second.path.ends_with("second.txt"), "got {:?}", second.path);

    shutdown.cancel();
    loop_handle.await?;
    Ok(())
}

#[tokio::test]
async fn new_subdirectories_are_watched_without_a_restart() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;

    let mut watcher = DirWatcher::new(WatcherArgs {
        watch_dirs: vec![dir.path().to_path_buf()],
        cooldown: Some(Duration::from_millis(10)),
        ..Default::default()
    })?;
    let mut events = watcher.take_events().ok_or("event stream already taken")?;

    let shutdown = CancellationToken::new();
    let loop_handle = tokio::spawn(watcher.watch(shutdown.clone()));

    tokio::time::sleep(SETTLE).await;
    let nested = dir.path().join("pkg");
    std::fs::create_dir(&nested)?;
    // The create event must reach the loop and grow the watch set first.
    tokio::time::sleep(Duration::from_millis(400)).await;

    std::fs::write(nested.join("inner.txt"), b"hello")?;

    let event = timeout(Duration::from_secs(2), events.recv())
        .await?
        .ok_or("event stream closed early")?;
    assert!(event.path.ends_with("inner.txt"), "got {:?}", event.path);

    shutdown.cancel();
    loop_handle.await?;
    Ok(())
}

#[tokio::test]
async fn excluded_directories_are_not_registered() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let ignored = dir.path().join("node_modules");
    std::fs::create_dir(&ignored)?;

    let mut watcher = DirWatcher::new(WatcherArgs {
        watch_dirs: vec![dir.path().to_path_buf()],
        exclude_dirs: vec!["node_modules".to_string()],
        cooldown: Some(Duration::from_millis(10)),
        ..Default::default()
    })?;
    let mut events = watcher.take_events().ok_or("event stream already taken")?;

    let shutdown = CancellationToken::new();
    let loop_handle = tokio::spawn(watcher.watch(shutdown.clone()));

    tokio::time::sleep(SETTLE).await;
    std::fs::write(ignored.join("dep.js"), b"module")?;

    assert!(timeout(Duration::from_millis(400), events.recv())
        .await
        .is_err());

    shutdown.cancel();
    loop_handle.await?;
    Ok(())
}

#[tokio::test]
async fn shutdown_closes_the_event_stream() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;

    let mut watcher = DirWatcher::new(WatcherArgs {
        watch_dirs: vec![dir.path().to_path_buf()],
        ..Default::default()
    })?;
    let mut events = watcher.take_events().ok_or("event stream already taken")?;

    let shutdown = CancellationToken::new();
    let loop_handle = tokio::spawn(watcher.watch(shutdown.clone()));

    shutdown.cancel();
    let closed = timeout(Duration::from_secs(2), events.recv()).await?;
    assert!(closed.is_none());

    loop_handle.await?;
    Ok(())
}

#[test]
fn missing_watch_root_fails_construction() {
    let missing = std::env::temp_dir().join("watchrun-does-not-exist-7f3a");
    let result = DirWatcher::new(WatcherArgs {
        watch_dirs: vec![missing],
        ..Default::default()
    });
    assert!(result.is_err());
}

#[test]
fn event_stream_can_only_be_taken_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut watcher = DirWatcher::new(WatcherArgs {
        watch_dirs: vec![dir.path().to_path_buf()],
        ..Default::default()
    })
    .expect("watcher");

    assert!(watcher.take_events().is_some());
    assert!(watcher.take_events().is_none());
}
