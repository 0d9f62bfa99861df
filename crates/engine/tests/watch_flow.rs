use context_engine::{ContextGenerator, EngineConfig, IncrementalUpdater, WatchConfig};
use context_protocol::{ContextEvent, FileChangeKind, GenerateOptions};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::broadcast::Receiver;

fn setup() -> (TempDir, Arc<ContextGenerator>, GenerateOptions) {
    let temp = TempDir::new().expect("tempdir");
    std::fs::create_dir_all(temp.path().join("src")).unwrap();
    std::fs::write(temp.path().join("src/a.ts"), "export function a() {}\n").unwrap();
    std::fs::write(temp.path().join("src/b.ts"), "export function b() {}\n").unwrap();

    let mut config = EngineConfig::default();
    config.cache.durable = false;
    let generator = Arc::new(ContextGenerator::open(temp.path(), config).expect("open"));
    let options = GenerateOptions::new(temp.path(), "update a");
    (temp, generator, options)
}

fn watch_config(debounce_ms: u64) -> WatchConfig {
    WatchConfig {
        debounce_ms,
        ..WatchConfig::default()
    }
}

async fn next_rebuild(events: &mut Receiver<ContextEvent>, timeout: Duration) -> Option<ContextEvent> {
    tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(event @ (ContextEvent::ContextUpdated { .. } | ContextEvent::Error { .. })) => {
                    break Some(event)
                }
                Ok(ContextEvent::FileChanged { .. }) => {}
                Err(_) => break None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn burst_of_changes_collapses_into_one_rebuild() {
    let (_temp, generator, options) = setup();
    let updater = IncrementalUpdater::new(generator, options, watch_config(200));
    let mut events = updater.subscribe();
    updater.start_manual().await.unwrap();
    assert!(updater.is_watching());

    for _ in 0..5 {
        updater
            .schedule("src/a.ts", FileChangeKind::Modified)
            .await
            .unwrap();
    }

    let event = next_rebuild(&mut events, Duration::from_secs(5))
        .await
        .expect("rebuild event");
    match event {
        ContextEvent::ContextUpdated { paths, .. } => assert_eq!(paths, vec!["src/a.ts"]),
        other => panic!("unexpected event {other:?}"),
    }

    tokio::time::sleep(Duration::from_millis(500)).await;
    loop {
        match events.try_recv() {
            Ok(ContextEvent::ContextUpdated { .. }) => panic!("second rebuild for one burst"),
            Ok(_) | Err(TryRecvError::Lagged(_)) => {}
            Err(_) => break,
        }
    }

    let health = updater.health();
    assert_eq!(health.rebuild_count, 1);
    assert_eq!(health.pending_paths, 0);
    assert!(health.last_error.is_none());
    assert!(updater.latest_result().is_some());
    updater.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn flush_fires_early_and_cancel_drops_the_batch() {
    let (_temp, generator, options) = setup();
    let updater = IncrementalUpdater::new(generator, options, watch_config(60_000));
    let mut events = updater.subscribe();
    updater.start_manual().await.unwrap();

    updater.schedule("src/b.ts", FileChangeKind::Created).await.unwrap();
    updater.cancel().await.unwrap();
    updater.flush().await.unwrap();
    assert!(next_rebuild(&mut events, Duration::from_millis(300)).await.is_none());

    updater.schedule("src/a.ts", FileChangeKind::Modified).await.unwrap();
    updater.schedule("src/b.ts", FileChangeKind::Modified).await.unwrap();
    updater.flush().await.unwrap();
    match next_rebuild(&mut events, Duration::from_secs(5)).await {
        Some(ContextEvent::ContextUpdated { paths, .. }) => {
            assert_eq!(paths, vec!["src/a.ts", "src/b.ts"]);
        }
        other => panic!("unexpected event {other:?}"),
    }
    updater.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_rebuild_is_reported_and_the_loop_survives() {
    let (temp, generator, options) = setup();
    let updater = IncrementalUpdater::new(generator, options, watch_config(50));
    let mut events = updater.subscribe();
    updater.start_manual().await.unwrap();

    let root = temp.path().to_path_buf();
    drop(temp);
    assert!(!root.exists());

    updater.schedule("src/a.ts", FileChangeKind::Removed).await.unwrap();
    match next_rebuild(&mut events, Duration::from_secs(5)).await {
        Some(ContextEvent::Error { .. }) => {}
        other => panic!("expected an error event, got {other:?}"),
    }
    let health = updater.health();
    assert!(health.last_error.is_some());
    assert_eq!(health.rebuild_count, 1);
    assert!(updater.is_watching());
    updater.stop().await;
}

#[tokio::test]
async fn stop_returns_to_idle_and_can_restart() {
    let (_temp, generator, options) = setup();
    let updater = IncrementalUpdater::new(generator, options, watch_config(50));

    assert!(updater.schedule("src/a.ts", FileChangeKind::Modified).await.is_err());
    updater.start_manual().await.unwrap();
    updater.stop().await;
    assert!(!updater.is_watching());
    assert!(updater.flush().await.is_err());

    updater.start_manual().await.unwrap();
    assert!(updater.is_watching());
    updater.stop().await;
}

#[cfg_attr(
    not(target_os = "linux"),
    ignore = "watcher latency test is only reliable on Linux"
)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn filesystem_edit_triggers_a_rebuild() {
    if std::env::var("SKIP_WATCH_FLOW").is_ok() {
        eprintln!("skipping watch_flow due to SKIP_WATCH_FLOW");
        return;
    }
    let (temp, generator, options) = setup();
    generator.generate(options.clone()).await.expect("initial pass");

    let updater = IncrementalUpdater::new(generator, options, watch_config(100));
    let mut events = updater.subscribe();
    if let Err(err) = updater.start().await {
        eprintln!("skipping watcher test: {err}");
        return;
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    tokio::fs::write(temp.path().join("src/a.ts"), "export function a2() {}\n")
        .await
        .unwrap();

    match next_rebuild(&mut events, Duration::from_secs(4)).await {
        Some(ContextEvent::ContextUpdated { paths, .. }) => {
            assert!(paths.contains(&"src/a.ts".to_string()), "{paths:?}");
        }
        other => panic!("expected a rebuild, got {other:?} (health={:?})", updater.health()),
    }
    updater.stop().await;
}
