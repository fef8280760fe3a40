//! Test: watch sessions, invalidation and stopping

use crate::helpers::*;
use packline::core::hooks::Invalidation;
use packline::watch::WatchError;
use packline::{Bootstrap, Launch, PassOutcome, RawConfig, RawInput, RunError, WatchEvent};
use serde_json::json;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn single_stats(event: Option<WatchEvent>) -> packline::Stats {
    match event {
        Some(WatchEvent::Pass(completion)) => match completion.outcome {
            Some(PassOutcome::Single(stats)) => stats,
            other => panic!("expected single stats, got {:?}", other),
        },
        other => panic!("expected a pass, got {:?}", other),
    }
}

#[tokio::test]
async fn test_change_triggers_new_pass() {
    let factory = MockEngineFactory::new();
    let watcher = ManualWatcher::new();
    let invalidated = Arc::new(Mutex::new(Vec::new()));

    let sink = invalidated.clone();
    let raw = RawConfig::new(json!({ "name": "app", "context": "/app", "watch": true })).with_plugin_fn(
        move |pipeline| {
            let sink = sink.clone();
            pipeline.hooks.invalid.tap("recorder", move |event: &Invalidation| {
                sink.lock().unwrap().extend(event.changed.clone());
            });
            Ok(())
        },
    );

    let handle = bootstrap(&factory, &watcher).create(&RawInput::Single(raw)).unwrap();
    assert!(handle.should_watch());

    let (watching, mut events) = handle.watch().unwrap();

    let first = single_stats(events.recv().await);
    wait_for_watcher(&watcher).await;
    assert_eq!(watcher.roots(), vec![PathBuf::from("/app")]);

    watcher.change(&["/app/src/index.js"]);
    let second = single_stats(events.recv().await);

    assert_ne!(first.pass_id, second.pass_id);
    assert_eq!(
        *invalidated.lock().unwrap(),
        vec![PathBuf::from("/app/src/index.js")]
    );
    assert_eq!(factory.log.count("start:app"), 2);

    watching.stop().await;
    // Watching never closes on its own
    assert_eq!(factory.log.count("close:"), 0);
    handle.close().await.unwrap();
    assert_eq!(factory.log.count("close:"), 1);
}

#[tokio::test]
async fn test_no_events_after_stop() {
    let factory = MockEngineFactory::new();
    let watcher = ManualWatcher::new();
    let handle = bootstrap(&factory, &watcher)
        .create(&RawInput::from_value(json!({ "context": "/app" })))
        .unwrap();

    let (watching, mut events) = handle.watch().unwrap();
    assert!(matches!(events.recv().await, Some(WatchEvent::Pass(_))));
    wait_for_watcher(&watcher).await;

    watching.stop().await;
    watcher.change(&["/app/src/late.js"]);

    assert!(events.recv().await.is_none());
    assert_eq!(factory.log.count("start:"), 1);
}

#[tokio::test]
async fn test_watcher_failure_ends_session() {
    let factory = MockEngineFactory::new();
    let watcher = ManualWatcher::new();
    let handle = bootstrap(&factory, &watcher)
        .create(&RawInput::from_value(json!({ "context": "/app" })))
        .unwrap();

    let (watching, mut events) = handle.watch().unwrap();
    assert!(matches!(events.recv().await, Some(WatchEvent::Pass(_))));
    wait_for_watcher(&watcher).await;

    watcher.fail("inotify limit reached");

    match events.recv().await {
        Some(WatchEvent::WatcherFailed(WatchError::Failed(reason))) => {
            assert_eq!(reason, "inotify limit reached");
        }
        other => panic!("expected watcher failure, got {:?}", other),
    }
    watching.stop().await;
    assert!(events.recv().await.is_none());
}

#[tokio::test]
async fn test_watcher_start_failure_is_reported() {
    let factory = MockEngineFactory::new();
    let watcher = ManualWatcher::failing(WatchError::Start {
        path: PathBuf::from("/app"),
        reason: "permission denied".into(),
    });
    let handle = bootstrap(&factory, &watcher)
        .create(&RawInput::from_value(json!({ "context": "/app" })))
        .unwrap();

    let (_watching, mut events) = handle.watch().unwrap();

    // The initial pass still runs and is reported first
    assert!(matches!(events.recv().await, Some(WatchEvent::Pass(_))));
    assert!(matches!(
        events.recv().await,
        Some(WatchEvent::WatcherFailed(WatchError::Start { .. }))
    ));
}

#[tokio::test]
async fn test_run_during_watch_is_rejected() {
    let factory = MockEngineFactory::new();
    let watcher = ManualWatcher::new();
    let handle = bootstrap(&factory, &watcher)
        .create(&RawInput::from_value(json!({ "context": "/app" })))
        .unwrap();

    let (watching, mut events) = handle.watch().unwrap();
    events.recv().await;

    let completion = handle.run().await;
    assert!(matches!(
        completion.error,
        Some(RunError::ConcurrentCompilation { .. })
    ));
    // The rejected run did not close the watched pipeline
    assert_eq!(factory.log.count("close:"), 0);

    watching.stop().await;
}

#[tokio::test]
async fn test_batches_queued_during_a_pass_merge() {
    let factory = MockEngineFactory::new().with_delay(Duration::from_millis(50));
    let watcher = ManualWatcher::new();
    let handle = bootstrap(&factory, &watcher)
        .create(&RawInput::from_value(json!({ "context": "/app" })))
        .unwrap();

    let (watching, mut events) = handle.watch().unwrap();
    events.recv().await;
    wait_for_watcher(&watcher).await;

    watcher.change(&["/app/a.js"]);
    // Let the second pass start, then queue two more batches behind it
    tokio::time::sleep(Duration::from_millis(10)).await;
    watcher.change(&["/app/b.js"]);
    watcher.change(&["/app/c.js"]);

    events.recv().await;
    events.recv().await;
    watching.stop().await;

    // Initial pass, the a.js pass, then one merged pass for b.js and c.js
    assert_eq!(factory.log.count("start:"), 3);
}

#[tokio::test]
async fn test_launch_watches_when_configured() {
    let factory = MockEngineFactory::new();
    let watcher = ManualWatcher::new();
    let launch = bootstrap(&factory, &watcher)
        .launch(&RawInput::from_value(json!({ "context": "/app", "watch": true })))
        .await
        .unwrap();

    let Launch::Watching {
        handle,
        watching,
        mut events,
    } = launch
    else {
        panic!("expected watch mode");
    };

    assert!(matches!(events.recv().await, Some(WatchEvent::Pass(_))));
    watching.stop().await;
    handle.close().await.unwrap();
}

#[tokio::test]
async fn test_default_bootstrap_watch_requires_no_setup() {
    // The polling watcher is installed when none is given
    let factory = MockEngineFactory::new();
    let dir = tempfile::tempdir().unwrap();
    let handle = Bootstrap::new(factory.clone())
        .create(&RawInput::from_value(json!({ "context": dir.path() })))
        .unwrap();

    let (watching, mut events) = handle.watch().unwrap();
    assert!(matches!(events.recv().await, Some(WatchEvent::Pass(_))));
    watching.stop().await;
    handle.close().await.unwrap();
}

fn rebuilt_children(event: Option<WatchEvent>) -> Vec<String> {
    match event {
        Some(WatchEvent::Pass(completion)) => match completion.outcome {
            Some(PassOutcome::Multi(multi)) => multi.children.into_iter().map(|c| c.name).collect(),
            other => panic!("expected multi stats, got {:?}", other),
        },
        other => panic!("expected a pass, got {:?}", other),
    }
}

#[tokio::test]
async fn test_multi_watch_rebuilds_only_affected_children() {
    let factory = MockEngineFactory::new();
    let watcher = ManualWatcher::new();
    let handle = bootstrap(&factory, &watcher)
        .create(&RawInput::from_value(json!([
            { "name": "shared", "context": "/shared" },
            {
                "name": "client",
                "context": "/client",
                "dependencies": ["shared"],
                "watchOptions": { "ignored": "generated" }
            },
            { "name": "server", "context": "/server" }
        ])))
        .unwrap();

    let (watching, mut events) = handle.watch().unwrap();
    assert_eq!(rebuilt_children(events.recv().await), vec!["shared", "client", "server"]);
    wait_for_subscriptions(&watcher, 3).await;

    // One subscription per child, each with its own roots and options
    let subscriptions = watcher.subscriptions();
    assert_eq!(subscriptions[0].roots, vec![PathBuf::from("/shared")]);
    assert_eq!(subscriptions[1].roots, vec![PathBuf::from("/client")]);
    assert_eq!(subscriptions[1].options.ignored, vec!["generated".to_string()]);
    assert_eq!(subscriptions[2].roots, vec![PathBuf::from("/server")]);
    assert!(subscriptions[2].options.ignored.is_empty());

    watcher.change(&["/client/src/app.js"]);
    assert_eq!(rebuilt_children(events.recv().await), vec!["client"]);
    assert_eq!(factory.log.count("start:server"), 1);
    assert_eq!(factory.log.count("start:shared"), 1);

    // A change under a dependency rebuilds its dependents after it
    watcher.change(&["/shared/util.js"]);
    assert_eq!(rebuilt_children(events.recv().await), vec!["shared", "client"]);
    let log = factory.log.events();
    let last = |event: &str| log.iter().rposition(|e| e == event).unwrap();
    assert!(last("end:shared") < last("start:client"));
    assert_eq!(factory.log.count("start:server"), 1);

    watching.stop().await;
    handle.close().await.unwrap();
    assert_eq!(factory.log.count("close:"), 3);
}

#[tokio::test]
async fn test_multi_watch_rolls_back_when_a_child_cannot_watch() {
    let factory = MockEngineFactory::new();
    let watcher = ManualWatcher::new();
    let handle = bootstrap(&factory, &watcher)
        .create(&RawInput::from_value(json!([
            { "name": "a", "context": "/a" },
            { "name": "b", "context": "/b" }
        ])))
        .unwrap();

    handle.pipelines()[1].close().await.unwrap();

    let Err(error) = handle.watch() else {
        panic!("watching with a closed child should fail");
    };
    assert!(matches!(error, RunError::Closed { .. }));

    // The child that had already entered watch mode left it again
    assert!(!handle.pipelines()[0].is_watching());
    assert_eq!(factory.log.count("start:"), 0);
    assert!(!watcher.is_started());
}

#[tokio::test]
async fn test_stop_lets_in_flight_pass_finish_and_drops_its_result() {
    let factory = MockEngineFactory::new().with_delay(Duration::from_millis(100));
    let watcher = ManualWatcher::new();
    let handle = bootstrap(&factory, &watcher)
        .create(&RawInput::from_value(json!({ "context": "/app" })))
        .unwrap();

    let (watching, mut events) = handle.watch().unwrap();
    assert!(matches!(events.recv().await, Some(WatchEvent::Pass(_))));
    wait_for_watcher(&watcher).await;

    watcher.change(&["/app/src/index.js"]);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(factory.log.count("start:"), 2);

    watching.stop().await;

    // The pass ran to completion but its result is not delivered
    assert_eq!(factory.log.count("end:"), 2);
    assert!(events.recv().await.is_none());

    handle.close().await.unwrap();
    assert_eq!(factory.log.count("close:"), 1);
}

#[tokio::test]
async fn test_close_waits_for_in_flight_watch_pass() {
    let factory = MockEngineFactory::new().with_delay(Duration::from_millis(100));
    let watcher = ManualWatcher::new();
    let handle = bootstrap(&factory, &watcher)
        .create(&RawInput::from_value(json!({ "context": "/app" })))
        .unwrap();

    let (watching, mut events) = handle.watch().unwrap();
    events.recv().await;
    wait_for_watcher(&watcher).await;

    watcher.change(&["/app/src/index.js"]);
    tokio::time::sleep(Duration::from_millis(20)).await;

    handle.close().await.unwrap();

    let log = factory.log.events();
    let second_end = log.iter().rposition(|e| e == "end:default").unwrap();
    assert!(second_end < factory.log.position("close:default"));
    assert_eq!(factory.log.count("end:"), 2);

    watching.stop().await;
}
