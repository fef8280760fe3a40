//! Test: fatal errors, compilation errors and invalid configuration

use crate::helpers::*;
use packline::core::hooks::PassContext;
use packline::{BootstrapError, CompilerState, PassOutcome, RawConfig, RawInput, RunError};
use serde_json::json;
use std::sync::{Arc, Mutex};

#[tokio::test]
async fn test_compilation_errors_complete_without_run_error() {
    let factory =
        MockEngineFactory::new().script("app", vec![Script::CompilationError("Unexpected token".into())]);
    let handle = bootstrap(&factory, &ManualWatcher::new())
        .create(&RawInput::from_value(json!({ "name": "app", "context": "/app" })))
        .unwrap();

    let completion = handle.run().await;

    assert!(completion.error.is_none());
    assert!(!completion.is_success());
    let Some(PassOutcome::Single(stats)) = &completion.outcome else {
        panic!("expected single outcome");
    };
    assert_eq!(stats.build.errors.len(), 1);
    assert_eq!(stats.build.errors[0].module.as_deref(), Some("./src/broken.js"));

    // Closed even though the build had errors
    assert_eq!(factory.log.count("close:app"), 1);
}

#[tokio::test]
async fn test_fatal_error_reports_and_still_closes() {
    let factory = MockEngineFactory::new().script("app", vec![Script::Fatal("worker crashed".into())]);
    let failures = Arc::new(Mutex::new(Vec::new()));

    let sink = failures.clone();
    let raw = RawConfig::new(json!({ "name": "app", "context": "/app" })).with_plugin_fn(move |pipeline| {
        let sink = sink.clone();
        pipeline.hooks.failed.tap("recorder", move |error: &RunError| {
            sink.lock().unwrap().push(error.to_string());
        });
        Ok(())
    });

    let handle = bootstrap(&factory, &ManualWatcher::new())
        .create(&RawInput::Single(raw))
        .unwrap();
    let completion = handle.run().await;

    match &completion.error {
        Some(RunError::Fatal { pipeline, message }) => {
            assert_eq!(pipeline, "app");
            assert!(message.contains("worker crashed"));
        }
        other => panic!("expected a fatal error, got {:?}", other),
    }
    assert!(completion.outcome.is_none());
    assert_eq!(failures.lock().unwrap().len(), 1);
    assert_eq!(handle.state(), CompilerState::Closed);
    assert_eq!(factory.log.count("close:app"), 1);
}

#[tokio::test]
async fn test_run_after_close_is_rejected() {
    let factory = MockEngineFactory::new();
    let handle = bootstrap(&factory, &ManualWatcher::new())
        .create(&RawInput::from_value(json!({ "context": "/app" })))
        .unwrap();

    handle.close().await.unwrap();
    let completion = handle.run().await;

    assert!(matches!(completion.error, Some(RunError::Closed { .. })));
    assert_eq!(factory.log.count("start:"), 0);
}

#[tokio::test]
async fn test_run_fires_before_run_then_run() {
    let factory = MockEngineFactory::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let before = seen.clone();
    let during = seen.clone();
    let raw = RawConfig::new(json!({ "context": "/app" })).with_plugin_fn(move |pipeline| {
        let before = before.clone();
        pipeline.hooks.before_run.tap("recorder", move |ctx: &PassContext| {
            assert!(!ctx.watch);
            before.lock().unwrap().push("before_run");
        });
        let during = during.clone();
        pipeline.hooks.run.tap("recorder", move |_: &PassContext| {
            during.lock().unwrap().push("run");
        });
        Ok(())
    });

    let handle = bootstrap(&factory, &ManualWatcher::new())
        .create(&RawInput::Single(raw))
        .unwrap();
    handle.run().await;

    assert_eq!(*seen.lock().unwrap(), vec!["before_run", "run"]);
}

#[tokio::test]
async fn test_invalid_configuration_is_rejected_before_construction() {
    let factory = MockEngineFactory::new();
    let result = bootstrap(&factory, &ManualWatcher::new()).create(&RawInput::from_value(json!({
        "context": "/app",
        "mode": "fastest",
        "parallelism": 0
    })));

    match result {
        Err(BootstrapError::Validation(e)) => {
            let paths: Vec<&str> = e.violations.iter().map(|v| v.path.as_str()).collect();
            assert!(paths.iter().any(|p| p.contains("mode")), "{:?}", paths);
        }
        Err(other) => panic!("expected validation error, got {}", other),
        Ok(_) => panic!("expected validation error"),
    }
    assert!(factory.log.wired.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_entry_in_many_names_the_index() {
    let factory = MockEngineFactory::new();
    let result = bootstrap(&factory, &ManualWatcher::new()).create(&RawInput::from_value(json!([
        { "name": "ok", "context": "/app" },
        { "name": "bad", "context": "/app", "mode": "fastest" }
    ])));

    match result {
        Err(BootstrapError::Validation(e)) => {
            assert!(e.violations.iter().any(|v| v.path.contains("[1]")));
        }
        Err(other) => panic!("expected validation error, got {}", other),
        Ok(_) => panic!("expected validation error"),
    }
}
