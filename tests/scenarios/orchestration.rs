//! Test: many configurations run as one orchestrated pass

use crate::helpers::*;
use packline::execution::{ChildOutcome, DependencyError};
use packline::{BootstrapError, PassOutcome, RawInput, SchedulingStrategy};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::time::Duration;

fn three_stage_input() -> RawInput {
    RawInput::from_value(json!([
        { "name": "client", "context": "/app", "dependencies": ["server"] },
        { "name": "server", "context": "/app", "dependencies": ["shared"] },
        { "name": "shared", "context": "/app" }
    ]))
}

#[tokio::test]
async fn test_children_run_in_dependency_order() {
    let factory = MockEngineFactory::new().with_delay(Duration::from_millis(10));
    let handle = bootstrap(&factory, &ManualWatcher::new())
        .create(&three_stage_input())
        .unwrap();

    let completion = handle.run().await;
    assert!(completion.is_success(), "{:?}", completion.error);

    let log = &factory.log;
    assert!(log.position("end:shared") < log.position("start:server"));
    assert!(log.position("end:server") < log.position("start:client"));

    // One report per child, in input order
    let Some(PassOutcome::Multi(multi)) = &completion.outcome else {
        panic!("expected multi outcome");
    };
    let names: Vec<&str> = multi.children.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["client", "server", "shared"]);

    // Every child is closed after the run
    assert_eq!(log.count("close:"), 3);
}

#[tokio::test]
async fn test_failed_child_skips_its_dependents() {
    let factory = MockEngineFactory::new().script("shared", vec![Script::Fatal("disk full".into())]);
    let handle = bootstrap(&factory, &ManualWatcher::new())
        .create(&RawInput::from_value(json!([
            { "name": "client", "context": "/app", "dependencies": ["shared"] },
            { "name": "shared", "context": "/app" },
            { "name": "docs", "context": "/app" }
        ])))
        .unwrap();

    let completion = handle.run().await;

    assert!(!completion.is_success());
    assert!(completion.error.is_some());

    let Some(PassOutcome::Multi(multi)) = &completion.outcome else {
        panic!("expected multi outcome");
    };
    assert!(matches!(
        &multi.child("shared").unwrap().outcome,
        ChildOutcome::Failed { .. }
    ));
    match &multi.child("client").unwrap().outcome {
        ChildOutcome::Skipped { blocked_by } => assert_eq!(blocked_by, "shared"),
        other => panic!("client should be skipped, got {:?}", other),
    }
    // Independent children still build
    assert!(matches!(
        &multi.child("docs").unwrap().outcome,
        ChildOutcome::Built(_)
    ));
    assert_eq!(factory.log.count("start:client"), 0);
}

#[tokio::test]
async fn test_compilation_errors_also_block_dependents() {
    let factory = MockEngineFactory::new()
        .script("shared", vec![Script::CompilationError("Unexpected token".into())]);
    let handle = bootstrap(&factory, &ManualWatcher::new())
        .create(&RawInput::from_value(json!([
            { "name": "client", "context": "/app", "dependencies": ["shared"] },
            { "name": "shared", "context": "/app" }
        ])))
        .unwrap();

    let completion = handle.run().await;

    // Compilation errors are not fatal, so there is no run error
    assert!(completion.error.is_none());
    let Some(PassOutcome::Multi(multi)) = &completion.outcome else {
        panic!("expected multi outcome");
    };
    assert!(matches!(
        &multi.child("client").unwrap().outcome,
        ChildOutcome::Skipped { .. }
    ));
}

#[tokio::test]
async fn test_dependency_cycle_is_rejected_at_construction() {
    let factory = MockEngineFactory::new();
    let result = bootstrap(&factory, &ManualWatcher::new()).create(&RawInput::from_value(json!([
        { "name": "a", "context": "/app", "dependencies": ["b"] },
        { "name": "b", "context": "/app", "dependencies": ["a"] }
    ])));

    match result {
        Err(BootstrapError::Dependency(DependencyError::Cycle { cycle })) => {
            assert!(cycle.contains(&"a".to_string()));
            assert!(cycle.contains(&"b".to_string()));
        }
        Err(other) => panic!("expected a cycle error, got {}", other),
        Ok(_) => panic!("expected a cycle error"),
    }
}

#[tokio::test]
async fn test_unknown_dependency_is_rejected() {
    let factory = MockEngineFactory::new();
    let result = bootstrap(&factory, &ManualWatcher::new()).create(&RawInput::from_value(json!([
        { "name": "a", "context": "/app", "dependencies": ["missing"] }
    ])));

    assert!(matches!(
        result,
        Err(BootstrapError::Dependency(DependencyError::Unknown { .. }))
    ));
}

#[tokio::test]
async fn test_sequential_strategy_never_overlaps() {
    let factory = MockEngineFactory::new().with_delay(Duration::from_millis(10));
    let handle = bootstrap(&factory, &ManualWatcher::new())
        .with_strategy(SchedulingStrategy::Sequential)
        .create(&RawInput::from_value(json!([
            { "name": "a", "context": "/app" },
            { "name": "b", "context": "/app" },
            { "name": "c", "context": "/app" }
        ])))
        .unwrap();

    assert!(handle.run().await.is_success());
    assert_eq!(factory.log.max_running.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_parallel_strategy_overlaps_independent_children() {
    let factory = MockEngineFactory::new().with_delay(Duration::from_millis(50));
    let handle = bootstrap(&factory, &ManualWatcher::new())
        .with_strategy(SchedulingStrategy::Parallel)
        .create(&RawInput::from_value(json!([
            { "name": "a", "context": "/app" },
            { "name": "b", "context": "/app" }
        ])))
        .unwrap();

    assert!(handle.run().await.is_success());
    assert_eq!(factory.log.max_running.load(Ordering::SeqCst), 2);
}
