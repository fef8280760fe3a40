//! Test: plugins apply in declaration order and see the right configuration

use crate::helpers::*;
use packline::core::config::{LogLevel, Mode};
use packline::core::plugin::FnPlugin;
use packline::{Bootstrap, BootstrapError, Pipeline, PluginRegistry, RawConfig, RawInput};
use serde_json::json;
use std::sync::{Arc, Mutex};

fn recorder(seen: &Arc<Mutex<Vec<String>>>, label: &'static str) -> FnPlugin {
    let seen = seen.clone();
    FnPlugin::new(
        label,
        Arc::new(move |_pipeline: &mut Pipeline| {
            seen.lock().unwrap().push(label.to_string());
            Ok(())
        }),
    )
}

#[tokio::test]
async fn test_plugins_apply_in_declared_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let raw = RawConfig::new(json!({ "context": "/app" }))
        .with_plugin(recorder(&seen, "A"))
        .with_plugin(recorder(&seen, "B"))
        .with_plugin(recorder(&seen, "C"));

    let factory = MockEngineFactory::new();
    bootstrap(&factory, &ManualWatcher::new())
        .create(&RawInput::Single(raw))
        .unwrap();

    assert_eq!(*seen.lock().unwrap(), vec!["A", "B", "C"]);
}

#[tokio::test]
async fn test_plugin_sees_base_defaults_and_its_override_survives() {
    let observed = Arc::new(Mutex::new(None));
    let seen_by_plugin = observed.clone();
    let raw = RawConfig::new(json!({ "context": "/app" })).with_plugin_fn(move |pipeline| {
        *seen_by_plugin.lock().unwrap() = Some((
            pipeline.options.infrastructure_logging.level,
            pipeline.options.mode,
        ));
        pipeline.options.output.filename = Some("bundle.[contenthash].js".to_string());
        Ok(())
    });

    let factory = MockEngineFactory::new();
    bootstrap(&factory, &ManualWatcher::new())
        .create(&RawInput::Single(raw))
        .unwrap();

    // Base defaults ran before the plugin; full defaults had not
    assert_eq!(
        *observed.lock().unwrap(),
        Some((Some(LogLevel::Info), None))
    );

    // Full defaults ran after it without clobbering the override
    let wired = factory.log.wired.lock().unwrap();
    assert_eq!(wired[0].output.filename.as_deref(), Some("bundle.[contenthash].js"));
    assert!(wired[0].output.path.is_some());
    assert_eq!(wired[0].mode, Some(Mode::Production));
}

#[tokio::test]
async fn test_named_plugin_resolves_from_registry() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let registry_seen = seen.clone();
    let registry = PluginRegistry::new().with("banner", move |options| {
        let text = options
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or("none")
            .to_string();
        let seen = registry_seen.clone();
        Ok(Arc::new(FnPlugin::new(
            "banner",
            Arc::new(move |_pipeline: &mut Pipeline| {
                seen.lock().unwrap().push(text.clone());
                Ok(())
            }),
        )) as Arc<dyn packline::Plugin>)
    });

    let factory = MockEngineFactory::new();
    let watcher = ManualWatcher::new();
    bootstrap(&factory, &watcher)
        .with_plugins(registry)
        .create(&RawInput::from_value(json!({
            "context": "/app",
            "plugins": [{ "name": "banner", "options": { "text": "hello" } }]
        })))
        .unwrap();

    assert_eq!(*seen.lock().unwrap(), vec!["hello"]);
}

#[tokio::test]
async fn test_failing_plugin_stops_construction() {
    let factory = MockEngineFactory::new();
    let raw = RawConfig::new(json!({ "name": "app", "context": "/app" }))
        .with_plugin_fn(|_| Err(anyhow::anyhow!("cannot apply")));

    let result = Bootstrap::new(factory.clone()).create(&RawInput::Single(raw));

    assert!(matches!(
        result,
        Err(BootstrapError::PluginApplication { .. })
    ));
    // No engine was wired for a half-built pipeline
    assert!(factory.log.wired.lock().unwrap().is_empty());
}
