//! Normalization: rewrite shorthand forms into one canonical shape per field

use crate::core::config::{
    CacheOptions, ConfigError, Configuration, Devtool, EntryDescription, InfrastructureLogging,
    LogLevel, ModuleIds, Mode, NodeEnv, Optimization, OutputOptions, RawConfig, WatchOptions,
};
use crate::core::plugin::PluginRegistry;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Poll interval used when a config says `poll: true`
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5007;

/// Name of the entry created for string and array shorthand
pub const DEFAULT_ENTRY_NAME: &str = "main";

/// Normalize one validated raw configuration
///
/// Plugins are adapted into the uniform plugin shape here, so a name that
/// the registry does not know fails normalization.
pub fn normalize(raw: &RawConfig, registry: &PluginRegistry) -> Result<Configuration, ConfigError> {
    let doc = &raw.document;

    let plugins = raw
        .raw_plugins()
        .iter()
        .enumerate()
        .map(|(index, plugin)| registry.resolve(index, plugin))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Configuration {
        name: str_field(doc, "name"),
        context: str_field(doc, "context").map(PathBuf::from),
        mode: str_field(doc, "mode").and_then(|m| m.parse::<Mode>().ok()),
        entry: normalize_entry(doc.get("entry")),
        output: normalize_output(doc.get("output")),
        plugins,
        dependencies: string_list(doc.get("dependencies")),
        watch: doc.get("watch").and_then(Value::as_bool),
        watch_options: normalize_watch_options(doc.get("watchOptions")),
        infrastructure_logging: normalize_logging(doc.get("infrastructureLogging")),
        devtool: doc.get("devtool").and_then(normalize_devtool),
        target: str_field(doc, "target"),
        cache: doc.get("cache").and_then(normalize_cache),
        optimization: normalize_optimization(doc.get("optimization")),
        parallelism: doc
            .get("parallelism")
            .and_then(Value::as_u64)
            .map(|n| n as usize),
        bail: doc.get("bail").and_then(Value::as_bool),
        profile: doc.get("profile").and_then(Value::as_bool),
    })
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

/// A string becomes a one-element list; arrays keep their string items
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn normalize_entry(value: Option<&Value>) -> BTreeMap<String, EntryDescription> {
    let mut entries = BTreeMap::new();

    match value {
        None | Some(Value::Null) => {
            entries.insert(DEFAULT_ENTRY_NAME.to_string(), EntryDescription::default());
        }
        Some(shorthand @ (Value::String(_) | Value::Array(_))) => {
            entries.insert(
                DEFAULT_ENTRY_NAME.to_string(),
                EntryDescription {
                    import: Some(string_list(Some(shorthand))),
                    ..EntryDescription::default()
                },
            );
        }
        Some(Value::Object(map)) => {
            for (name, item) in map {
                let description = match item {
                    Value::Object(desc) => EntryDescription {
                        import: desc.get("import").map(|i| string_list(Some(i))),
                        depend_on: string_list(desc.get("dependOn")),
                        filename: desc.get("filename").and_then(Value::as_str).map(str::to_string),
                    },
                    other => EntryDescription {
                        import: Some(string_list(Some(other))),
                        ..EntryDescription::default()
                    },
                };
                entries.insert(name.clone(), description);
            }
        }
        Some(_) => {}
    }

    entries
}

fn normalize_output(value: Option<&Value>) -> OutputOptions {
    let Some(output) = value else {
        return OutputOptions::default();
    };

    OutputOptions {
        path: str_field(output, "path").map(PathBuf::from),
        filename: str_field(output, "filename"),
        chunk_filename: str_field(output, "chunkFilename"),
        public_path: str_field(output, "publicPath"),
        clean: output.get("clean").and_then(Value::as_bool),
    }
}

fn normalize_watch_options(value: Option<&Value>) -> WatchOptions {
    let Some(options) = value else {
        return WatchOptions::default();
    };

    let poll = match options.get("poll") {
        Some(Value::Bool(true)) => Some(DEFAULT_POLL_INTERVAL_MS),
        Some(n) => n.as_u64(),
        None => None,
    };

    WatchOptions {
        aggregate_timeout: options.get("aggregateTimeout").and_then(Value::as_u64),
        poll,
        ignored: string_list(options.get("ignored")),
        follow_symlinks: options.get("followSymlinks").and_then(Value::as_bool),
    }
}

fn normalize_logging(value: Option<&Value>) -> InfrastructureLogging {
    let Some(logging) = value else {
        return InfrastructureLogging::default();
    };

    let debug = match logging.get("debug") {
        Some(Value::Bool(true)) => Some(vec!["*".to_string()]),
        Some(Value::Bool(false)) => Some(Vec::new()),
        Some(other) => Some(string_list(Some(other))),
        None => None,
    };

    InfrastructureLogging {
        level: str_field(logging, "level").and_then(|l| l.parse::<LogLevel>().ok()),
        debug,
        colors: logging.get("colors").and_then(Value::as_bool),
    }
}

fn normalize_devtool(value: &Value) -> Option<Devtool> {
    match value {
        Value::Bool(false) => Some(Devtool::Disabled),
        Value::String(name) => Some(Devtool::Named(name.clone())),
        _ => None,
    }
}

fn normalize_cache(value: &Value) -> Option<CacheOptions> {
    match value {
        Value::Bool(true) => Some(CacheOptions::Memory),
        Value::Bool(false) => Some(CacheOptions::Disabled),
        Value::Object(map) => match map.get("type").and_then(Value::as_str) {
            Some("filesystem") => Some(CacheOptions::Filesystem),
            Some("memory") => Some(CacheOptions::Memory),
            _ => None,
        },
        _ => None,
    }
}

fn normalize_optimization(value: Option<&Value>) -> Optimization {
    let Some(optimization) = value else {
        return Optimization::default();
    };

    let node_env = match optimization.get("nodeEnv") {
        Some(Value::Bool(false)) => Some(NodeEnv::Disabled),
        Some(Value::String(env)) => Some(NodeEnv::Value(env.clone())),
        _ => None,
    };

    let module_ids = match optimization.get("moduleIds").and_then(Value::as_str) {
        Some("natural") => Some(ModuleIds::Natural),
        Some("named") => Some(ModuleIds::Named),
        Some("deterministic") => Some(ModuleIds::Deterministic),
        _ => None,
    };

    Optimization {
        minimize: optimization.get("minimize").and_then(Value::as_bool),
        node_env,
        module_ids,
    }
}
