//! Configuration model: raw input documents and their normalized form

use crate::core::pipeline::Pipeline;
use crate::core::plugin::Plugin;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while loading or normalizing a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown plugin '{name}' at plugins[{index}]")]
    UnknownPlugin { index: usize, name: String },

    #[error("Invalid plugin at plugins[{index}]: {reason}")]
    InvalidPlugin { index: usize, reason: String },

    #[error("Failed to create plugin '{name}': {error:#}")]
    PluginFactory { name: String, error: anyhow::Error },

    #[error("Cannot resolve context directory: {0}")]
    Context(#[source] std::io::Error),
}

/// Bare-callable plugin shape accepted from embedding code
pub type PluginFn = Arc<dyn Fn(&mut Pipeline) -> anyhow::Result<()> + Send + Sync>;

/// A plugin as it appears in raw input, before normalization adapts it
#[derive(Clone)]
pub enum RawPlugin {
    /// Plugin object exposing `apply`
    Instance(Arc<dyn Plugin>),
    /// Bare callable invoked with the pipeline
    Callable(PluginFn),
    /// Entry of a config file's `plugins` array (name or `{ name, options }`)
    Declared(Value),
}

impl fmt::Debug for RawPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawPlugin::Instance(plugin) => write!(f, "Instance({})", plugin.name()),
            RawPlugin::Callable(_) => write!(f, "Callable"),
            RawPlugin::Declared(value) => write!(f, "Declared({})", value),
        }
    }
}

/// One raw configuration: the document plus plugins added from code
#[derive(Debug, Clone)]
pub struct RawConfig {
    /// The configuration document as written by the user
    pub document: Value,

    /// Plugins appended after the document's own `plugins` list
    pub extra_plugins: Vec<RawPlugin>,
}

impl RawConfig {
    pub fn new(document: Value) -> Self {
        Self {
            document,
            extra_plugins: Vec::new(),
        }
    }

    /// Append a plugin object
    pub fn with_plugin<P: Plugin + 'static>(mut self, plugin: P) -> Self {
        self.extra_plugins.push(RawPlugin::Instance(Arc::new(plugin)));
        self
    }

    /// Append a bare callable plugin
    pub fn with_plugin_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Pipeline) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.extra_plugins.push(RawPlugin::Callable(Arc::new(f)));
        self
    }

    /// Append any raw plugin shape
    pub fn with_raw_plugin(mut self, plugin: RawPlugin) -> Self {
        self.extra_plugins.push(plugin);
        self
    }

    /// All raw plugins in application order: document entries first
    pub fn raw_plugins(&self) -> Vec<RawPlugin> {
        let declared = self
            .document
            .get("plugins")
            .and_then(Value::as_array)
            .map(|items| items.iter().cloned().map(RawPlugin::Declared).collect())
            .unwrap_or_else(Vec::new);

        let mut plugins: Vec<RawPlugin> = declared;
        plugins.extend(self.extra_plugins.iter().cloned());
        plugins
    }

    /// Name declared in the document, if any
    pub fn name(&self) -> Option<&str> {
        self.document.get("name").and_then(Value::as_str)
    }
}

/// Raw input: one configuration or an ordered list of them
#[derive(Debug, Clone)]
pub enum RawInput {
    Single(RawConfig),
    Multi(Vec<RawConfig>),
}

impl RawInput {
    /// Build input from a parsed document; a top-level array means many configs
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Array(items) => RawInput::Multi(items.into_iter().map(RawConfig::new).collect()),
            other => RawInput::Single(RawConfig::new(other)),
        }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let value: Value = serde_yaml::from_str(yaml)?;
        Ok(Self::from_value(value))
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let value: Value = serde_json::from_str(json)?;
        Ok(Self::from_value(value))
    }

    /// Load from a file; `.json` files use the JSON parser, anything else YAML
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_yaml(&content),
        }
    }

    /// Number of configurations in this input
    pub fn len(&self) -> usize {
        match self {
            RawInput::Single(_) => 1,
            RawInput::Multi(configs) => configs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn configs_mut(&mut self) -> Vec<&mut RawConfig> {
        match self {
            RawInput::Single(config) => vec![config],
            RawInput::Multi(configs) => configs.iter_mut().collect(),
        }
    }

    /// Set a top-level field on every object document (command-line overrides)
    pub fn override_field(&mut self, key: &str, value: Value) {
        for config in self.configs_mut() {
            if let Value::Object(map) = &mut config.document {
                map.insert(key.to_string(), value.clone());
            }
        }
    }
}

/// Build mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Development,
    Production,
    None,
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" => Ok(Mode::Development),
            "production" => Ok(Mode::Production),
            "none" => Ok(Mode::None),
            other => Err(format!("unknown mode '{}'", other)),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::Development => "development",
            Mode::Production => "production",
            Mode::None => "none",
        };
        f.write_str(s)
    }
}

/// Canonical shape of one named entry point
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryDescription {
    /// Modules loaded at startup; `None` until full defaults run
    pub import: Option<Vec<String>>,

    /// Entry points this entry depends on
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depend_on: Vec<String>,

    /// Output filename override for this entry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// Output destination options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputOptions {
    pub path: Option<PathBuf>,
    pub filename: Option<String>,
    pub chunk_filename: Option<String>,
    pub public_path: Option<String>,
    pub clean: Option<bool>,
}

/// Watch-mode options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchOptions {
    /// Delay in milliseconds used to aggregate change events into one rebuild
    pub aggregate_timeout: Option<u64>,

    /// Poll interval in milliseconds; `None` lets the watcher choose
    pub poll: Option<u64>,

    /// Path fragments or glob patterns excluded from watching
    pub ignored: Vec<String>,

    pub follow_symlinks: Option<bool>,
}

/// Infrastructure logging verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    None,
    Error,
    Warn,
    Info,
    Log,
    Verbose,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(LogLevel::None),
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "log" => Ok(LogLevel::Log),
            "verbose" => Ok(LogLevel::Verbose),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

/// Infrastructure logging options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfrastructureLogging {
    pub level: Option<LogLevel>,

    /// Logger names (or `*`) that log at verbose level regardless of `level`
    pub debug: Option<Vec<String>>,

    pub colors: Option<bool>,
}

/// Source map style; `false` in config files disables it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Devtool {
    Disabled,
    Named(String),
}

impl Serialize for Devtool {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Devtool::Disabled => serializer.serialize_bool(false),
            Devtool::Named(name) => serializer.serialize_str(name),
        }
    }
}

/// Build cache kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheOptions {
    Disabled,
    Memory,
    Filesystem,
}

/// Value substituted for `process.env.NODE_ENV`; `false` disables substitution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEnv {
    Disabled,
    Value(String),
}

impl Serialize for NodeEnv {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            NodeEnv::Disabled => serializer.serialize_bool(false),
            NodeEnv::Value(value) => serializer.serialize_str(value),
        }
    }
}

/// Module id naming strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleIds {
    Natural,
    Named,
    Deterministic,
}

/// Optimization options consumed by the engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Optimization {
    pub minimize: Option<bool>,
    pub node_env: Option<NodeEnv>,
    pub module_ids: Option<ModuleIds>,
}

/// Normalized configuration for one pipeline
///
/// Produced by normalization with every field in its canonical shape, then
/// completed by base and full defaults. Unset fields are `None` until the
/// defaulting stage that owns them runs.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    pub name: Option<String>,
    pub context: Option<PathBuf>,
    pub mode: Option<Mode>,
    pub entry: BTreeMap<String, EntryDescription>,
    pub output: OutputOptions,

    /// Plugins in application order
    #[serde(skip)]
    pub plugins: Vec<Arc<dyn Plugin>>,

    /// Names of other configurations this one must build after
    pub dependencies: Vec<String>,

    pub watch: Option<bool>,
    pub watch_options: WatchOptions,
    pub infrastructure_logging: InfrastructureLogging,
    pub devtool: Option<Devtool>,
    pub target: Option<String>,
    pub cache: Option<CacheOptions>,
    pub optimization: Optimization,
    pub parallelism: Option<usize>,
    pub bail: Option<bool>,
    pub profile: Option<bool>,
}

impl Configuration {
    /// Effective mode (production when unset, matching the defaults)
    pub fn mode(&self) -> Mode {
        self.mode.unwrap_or(Mode::Production)
    }

    /// Root context directory
    pub fn context_dir(&self) -> PathBuf {
        self.context.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Whether this configuration asks for watch mode
    pub fn is_watch(&self) -> bool {
        self.watch.unwrap_or(false)
    }

    /// Serialize the configuration for the engine (plugins are omitted)
    pub fn to_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
