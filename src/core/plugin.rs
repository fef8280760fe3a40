//! Plugin contract and ingestion of the accepted plugin shapes

use crate::core::config::{ConfigError, PluginFn, RawPlugin};
use crate::core::pipeline::Pipeline;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A plugin: applied exactly once to a pipeline during construction
///
/// `apply` runs synchronously before full defaults. It may read and change
/// the pipeline's configuration and tap hooks; it must not do long-running
/// work.
pub trait Plugin: Send + Sync {
    /// Name used in logs and errors
    fn name(&self) -> &str;

    /// Attach the plugin to the pipeline
    fn apply(&self, pipeline: &mut Pipeline) -> anyhow::Result<()>;
}

impl fmt::Debug for dyn Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Plugin({})", self.name())
    }
}

/// Adapter turning a bare callable into a [`Plugin`]
pub struct FnPlugin {
    name: String,
    f: PluginFn,
}

impl FnPlugin {
    pub fn new(name: impl Into<String>, f: PluginFn) -> Self {
        Self { name: name.into(), f }
    }
}

impl Plugin for FnPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, pipeline: &mut Pipeline) -> anyhow::Result<()> {
        (self.f)(pipeline)
    }
}

/// Builds a plugin from the `options` value of a declared plugin entry
pub type PluginFactory = Arc<dyn Fn(&Value) -> anyhow::Result<Arc<dyn Plugin>> + Send + Sync>;

/// Named plugin factories available to configuration files
#[derive(Clone, Default)]
pub struct PluginRegistry {
    factories: BTreeMap<String, PluginFactory>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `name`, replacing any previous one
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&Value) -> anyhow::Result<Arc<dyn Plugin>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn with<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Value) -> anyhow::Result<Arc<dyn Plugin>> + Send + Sync + 'static,
    {
        self.register(name, factory);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Adapt one raw plugin into the uniform plugin shape
    pub fn resolve(&self, index: usize, raw: &RawPlugin) -> Result<Arc<dyn Plugin>, ConfigError> {
        match raw {
            RawPlugin::Instance(plugin) => Ok(plugin.clone()),
            RawPlugin::Callable(f) => Ok(Arc::new(FnPlugin::new(
                format!("plugins[{}]", index),
                f.clone(),
            ))),
            RawPlugin::Declared(Value::String(name)) => self.instantiate(index, name, &Value::Null),
            RawPlugin::Declared(Value::Object(map)) => {
                let name = map.get("name").and_then(Value::as_str).ok_or_else(|| {
                    ConfigError::InvalidPlugin {
                        index,
                        reason: "plugin object has no string 'name'".to_string(),
                    }
                })?;
                let options = map.get("options").cloned().unwrap_or(Value::Null);
                self.instantiate(index, name, &options)
            }
            RawPlugin::Declared(other) => Err(ConfigError::InvalidPlugin {
                index,
                reason: format!("expected a plugin name or object, found {}", other),
            }),
        }
    }

    fn instantiate(
        &self,
        index: usize,
        name: &str,
        options: &Value,
    ) -> Result<Arc<dyn Plugin>, ConfigError> {
        let factory = self.factories.get(name).ok_or_else(|| ConfigError::UnknownPlugin {
            index,
            name: name.to_string(),
        })?;

        factory(options).map_err(|error| ConfigError::PluginFactory {
            name: name.to_string(),
            error,
        })
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}
