//! Bootstrap: raw configuration in, runnable pipeline or orchestrator out

use crate::core::config::{ConfigError, RawConfig, RawInput};
use crate::core::defaults::{apply_base_defaults, apply_full_defaults};
use crate::core::environment::EnvironmentPlugin;
use crate::core::pipeline::Pipeline;
use crate::core::plugin::{Plugin, PluginRegistry};
use crate::core::state::CompilerState;
use crate::core::validation::{validate, ValidationError};
use crate::engine::{EngineError, EngineFactory};
use crate::execution::{
    self, Completion, DependencyError, Orchestrator, RunError, SchedulingStrategy, WatchEvent, Watching,
};
use crate::watch::{PollingWatcher, WatchFileSystem};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Errors that stop construction before anything runs
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Plugin '{plugin}' failed to apply to pipeline '{pipeline}': {error:#}")]
    PluginApplication {
        pipeline: String,
        plugin: String,
        error: anyhow::Error,
    },

    #[error("Failed to wire engine for pipeline '{pipeline}': {source}")]
    EngineWiring {
        pipeline: String,
        #[source]
        source: EngineError,
    },

    #[error(transparent)]
    Dependency(#[from] DependencyError),

    #[error("configuration[{index}]: {source}")]
    Entry {
        index: usize,
        #[source]
        source: Box<BootstrapError>,
    },
}

/// Builds pipelines from raw configuration
///
/// Owns the collaborators every pipeline is wired with: the engine factory,
/// the named-plugin registry and the watch file system.
pub struct Bootstrap {
    engines: Arc<dyn EngineFactory>,
    plugins: PluginRegistry,
    watch_file_system: Arc<dyn WatchFileSystem>,
    strategy: SchedulingStrategy,
}

impl Bootstrap {
    pub fn new<E: EngineFactory + 'static>(engines: E) -> Self {
        Self {
            engines: Arc::new(engines),
            plugins: PluginRegistry::new(),
            watch_file_system: Arc::new(PollingWatcher::new()),
            strategy: SchedulingStrategy::default(),
        }
    }

    pub fn with_plugins(mut self, plugins: PluginRegistry) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn with_watch_file_system(mut self, watch_file_system: Arc<dyn WatchFileSystem>) -> Self {
        self.watch_file_system = watch_file_system;
        self
    }

    pub fn with_strategy(mut self, strategy: SchedulingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Validate `input`, then build a pipeline or an orchestrator from it
    pub fn create(&self, input: &RawInput) -> Result<Handle, BootstrapError> {
        validate(input)?;

        match input {
            RawInput::Single(raw) => Ok(Handle::Single(Arc::new(self.create_pipeline(raw)?))),
            RawInput::Multi(raws) => Ok(Handle::Multi(Arc::new(self.create_orchestrator(raws)?))),
        }
    }

    /// Build, then either run once or start watching, depending on the
    /// configuration's `watch` flag
    pub async fn launch(&self, input: &RawInput) -> Result<Launch, BootstrapError> {
        let handle = self.create(input)?;

        if handle.should_watch() {
            match handle.watch() {
                Ok((watching, events)) => Ok(Launch::Watching {
                    handle,
                    watching,
                    events,
                }),
                Err(e) => Ok(Launch::Ran(Completion::failed(e))),
            }
        } else {
            Ok(Launch::Ran(handle.run().await))
        }
    }

    /// Construct one pipeline. Validation is the caller's job.
    pub fn create_pipeline(&self, raw: &RawConfig) -> Result<Pipeline, BootstrapError> {
        let mut options = crate::core::normalization::normalize(raw, &self.plugins)?;
        apply_base_defaults(&mut options)?;

        let context = options.context_dir();
        let plugins = options.plugins.clone();
        let mut pipeline = Pipeline::new(context, options);

        let environment = EnvironmentPlugin::new(
            pipeline.options.infrastructure_logging.clone(),
            self.watch_file_system.clone(),
        );
        apply_plugin(&mut pipeline, &environment)?;

        for plugin in &plugins {
            apply_plugin(&mut pipeline, plugin.as_ref())?;
        }

        apply_full_defaults(&mut pipeline.options);

        pipeline.hooks.environment.call(&());
        pipeline.hooks.after_environment.call(&());

        let engine = {
            let Pipeline { options, hooks, .. } = &mut pipeline;
            self.engines.create(options, hooks)
        }
        .map_err(|source| BootstrapError::EngineWiring {
            pipeline: pipeline.name().to_string(),
            source,
        })?;
        pipeline.set_engine(engine);

        pipeline.hooks.initialize.call(&());

        info!(
            "Created pipeline {} ({} plugin(s), mode {})",
            pipeline.name(),
            plugins.len(),
            pipeline.options.mode()
        );

        Ok(pipeline)
    }

    /// Construct every pipeline in order, then wire dependencies
    pub fn create_orchestrator(&self, raws: &[RawConfig]) -> Result<Orchestrator, BootstrapError> {
        let children = raws
            .iter()
            .enumerate()
            .map(|(index, raw)| {
                self.create_pipeline(raw).map_err(|e| BootstrapError::Entry {
                    index,
                    source: Box::new(e),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Orchestrator::new(children, self.strategy)?)
    }
}

fn apply_plugin(pipeline: &mut Pipeline, plugin: &dyn Plugin) -> Result<(), BootstrapError> {
    debug!("Applying plugin {} to {}", plugin.name(), pipeline.name());

    plugin
        .apply(pipeline)
        .map_err(|error| BootstrapError::PluginApplication {
            pipeline: pipeline.name().to_string(),
            plugin: plugin.name().to_string(),
            error,
        })
}

/// A constructed build: one pipeline or an orchestrator of several
#[derive(Clone)]
pub enum Handle {
    Single(Arc<Pipeline>),
    Multi(Arc<Orchestrator>),
}

impl Handle {
    /// Whether the configuration asks for watch mode (any child, for many)
    pub fn should_watch(&self) -> bool {
        match self {
            Handle::Single(pipeline) => pipeline.options.is_watch(),
            Handle::Multi(orchestrator) => orchestrator.children().iter().any(|c| c.options.is_watch()),
        }
    }

    /// One pass, then close; exactly one completion
    pub async fn run(&self) -> Completion {
        match self {
            Handle::Single(pipeline) => execution::run(pipeline.as_ref()).await,
            Handle::Multi(orchestrator) => execution::run(orchestrator.as_ref()).await,
        }
    }

    /// Initial pass, then one pass per change batch; never closes
    pub fn watch(&self) -> Result<(Watching, mpsc::UnboundedReceiver<WatchEvent>), RunError> {
        match self {
            Handle::Single(pipeline) => Watching::start(pipeline.clone()),
            Handle::Multi(orchestrator) => Watching::start(orchestrator.clone()),
        }
    }

    pub async fn close(&self) -> Result<(), RunError> {
        match self {
            Handle::Single(pipeline) => pipeline.close().await,
            Handle::Multi(orchestrator) => orchestrator.close().await,
        }
    }

    pub fn state(&self) -> CompilerState {
        match self {
            Handle::Single(pipeline) => pipeline.state(),
            Handle::Multi(orchestrator) => orchestrator.state(),
        }
    }

    /// Every pipeline behind this handle, in input order
    pub fn pipelines(&self) -> Vec<Arc<Pipeline>> {
        match self {
            Handle::Single(pipeline) => vec![pipeline.clone()],
            Handle::Multi(orchestrator) => orchestrator.children().to_vec(),
        }
    }
}

/// Result of [`Bootstrap::launch`]
pub enum Launch {
    Ran(Completion),
    Watching {
        handle: Handle,
        watching: Watching,
        events: mpsc::UnboundedReceiver<WatchEvent>,
    },
}
