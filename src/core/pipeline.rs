//! Pipeline: one configured compiler instance

use crate::core::config::{Configuration, InfrastructureLogging};
use crate::core::environment::InfrastructureLogger;
use crate::core::hooks::{HookRegistry, Invalidation, PassContext};
use crate::core::state::{CompilerState, Lifecycle, PassMode};
use crate::engine::BuildEngine;
use crate::execution::{Completion, PassOutcome, RunError, Stats};
use crate::execution::controller::{Compile, WatchSource};
use crate::watch::WatchFileSystem;
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Label used for pipelines whose configuration has no `name`
pub const DEFAULT_PIPELINE_NAME: &str = "default";

/// A configured compiler
///
/// Built by [`Bootstrap`](crate::Bootstrap). During construction plugins get
/// `&mut Pipeline` and may change `options` and tap `hooks`. Once
/// construction finishes the pipeline is shared as `Arc<Pipeline>` and no
/// longer changes.
pub struct Pipeline {
    id: Uuid,
    context: PathBuf,

    /// The configuration, completed by defaults during construction
    pub options: Configuration,

    pub hooks: HookRegistry,

    logging: Option<InfrastructureLogging>,
    watch_file_system: Option<Arc<dyn WatchFileSystem>>,
    engine: Option<Box<dyn BuildEngine>>,

    lifecycle: Lifecycle,

    /// Held for the duration of a pass; close acquires it too
    pass_lock: Mutex<()>,
}

impl Pipeline {
    /// Bind a pipeline to its root context and attach its configuration
    pub fn new(context: impl Into<PathBuf>, options: Configuration) -> Self {
        Self {
            id: Uuid::new_v4(),
            context: context.into(),
            options,
            hooks: HookRegistry::new(),
            logging: None,
            watch_file_system: None,
            engine: None,
            lifecycle: Lifecycle::new(),
            pass_lock: Mutex::new(()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The configuration's `name`, or [`DEFAULT_PIPELINE_NAME`]
    pub fn name(&self) -> &str {
        self.options.name.as_deref().unwrap_or(DEFAULT_PIPELINE_NAME)
    }

    pub fn context(&self) -> &Path {
        &self.context
    }

    pub fn state(&self) -> CompilerState {
        self.lifecycle.state()
    }

    pub fn is_watching(&self) -> bool {
        self.lifecycle.is_watching()
    }

    pub fn set_infrastructure_logging(&mut self, logging: InfrastructureLogging) {
        self.logging = Some(logging);
    }

    /// Logger named `name`, configured from infrastructure logging settings
    pub fn infrastructure_logger(&self, name: &str) -> InfrastructureLogger {
        let settings = self
            .logging
            .as_ref()
            .unwrap_or(&self.options.infrastructure_logging);
        InfrastructureLogger::new(self.name(), name, settings)
    }

    pub fn set_watch_file_system(&mut self, watch_file_system: Arc<dyn WatchFileSystem>) {
        self.watch_file_system = Some(watch_file_system);
    }

    pub fn watch_file_system(&self) -> Option<Arc<dyn WatchFileSystem>> {
        self.watch_file_system.clone()
    }

    pub(crate) fn set_engine(&mut self, engine: Box<dyn BuildEngine>) {
        self.engine = Some(engine);
    }

    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    /// Run one pass: fire the pass hooks, build, then `done` or `failed`
    pub async fn compile_pass(&self, mode: PassMode) -> Result<Stats, RunError> {
        let _guard = self.lifecycle.begin_pass(self.name(), mode)?;
        let _pass = self
            .pass_lock
            .try_lock()
            .map_err(|_| RunError::ConcurrentCompilation {
                target: self.name().to_string(),
            })?;

        let context = PassContext {
            pipeline: self.name().to_string(),
            pass_id: Uuid::new_v4(),
            watch: mode == PassMode::Watch,
        };

        debug!("Starting pass {} of pipeline {}", context.pass_id, context.pipeline);

        if context.watch {
            self.hooks.watch_run.call(&context);
        } else {
            self.hooks.before_run.call(&context);
            self.hooks.run.call(&context);
        }

        let result = match &self.engine {
            Some(engine) => engine.build().await.map_err(|e| RunError::Fatal {
                pipeline: context.pipeline.clone(),
                message: e.to_string(),
            }),
            None => Err(RunError::Fatal {
                pipeline: context.pipeline.clone(),
                message: "no engine wired".to_string(),
            }),
        };

        match result {
            Ok(build) => {
                let stats = Stats {
                    pipeline: context.pipeline,
                    pass_id: context.pass_id,
                    build,
                };
                if stats.has_errors() {
                    warn!(
                        "Pipeline {} finished with {} compilation error(s)",
                        stats.pipeline,
                        stats.build.errors.len()
                    );
                } else {
                    info!("Pipeline {} finished", stats.pipeline);
                }
                self.hooks.done.call(&stats);
                Ok(stats)
            }
            Err(err) => {
                error!("{}", err);
                self.hooks.failed.call(&err);
                Err(err)
            }
        }
    }

    /// Release the engine and fire `shutdown`
    ///
    /// Waits for an in-flight pass. Closing twice is a no-op.
    pub async fn close(&self) -> Result<(), RunError> {
        let _pass = self.pass_lock.lock().await;

        if !self.lifecycle.begin_close() {
            debug!("Pipeline {} already closed", self.name());
            return Ok(());
        }

        let result = match &self.engine {
            Some(engine) => engine.close().await.map_err(|e| RunError::Close {
                pipeline: self.name().to_string(),
                message: e.to_string(),
            }),
            None => Ok(()),
        };

        self.hooks.shutdown.call(&());
        self.lifecycle.finish_close();
        debug!("Pipeline {} closed", self.name());

        result
    }

    pub(crate) fn begin_watch(&self) -> Result<(), RunError> {
        self.lifecycle.begin_watch(self.name())
    }

    pub(crate) fn end_watch(&self) {
        if self.lifecycle.is_watching() {
            self.lifecycle.end_watch();
            self.hooks.watch_close.call(&());
        }
    }

    /// What a watcher needs to follow this pipeline's context
    pub fn watch_source(&self) -> WatchSource {
        WatchSource {
            label: self.name().to_string(),
            roots: vec![self.context.clone()],
            options: self.options.watch_options.clone(),
            file_system: self.watch_file_system(),
        }
    }

    pub(crate) fn invalidate(&self, changed: &[PathBuf]) {
        self.hooks.invalid.call(&Invalidation {
            changed: changed.to_vec(),
        });
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("context", &self.context)
            .field("state", &self.state())
            .finish()
    }
}

#[async_trait]
impl Compile for Pipeline {
    fn label(&self) -> String {
        self.name().to_string()
    }

    async fn compile(&self, mode: PassMode) -> Completion {
        match self.compile_pass(mode).await {
            Ok(stats) => Completion::succeeded(PassOutcome::Single(stats)),
            Err(err) => Completion::failed(err),
        }
    }

    async fn close(&self) -> Result<(), RunError> {
        Pipeline::close(self).await
    }

    fn watch_sources(&self) -> Vec<WatchSource> {
        vec![self.watch_source()]
    }

    fn begin_watch(&self) -> Result<(), RunError> {
        Pipeline::begin_watch(self)
    }

    fn end_watch(&self) {
        Pipeline::end_watch(self)
    }

    fn invalidate(&self, _source: usize, changed: &[PathBuf]) {
        Pipeline::invalidate(self, changed)
    }

    async fn recompile(&self, _sources: &[usize]) -> Completion {
        self.compile(PassMode::Watch).await
    }
}
