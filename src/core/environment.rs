//! Environment wiring applied to every pipeline before user plugins

use crate::core::config::{InfrastructureLogging, LogLevel};
use crate::core::pipeline::Pipeline;
use crate::core::plugin::Plugin;
use crate::watch::WatchFileSystem;
use std::fmt::Display;
use std::sync::Arc;

/// Logger handed to plugins and engines for infrastructure messages
///
/// Events go to `tracing` under the `packline::infrastructure` target. The
/// configured level filters them first; names matching a `debug` pattern
/// log at verbose level regardless.
#[derive(Debug, Clone)]
pub struct InfrastructureLogger {
    pipeline: String,
    name: String,
    level: LogLevel,
}

impl InfrastructureLogger {
    pub fn new(pipeline: impl Into<String>, name: impl Into<String>, settings: &InfrastructureLogging) -> Self {
        let name = name.into();
        let debug_enabled = settings
            .debug
            .as_deref()
            .unwrap_or_default()
            .iter()
            .any(|pattern| pattern == "*" || name.starts_with(pattern.as_str()));

        let level = if debug_enabled {
            LogLevel::Verbose
        } else {
            settings.level.unwrap_or(LogLevel::Info)
        };

        Self {
            pipeline: pipeline.into(),
            name,
            level,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        level != LogLevel::None && level <= self.level
    }

    pub fn error(&self, message: impl Display) {
        if self.enabled(LogLevel::Error) {
            tracing::error!(target: "packline::infrastructure", pipeline = %self.pipeline, logger = %self.name, "{}", message);
        }
    }

    pub fn warn(&self, message: impl Display) {
        if self.enabled(LogLevel::Warn) {
            tracing::warn!(target: "packline::infrastructure", pipeline = %self.pipeline, logger = %self.name, "{}", message);
        }
    }

    pub fn info(&self, message: impl Display) {
        if self.enabled(LogLevel::Info) {
            tracing::info!(target: "packline::infrastructure", pipeline = %self.pipeline, logger = %self.name, "{}", message);
        }
    }

    pub fn log(&self, message: impl Display) {
        if self.enabled(LogLevel::Log) {
            tracing::debug!(target: "packline::infrastructure", pipeline = %self.pipeline, logger = %self.name, "{}", message);
        }
    }

    pub fn debug(&self, message: impl Display) {
        if self.enabled(LogLevel::Verbose) {
            tracing::trace!(target: "packline::infrastructure", pipeline = %self.pipeline, logger = %self.name, "{}", message);
        }
    }
}

/// Installs infrastructure logging and the watch file system
pub struct EnvironmentPlugin {
    logging: InfrastructureLogging,
    watch_file_system: Arc<dyn WatchFileSystem>,
}

impl EnvironmentPlugin {
    pub fn new(logging: InfrastructureLogging, watch_file_system: Arc<dyn WatchFileSystem>) -> Self {
        Self {
            logging,
            watch_file_system,
        }
    }
}

impl Plugin for EnvironmentPlugin {
    fn name(&self) -> &str {
        "EnvironmentPlugin"
    }

    fn apply(&self, pipeline: &mut Pipeline) -> anyhow::Result<()> {
        pipeline.set_infrastructure_logging(self.logging.clone());
        pipeline.set_watch_file_system(self.watch_file_system.clone());

        let logger = pipeline.infrastructure_logger("packline.EnvironmentPlugin");
        pipeline.hooks.invalid.tap("EnvironmentPlugin", move |invalidation| {
            logger.log(format!("{} file(s) changed", invalidation.changed.len()));
        });

        Ok(())
    }
}
