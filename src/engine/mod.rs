//! Build engine seam
//!
//! The engine (module graph, chunking, code generation) lives outside this
//! crate. A pipeline hands its final configuration to an [`EngineFactory`]
//! exactly once, and drives the returned [`BuildEngine`] for every pass.

pub mod command;
pub mod stats;

use crate::core::config::Configuration;
use crate::core::hooks::HookRegistry;
use async_trait::async_trait;
use thiserror::Error;

pub use command::{CommandEngine, CommandEngineFactory};
pub use stats::{Asset, BuildStats, CompilationError};

/// Error types for engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to start engine: {0}")]
    Spawn(String),

    #[error("Engine exited with code {code}: {stderr}")]
    Exited { code: i32, stderr: String },

    #[error("Engine protocol error: {0}")]
    Protocol(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// A wired engine instance, owned by one pipeline
#[async_trait]
pub trait BuildEngine: Send + Sync {
    /// Run one build over the whole configuration
    ///
    /// Build problems are reported inside the stats; an `Err` means the
    /// build could not run at all.
    async fn build(&self) -> Result<BuildStats, EngineError>;

    /// Release handles, caches and workers held by the engine
    async fn close(&self) -> Result<(), EngineError>;
}

/// Wires an engine for a fully defaulted configuration
pub trait EngineFactory: Send + Sync {
    /// Called once per pipeline, after full defaults and the environment
    /// hooks. May tap hooks; must not change the configuration.
    fn create(
        &self,
        config: &Configuration,
        hooks: &mut HookRegistry,
    ) -> Result<Box<dyn BuildEngine>, EngineError>;
}
