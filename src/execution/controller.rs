//! Execution controller: the run contract shared by pipelines and orchestrators

use crate::core::config::WatchOptions;
use crate::core::state::PassMode;
use crate::execution::{Completion, RunError};
use crate::watch::WatchFileSystem;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// One watcher subscription: the roots and options of a single pipeline
#[derive(Clone)]
pub struct WatchSource {
    pub label: String,
    pub roots: Vec<PathBuf>,
    pub options: WatchOptions,
    pub file_system: Option<Arc<dyn WatchFileSystem>>,
}

impl std::fmt::Debug for WatchSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchSource")
            .field("label", &self.label)
            .field("roots", &self.roots)
            .field("options", &self.options)
            .field("file_system", &self.file_system.is_some())
            .finish()
    }
}

/// Something that can run build passes: a single pipeline or an orchestrator
#[async_trait]
pub trait Compile: Send + Sync {
    /// Name used in logs and errors
    fn label(&self) -> String;

    /// Run one pass. Never closes.
    async fn compile(&self, mode: PassMode) -> Completion;

    /// Release resources. Waits for an in-flight pass; idempotent.
    async fn close(&self) -> Result<(), RunError>;

    /// One subscription per watched pipeline, indexed by position
    fn watch_sources(&self) -> Vec<WatchSource>;

    fn begin_watch(&self) -> Result<(), RunError>;

    /// Leave watch mode and fire `watch_close`
    fn end_watch(&self);

    /// Fire `invalid` on the pipeline behind `source`
    fn invalidate(&self, source: usize, changed: &[PathBuf]);

    /// Watch pass after `sources` reported changes
    async fn recompile(&self, sources: &[usize]) -> Completion;
}

/// Run exactly one pass, then close, then report one completion
///
/// A rejected run (concurrent or after close) does not close the target:
/// the pass that is already running owns it.
pub async fn run<C: Compile + ?Sized>(target: &C) -> Completion {
    let completion = target.compile(PassMode::Run).await;

    if completion.error.as_ref().map_or(false, RunError::is_rejection) {
        return completion;
    }

    debug!("Closing {} after run", target.label());

    match target.close().await {
        Ok(()) => completion,
        Err(close_err) if completion.error.is_some() => {
            warn!("{} also failed to close: {}", target.label(), close_err);
            completion
        }
        Err(close_err) => completion.with_error(close_err),
    }
}
