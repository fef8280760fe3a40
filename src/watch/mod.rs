//! File watching seam used by watch mode
//!
//! A [`WatchFileSystem`] turns a set of root directories plus the
//! configuration's watch options into a stream of aggregated change batches.
//! The watcher owns debounce and ignore handling; the execution controller
//! only reacts to batches.

pub mod poller;

use crate::core::config::WatchOptions;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::mpsc;

pub use poller::PollingWatcher;

/// Messages delivered by a running watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatcherMessage {
    /// One aggregated batch of changed paths
    Changed(Vec<PathBuf>),
    /// The watcher hit an unrecoverable problem and stopped
    Failed(String),
}

/// Watcher-level failures, distinct from per-pass build errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WatchError {
    #[error("Failed to watch {path}: {reason}")]
    Start { path: PathBuf, reason: String },

    #[error("Invalid ignore pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("Watcher failed: {0}")]
    Failed(String),
}

/// Source of change notifications
pub trait WatchFileSystem: Send + Sync {
    /// Start watching `roots`. Watching ends when the receiver is dropped.
    ///
    /// Must be called from within a tokio runtime.
    fn watch(
        &self,
        roots: &[PathBuf],
        options: &WatchOptions,
    ) -> Result<mpsc::Receiver<WatcherMessage>, WatchError>;
}
