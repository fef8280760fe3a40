//! Errors surfaced by run, watch and close

use crate::watch::WatchError;
use thiserror::Error;

/// Fatal execution errors
///
/// Build problems found by the engine are not errors at this level; they
/// travel inside [`Stats`](crate::execution::Stats).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RunError {
    #[error(
        "You ran '{target}' while a compilation is still running or a watch session is active. \
         Concurrent compilations are not supported"
    )]
    ConcurrentCompilation { target: String },

    #[error("'{target}' has been closed")]
    Closed { target: String },

    #[error("Build of '{pipeline}' failed: {message}")]
    Fatal { pipeline: String, message: String },

    #[error("Closing '{pipeline}' failed: {message}")]
    Close { pipeline: String, message: String },

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error("{} errors: {}", .0.len(), join_errors(.0))]
    Multiple(Vec<RunError>),
}

fn join_errors(errors: &[RunError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl RunError {
    /// Collapse a list of errors into one, if there is any
    pub fn combine(mut errors: Vec<RunError>) -> Option<RunError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(RunError::Multiple(errors)),
        }
    }

    /// True for errors raised by the lifecycle guard rather than by a build
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            RunError::ConcurrentCompilation { .. } | RunError::Closed { .. }
        )
    }

    /// Flattened list of leaf errors
    pub fn leaves(&self) -> Vec<&RunError> {
        match self {
            RunError::Multiple(errors) => errors.iter().flat_map(|e| e.leaves()).collect(),
            other => vec![other],
        }
    }
}
