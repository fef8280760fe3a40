//! Compiler lifecycle state

use crate::execution::RunError;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};

/// Lifecycle state of a pipeline or orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompilerState {
    /// Ready to start a pass
    Idle,
    /// A pass is in flight
    Compiling,
    /// Resources are being released
    Closing,
    /// Terminal state
    Closed,
}

impl CompilerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CompilerState::Closing | CompilerState::Closed)
    }
}

/// Why a pass was started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassMode {
    /// Single pass from `run`
    Run,
    /// Initial or change-triggered pass of a watch session
    Watch,
}

#[derive(Debug)]
struct LifecycleInner {
    state: CompilerState,
    watching: bool,
}

/// State machine guarding one compiler: at most one pass in flight, no
/// passes after close, no `run` during a watch session
#[derive(Debug)]
pub struct Lifecycle {
    inner: Mutex<LifecycleInner>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LifecycleInner {
                state: CompilerState::Idle,
                watching: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LifecycleInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> CompilerState {
        self.lock().state
    }

    pub fn is_watching(&self) -> bool {
        self.lock().watching
    }

    /// Move `Idle → Compiling`; the returned guard moves back on drop
    pub fn begin_pass(&self, target: &str, mode: PassMode) -> Result<PassGuard<'_>, RunError> {
        let mut inner = self.lock();

        if inner.state.is_terminal() {
            return Err(RunError::Closed {
                target: target.to_string(),
            });
        }
        if inner.state == CompilerState::Compiling || (inner.watching && mode == PassMode::Run) {
            return Err(RunError::ConcurrentCompilation {
                target: target.to_string(),
            });
        }

        inner.state = CompilerState::Compiling;
        Ok(PassGuard { lifecycle: self })
    }

    fn end_pass(&self) {
        let mut inner = self.lock();
        if inner.state == CompilerState::Compiling {
            inner.state = CompilerState::Idle;
        }
    }

    /// Enter a watch session
    pub fn begin_watch(&self, target: &str) -> Result<(), RunError> {
        let mut inner = self.lock();

        if inner.state.is_terminal() {
            return Err(RunError::Closed {
                target: target.to_string(),
            });
        }
        if inner.watching || inner.state == CompilerState::Compiling {
            return Err(RunError::ConcurrentCompilation {
                target: target.to_string(),
            });
        }

        inner.watching = true;
        Ok(())
    }

    pub fn end_watch(&self) {
        self.lock().watching = false;
    }

    /// Enter `Closing`; false when already closing or closed
    pub fn begin_close(&self) -> bool {
        let mut inner = self.lock();
        if inner.state.is_terminal() {
            return false;
        }
        inner.state = CompilerState::Closing;
        true
    }

    pub fn finish_close(&self) {
        let mut inner = self.lock();
        inner.state = CompilerState::Closed;
        inner.watching = false;
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the lifecycle to `Idle` when the pass ends, however it ends
#[derive(Debug)]
pub struct PassGuard<'a> {
    lifecycle: &'a Lifecycle,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.lifecycle.end_pass();
    }
}
