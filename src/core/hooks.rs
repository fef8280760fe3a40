//! Per-pipeline extension hooks
//!
//! Every pipeline owns one [`HookRegistry`]: a fixed set of named hooks built
//! when the pipeline is created. Listeners are appended with `tap` and invoked
//! synchronously, in registration order, with `call`. There is no priority
//! ordering, de-duplication or short-circuiting.

use crate::execution::{RunError, Stats};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Listener attached to a hook
pub type Listener<A> = Box<dyn Fn(&A) + Send + Sync>;

struct Tap<A> {
    name: String,
    listener: Listener<A>,
}

/// Ordered, synchronous extension point
pub struct SyncHook<A> {
    name: &'static str,
    taps: Vec<Tap<A>>,
}

impl<A> SyncHook<A> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            taps: Vec::new(),
        }
    }

    /// Canonical hook name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Append a listener; `name` identifies the tapping plugin
    pub fn tap<F>(&mut self, name: impl Into<String>, listener: F)
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        self.taps.push(Tap {
            name: name.into(),
            listener: Box::new(listener),
        });
    }

    /// Invoke every listener in registration order
    pub fn call(&self, arg: &A) {
        for tap in &self.taps {
            (tap.listener)(arg);
        }
    }

    /// Names of the tapping plugins, in registration order
    pub fn tap_names(&self) -> Vec<&str> {
        self.taps.iter().map(|tap| tap.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.taps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taps.is_empty()
    }
}

impl<A> fmt::Debug for SyncHook<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncHook")
            .field("name", &self.name)
            .field("taps", &self.tap_names())
            .finish()
    }
}

/// Argument of the per-pass hooks
#[derive(Debug, Clone)]
pub struct PassContext {
    pub pipeline: String,
    pub pass_id: Uuid,
    pub watch: bool,
}

/// Argument of the `invalid` hook: the change batch that triggered a rebuild
#[derive(Debug, Clone)]
pub struct Invalidation {
    pub changed: Vec<PathBuf>,
}

/// The fixed hook set of a pipeline
#[derive(Debug)]
pub struct HookRegistry {
    /// Fired after full defaults, before engine wiring
    pub environment: SyncHook<()>,
    pub after_environment: SyncHook<()>,
    /// Fired once construction is complete
    pub initialize: SyncHook<()>,

    pub before_run: SyncHook<PassContext>,
    pub run: SyncHook<PassContext>,
    pub watch_run: SyncHook<PassContext>,
    pub invalid: SyncHook<Invalidation>,
    pub done: SyncHook<Stats>,
    pub failed: SyncHook<RunError>,
    pub watch_close: SyncHook<()>,
    pub shutdown: SyncHook<()>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self {
            environment: SyncHook::new("environment"),
            after_environment: SyncHook::new("afterEnvironment"),
            initialize: SyncHook::new("initialize"),
            before_run: SyncHook::new("beforeRun"),
            run: SyncHook::new("run"),
            watch_run: SyncHook::new("watchRun"),
            invalid: SyncHook::new("invalid"),
            done: SyncHook::new("done"),
            failed: SyncHook::new("failed"),
            watch_close: SyncHook::new("watchClose"),
            shutdown: SyncHook::new("shutdown"),
        }
    }

    /// Names of every hook in the registry
    pub fn names(&self) -> Vec<&'static str> {
        vec![
            self.environment.name(),
            self.after_environment.name(),
            self.initialize.name(),
            self.before_run.name(),
            self.run.name(),
            self.watch_run.name(),
            self.invalid.name(),
            self.done.name(),
            self.failed.name(),
            self.watch_close.name(),
            self.shutdown.name(),
        ]
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}
