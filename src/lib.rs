//! packline - bootstrap and orchestration for module-bundler build pipelines

pub mod bootstrap;
pub mod cli;
pub mod core;
pub mod engine;
pub mod execution;
pub mod persistence;
pub mod watch;

// Re-export commonly used types
pub use bootstrap::{Bootstrap, BootstrapError, Handle, Launch};
pub use self::core::{CompilerState, Configuration, Pipeline, Plugin, PluginRegistry, RawConfig, RawInput};
pub use engine::{BuildEngine, BuildStats, CompilationError, EngineError, EngineFactory};
pub use execution::{Completion, Orchestrator, PassOutcome, RunError, SchedulingStrategy, Stats, WatchEvent, Watching};
pub use watch::{PollingWatcher, WatchFileSystem};
