//! Pipeline execution: run, watch, close, and multi-pipeline orchestration

pub mod controller;
pub mod error;
pub mod orchestrator;
pub mod outcome;
pub mod scheduler;
pub mod watching;

pub use controller::{run, Compile, WatchSource};
pub use error::RunError;
pub use orchestrator::Orchestrator;
pub use outcome::{ChildOutcome, ChildReport, Completion, MultiStats, PassOutcome, Stats};
pub use scheduler::{DependencyError, SchedulingStrategy};
pub use watching::{WatchEvent, Watching};
