//! Core domain models
//!
//! This module defines configuration (raw and normalized), validation and
//! defaulting, plugins, hooks, and the pipeline they come together in.

pub mod config;
pub mod defaults;
pub mod environment;
pub mod hooks;
pub mod normalization;
pub mod pipeline;
pub mod plugin;
pub mod state;
pub mod validation;

pub use config::{Configuration, RawConfig, RawInput};
pub use hooks::{HookRegistry, SyncHook};
pub use pipeline::Pipeline;
pub use plugin::{FnPlugin, Plugin, PluginRegistry};
pub use state::{CompilerState, PassMode};
