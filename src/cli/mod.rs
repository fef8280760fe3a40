//! Command-line interface

pub mod commands;
pub mod output;
pub mod progress;

use crate::core::plugin::PluginRegistry;
use clap::{Parser, Subcommand};
use commands::{BuildCommand, HistoryCommand, ValidateCommand};
use std::ffi::OsString;

/// Bundler bootstrap and build orchestration
#[derive(Debug, Parser, Clone)]
#[command(name = "packline")]
#[command(author = "Packline Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Builds module-bundler pipelines from configuration", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Build once, or keep rebuilding with --watch
    Build(BuildCommand),

    /// Validate a configuration file
    Validate(ValidateCommand),

    /// Show build history
    History(HistoryCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}

/// Plugins that configuration files can name
pub fn builtin_plugins() -> PluginRegistry {
    PluginRegistry::new().with(progress::PROGRESS_PLUGIN_NAME, progress::ProgressPlugin::from_options)
}
