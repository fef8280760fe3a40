//! CLI command definitions

use crate::execution::SchedulingStrategy;
use clap::Args;

/// Default configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "packline.yaml";

/// Build the configured pipelines
#[derive(Debug, Args, Clone)]
pub struct BuildCommand {
    /// Path to configuration file (YAML, or JSON by extension)
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: String,

    /// Keep watching and rebuild on change
    #[arg(short, long)]
    pub watch: bool,

    /// Override the build mode of every configuration
    #[arg(long, value_parser = ["development", "production", "none"])]
    pub mode: Option<String>,

    /// Scheduling strategy for multi-configuration builds
    #[arg(long, value_enum, default_value_t = SchedulingStrategyArg::Parallel)]
    pub strategy: SchedulingStrategyArg,

    /// Engine executable invoked as `<engine> build`
    #[arg(long, default_value = "packline-engine")]
    pub engine: String,

    /// Timeout for one engine build, in seconds
    #[arg(long, default_value_t = 600)]
    pub timeout: u64,

    /// Don't show a progress spinner
    #[arg(long)]
    pub no_progress: bool,

    /// Don't save passes to history
    #[arg(long)]
    pub no_history: bool,
}

/// Validate a configuration file
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: String,

    /// Print the fully defaulted configuration as JSON
    #[arg(long)]
    pub json: bool,
}

/// Show build history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Pipeline name to filter by
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Number of recent passes to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Scheduling strategy argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SchedulingStrategyArg {
    Sequential,
    Parallel,
    #[clap(name = "parallel-limited")]
    ParallelLimited,
}

impl From<SchedulingStrategyArg> for SchedulingStrategy {
    fn from(arg: SchedulingStrategyArg) -> Self {
        match arg {
            SchedulingStrategyArg::Sequential => SchedulingStrategy::Sequential,
            SchedulingStrategyArg::Parallel => SchedulingStrategy::Parallel,
            SchedulingStrategyArg::ParallelLimited => SchedulingStrategy::LimitedParallel(4),
        }
    }
}
