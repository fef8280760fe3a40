//! Persistence layer for build pass history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteHistory;

use crate::execution::{ChildOutcome, Completion, PassOutcome, Stats};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// How a pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PassStatus {
    Succeeded,
    /// The engine ran but reported compilation errors
    CompletedWithErrors,
    Failed,
    Skipped,
}

impl fmt::Display for PassStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PassStatus::Succeeded => "succeeded",
            PassStatus::CompletedWithErrors => "completed-with-errors",
            PassStatus::Failed => "failed",
            PassStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

impl FromStr for PassStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "succeeded" => Ok(PassStatus::Succeeded),
            "completed-with-errors" => Ok(PassStatus::CompletedWithErrors),
            "failed" => Ok(PassStatus::Failed),
            "skipped" => Ok(PassStatus::Skipped),
            other => Err(format!("unknown pass status '{}'", other)),
        }
    }
}

/// Summary of one pipeline pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassSummary {
    /// Unique pass ID
    pub pass_id: Uuid,

    /// Pipeline name
    pub pipeline_name: String,

    pub status: PassStatus,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    pub error_count: usize,
    pub warning_count: usize,
    pub asset_count: usize,
}

impl PassSummary {
    fn from_stats(stats: &Stats) -> Self {
        Self {
            pass_id: stats.pass_id,
            pipeline_name: stats.pipeline.clone(),
            status: if stats.has_errors() {
                PassStatus::CompletedWithErrors
            } else {
                PassStatus::Succeeded
            },
            started_at: stats.build.start_time,
            finished_at: stats.build.end_time,
            error_count: stats.build.errors.len(),
            warning_count: stats.build.warnings.len(),
            asset_count: stats.build.assets.len(),
        }
    }

    fn without_build(pipeline_name: &str, status: PassStatus) -> Self {
        let now = Utc::now();
        Self {
            pass_id: Uuid::new_v4(),
            pipeline_name: pipeline_name.to_string(),
            status,
            started_at: now,
            finished_at: now,
            error_count: usize::from(status == PassStatus::Failed),
            warning_count: 0,
            asset_count: 0,
        }
    }
}

/// One summary per pipeline touched by a completion
pub fn summarize(completion: &Completion) -> Vec<PassSummary> {
    match &completion.outcome {
        Some(PassOutcome::Single(stats)) => vec![PassSummary::from_stats(stats)],
        Some(PassOutcome::Multi(multi)) => multi
            .children
            .iter()
            .map(|child| match &child.outcome {
                ChildOutcome::Built(stats) => PassSummary::from_stats(stats),
                ChildOutcome::Failed { .. } => PassSummary::without_build(&child.name, PassStatus::Failed),
                ChildOutcome::Skipped { .. } => PassSummary::without_build(&child.name, PassStatus::Skipped),
            })
            .collect(),
        None => Vec::new(),
    }
}

/// Trait for history backends
#[async_trait::async_trait]
pub trait HistoryBackend: Send + Sync {
    /// Save a pass summary
    async fn save_pass(&self, pass: &PassSummary) -> Result<()>;

    /// Load a pass by ID
    async fn load_pass(&self, pass_id: Uuid) -> Result<Option<PassSummary>>;

    /// Passes of one pipeline, newest first
    async fn list_passes(&self, pipeline_name: &str, limit: usize) -> Result<Vec<PassSummary>>;

    /// Passes of every pipeline, newest first
    async fn recent_passes(&self, limit: usize) -> Result<Vec<PassSummary>>;

    /// List all pipeline names
    async fn list_pipelines(&self) -> Result<Vec<String>>;
}

/// In-memory history (for testing or `--no-history` runs)
pub struct InMemoryHistory {
    passes: tokio::sync::RwLock<Vec<PassSummary>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self {
            passes: tokio::sync::RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryHistory {
    fn default() -> Self {
        Self::new()
    }
}

fn newest_first(mut passes: Vec<PassSummary>, limit: usize) -> Vec<PassSummary> {
    passes.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    passes.truncate(limit);
    passes
}

#[async_trait::async_trait]
impl HistoryBackend for InMemoryHistory {
    async fn save_pass(&self, pass: &PassSummary) -> Result<()> {
        let mut passes = self.passes.write().await;
        passes.retain(|p| p.pass_id != pass.pass_id);
        passes.push(pass.clone());
        Ok(())
    }

    async fn load_pass(&self, pass_id: Uuid) -> Result<Option<PassSummary>> {
        let passes = self.passes.read().await;
        Ok(passes.iter().find(|p| p.pass_id == pass_id).cloned())
    }

    async fn list_passes(&self, pipeline_name: &str, limit: usize) -> Result<Vec<PassSummary>> {
        let passes = self.passes.read().await;
        let matching = passes
            .iter()
            .filter(|p| p.pipeline_name == pipeline_name)
            .cloned()
            .collect();
        Ok(newest_first(matching, limit))
    }

    async fn recent_passes(&self, limit: usize) -> Result<Vec<PassSummary>> {
        let passes = self.passes.read().await;
        Ok(newest_first(passes.clone(), limit))
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let passes = self.passes.read().await;
        let mut names: Vec<String> = passes.iter().map(|p| p.pipeline_name.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}
