//! Results of build passes

use crate::engine::BuildStats;
use crate::execution::RunError;
use serde::Serialize;
use uuid::Uuid;

/// Outcome of one pipeline pass
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub pipeline: String,
    pub pass_id: Uuid,
    pub build: BuildStats,
}

impl Stats {
    pub fn has_errors(&self) -> bool {
        self.build.has_errors()
    }

    pub fn has_warnings(&self) -> bool {
        self.build.has_warnings()
    }
}

/// What happened to one child of an orchestrator during a pass
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ChildOutcome {
    /// The engine ran; the stats may still carry compilation errors
    Built(Stats),
    /// The pass could not run
    Failed { error: String },
    /// Not attempted because a dependency did not succeed
    Skipped { blocked_by: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ChildReport {
    pub name: String,
    pub outcome: ChildOutcome,
}

/// Aggregate outcome of an orchestrator pass, children in input order
#[derive(Debug, Clone, Default, Serialize)]
pub struct MultiStats {
    pub children: Vec<ChildReport>,
}

impl MultiStats {
    pub fn child(&self, name: &str) -> Option<&ChildReport> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Stats of the children that actually built
    pub fn built(&self) -> Vec<&Stats> {
        self.children
            .iter()
            .filter_map(|c| match &c.outcome {
                ChildOutcome::Built(stats) => Some(stats),
                _ => None,
            })
            .collect()
    }

    pub fn has_errors(&self) -> bool {
        self.children.iter().any(|c| match &c.outcome {
            ChildOutcome::Built(stats) => stats.has_errors(),
            ChildOutcome::Failed { .. } | ChildOutcome::Skipped { .. } => true,
        })
    }
}

/// Single or aggregate pass outcome
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum PassOutcome {
    Single(Stats),
    Multi(MultiStats),
}

impl PassOutcome {
    pub fn has_errors(&self) -> bool {
        match self {
            PassOutcome::Single(stats) => stats.has_errors(),
            PassOutcome::Multi(multi) => multi.has_errors(),
        }
    }

    pub fn stats(&self) -> Vec<&Stats> {
        match self {
            PassOutcome::Single(stats) => vec![stats],
            PassOutcome::Multi(multi) => multi.built(),
        }
    }
}

/// What a completion callback receives: an error slot and a result slot,
/// either or both of which may be filled
#[derive(Debug, Clone)]
pub struct Completion {
    pub error: Option<RunError>,
    pub outcome: Option<PassOutcome>,
}

impl Completion {
    pub fn succeeded(outcome: PassOutcome) -> Self {
        Self {
            error: None,
            outcome: Some(outcome),
        }
    }

    pub fn failed(error: RunError) -> Self {
        Self {
            error: Some(error),
            outcome: None,
        }
    }

    /// Fold an additional error into the error slot
    pub fn with_error(mut self, error: RunError) -> Self {
        self.error = match self.error.take() {
            None => Some(error),
            Some(RunError::Multiple(mut errors)) => {
                errors.push(error);
                Some(RunError::Multiple(errors))
            }
            Some(existing) => Some(RunError::Multiple(vec![existing, error])),
        };
        self
    }

    /// No fatal error and no compilation errors
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.outcome.as_ref().map_or(false, |o| !o.has_errors())
    }

    pub fn into_result(self) -> Result<PassOutcome, RunError> {
        match (self.error, self.outcome) {
            (Some(error), _) => Err(error),
            (None, Some(outcome)) => Ok(outcome),
            (None, None) => Err(RunError::Fatal {
                pipeline: String::new(),
                message: "pass produced no outcome".to_string(),
            }),
        }
    }
}
