//! Build statistics reported by the engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A build-level problem reported by the engine
///
/// These travel inside [`BuildStats`]; a pass that produces them still
/// completes normally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilationError {
    pub message: String,

    /// Module that caused the problem, if known
    #[serde(default)]
    pub module: Option<String>,
}

impl CompilationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            module: None,
        }
    }

    pub fn in_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }
}

/// An emitted output file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub name: String,
    pub size: u64,
}

/// Result of one engine build
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStats {
    #[serde(default)]
    pub hash: Option<String>,

    #[serde(default)]
    pub assets: Vec<Asset>,

    #[serde(default)]
    pub errors: Vec<CompilationError>,

    #[serde(default)]
    pub warnings: Vec<String>,

    #[serde(default = "Utc::now")]
    pub start_time: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub end_time: DateTime<Utc>,
}

impl BuildStats {
    /// Empty, error-free stats stamped with the current time
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            hash: None,
            assets: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            start_time: now,
            end_time: now,
        }
    }

    pub fn with_error(mut self, error: CompilationError) -> Self {
        self.errors.push(error);
        self
    }

    pub fn with_asset(mut self, name: impl Into<String>, size: u64) -> Self {
        self.assets.push(Asset {
            name: name.into(),
            size,
        });
        self
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn duration(&self) -> std::time::Duration {
        self.end_time
            .signed_duration_since(self.start_time)
            .to_std()
            .unwrap_or_default()
    }
}

impl Default for BuildStats {
    fn default() -> Self {
        Self::new()
    }
}
