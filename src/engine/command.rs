//! Engine backed by an external bundler executable
//!
//! Each build runs `<program> build` with the resolved configuration as JSON
//! on stdin, and reads a JSON [`BuildStats`] document from stdout.

use crate::core::config::Configuration;
use crate::core::hooks::HookRegistry;
use crate::engine::{BuildEngine, BuildStats, EngineError, EngineFactory};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Creates a [`CommandEngine`] per pipeline
#[derive(Debug, Clone)]
pub struct CommandEngineFactory {
    /// Path to the engine executable
    program: String,

    /// Timeout for one build in seconds
    timeout_secs: u64,
}

impl CommandEngineFactory {
    pub fn new(program: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            program: program.into(),
            timeout_secs,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl EngineFactory for CommandEngineFactory {
    fn create(
        &self,
        config: &Configuration,
        _hooks: &mut HookRegistry,
    ) -> Result<Box<dyn BuildEngine>, EngineError> {
        let options = serde_json::to_string(config)
            .map_err(|e| EngineError::Internal(format!("Failed to encode configuration: {}", e)))?;

        Ok(Box::new(CommandEngine {
            program: self.program.clone(),
            timeout_secs: self.timeout_secs,
            options,
        }))
    }
}

/// Engine that runs one subprocess per build
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: String,
    timeout_secs: u64,

    /// Resolved configuration, encoded once at wiring time
    options: String,
}

impl CommandEngine {
    async fn spawn_build(&self) -> Result<std::process::Output, EngineError> {
        let mut child = Command::new(&self.program)
            .arg("build")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Spawn(format!("{}: {}", self.program, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(self.options.as_bytes()).await {
                Ok(()) => {}
                // The engine exited without reading its input; its exit status tells the rest.
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Err(e) => {
                    return Err(EngineError::Internal(format!(
                        "Failed to write configuration: {}",
                        e
                    )))
                }
            }
        }

        child
            .wait_with_output()
            .await
            .map_err(|e| EngineError::Internal(format!("Failed to wait for engine: {}", e)))
    }
}

#[async_trait]
impl BuildEngine for CommandEngine {
    async fn build(&self) -> Result<BuildStats, EngineError> {
        debug!(
            "Spawning engine {} with {} bytes of configuration",
            self.program,
            self.options.len()
        );

        let output = timeout(Duration::from_secs(self.timeout_secs), self.spawn_build())
            .await
            .map_err(|_| EngineError::Timeout(self.timeout_secs))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let code = output.status.code().unwrap_or(-1);
            warn!("engine exited with code {}: {}", code, stderr);
            return Err(EngineError::Exited { code, stderr });
        }

        let stats: BuildStats = serde_json::from_slice(&output.stdout)
            .map_err(|e| EngineError::Protocol(format!("Failed to decode engine stats: {}", e)))?;

        debug!(
            "engine reported {} assets, {} errors",
            stats.assets.len(),
            stats.errors.len()
        );

        Ok(stats)
    }

    async fn close(&self) -> Result<(), EngineError> {
        // Each build is its own process; nothing outlives it.
        Ok(())
    }
}
