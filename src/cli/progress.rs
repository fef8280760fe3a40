//! Progress spinner plugin

use crate::cli::output::{format_duration, pass_spinner, CHECK, CROSS, WARN};
use crate::core::pipeline::Pipeline;
use crate::core::plugin::Plugin;
use console::style;
use indicatif::ProgressBar;
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// Name under which configuration files refer to the plugin
pub const PROGRESS_PLUGIN_NAME: &str = "progress";

type Slot = Arc<Mutex<Option<ProgressBar>>>;

/// Shows a spinner while a pass runs and a one-line result when it ends
pub struct ProgressPlugin {
    prefix: Option<String>,
}

impl ProgressPlugin {
    pub fn new() -> Self {
        Self { prefix: None }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Factory for `{ name: progress, options: { prefix } }`
    pub fn from_options(options: &Value) -> anyhow::Result<Arc<dyn Plugin>> {
        let mut plugin = Self::new();
        match options.get("prefix") {
            None => {}
            Some(Value::String(prefix)) => plugin = plugin.with_prefix(prefix.clone()),
            Some(other) => anyhow::bail!("'prefix' should be a string, found {}", other),
        }
        Ok(Arc::new(plugin))
    }
}

impl Default for ProgressPlugin {
    fn default() -> Self {
        Self::new()
    }
}

fn take(slot: &Slot) -> Option<ProgressBar> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).take()
}

impl Plugin for ProgressPlugin {
    fn name(&self) -> &str {
        PROGRESS_PLUGIN_NAME
    }

    fn apply(&self, pipeline: &mut Pipeline) -> anyhow::Result<()> {
        let label = self
            .prefix
            .clone()
            .unwrap_or_else(|| pipeline.name().to_string());
        let slot: Slot = Arc::new(Mutex::new(None));

        let start = {
            let slot = slot.clone();
            let label = label.clone();
            move || {
                let spinner = pass_spinner(&label);
                let previous = slot
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .replace(spinner);
                if let Some(previous) = previous {
                    previous.finish_and_clear();
                }
            }
        };
        let on_watch_run = start.clone();
        pipeline.hooks.before_run.tap(PROGRESS_PLUGIN_NAME, move |_| start());
        pipeline.hooks.watch_run.tap(PROGRESS_PLUGIN_NAME, move |_| on_watch_run());

        let done_slot = slot.clone();
        let done_label = label.clone();
        pipeline.hooks.done.tap(PROGRESS_PLUGIN_NAME, move |stats| {
            let Some(spinner) = take(&done_slot) else {
                return;
            };
            let icon = if stats.has_errors() {
                CROSS
            } else if stats.has_warnings() {
                WARN
            } else {
                CHECK
            };
            spinner.finish_with_message(format!(
                "{}{} built in {} ({} asset(s), {} error(s))",
                icon,
                style(&done_label).bold(),
                format_duration(stats.build.duration()),
                stats.build.assets.len(),
                stats.build.errors.len()
            ));
        });

        pipeline.hooks.failed.tap(PROGRESS_PLUGIN_NAME, move |error| {
            if let Some(spinner) = take(&slot) {
                spinner.abandon_with_message(format!("{}{}: {}", CROSS, style(&label).bold(), style(error).red()));
            }
        });

        Ok(())
    }
}
