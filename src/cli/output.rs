//! CLI output formatting

use crate::core::validation::ValidationError;
use crate::execution::{ChildOutcome, Completion, PassOutcome, RunError, Stats};
use crate::persistence::{PassStatus, PassSummary};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static EYES: Emoji<'_, '_> = Emoji("👀 ", "* ");

/// Spinner shown while one pass runs
pub fn pass_spinner(label: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let template = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(template);
    spinner.set_message(format!("Building {}", style(label).cyan()));
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Format a pass status for display
pub fn format_status(status: PassStatus) -> String {
    match status {
        PassStatus::Succeeded => style("SUCCEEDED").green().to_string(),
        PassStatus::CompletedWithErrors => style("ERRORS").yellow().to_string(),
        PassStatus::Failed => style("FAILED").red().to_string(),
        PassStatus::Skipped => style("SKIPPED").dim().to_string(),
    }
}

/// Format a saved pass for display
pub fn format_pass_summary(summary: &PassSummary) -> String {
    let status_icon = match summary.status {
        PassStatus::Succeeded => CHECK,
        PassStatus::CompletedWithErrors => WARN,
        PassStatus::Failed => CROSS,
        PassStatus::Skipped => INFO,
    };
    let duration = summary
        .finished_at
        .signed_duration_since(summary.started_at)
        .to_std()
        .unwrap_or_default();

    format!(
        "{}{} - {} - {} - {} error(s), {} warning(s) - {} ({})",
        status_icon,
        style(&summary.pass_id.to_string()[..8]).dim(),
        style(&summary.pipeline_name).bold(),
        format_status(summary.status),
        summary.error_count,
        summary.warning_count,
        style(summary.started_at.format("%Y-%m-%d %H:%M:%S")).dim(),
        format_duration(duration)
    )
}

fn format_stats(stats: &Stats) -> Vec<String> {
    let mut lines = Vec::new();
    let icon = if stats.has_errors() { CROSS } else { CHECK };
    lines.push(format!(
        "{}{} {} in {}",
        icon,
        style(&stats.pipeline).bold(),
        if stats.has_errors() {
            style("compiled with errors").red().to_string()
        } else {
            style("compiled successfully").green().to_string()
        },
        format_duration(stats.build.duration())
    ));

    for asset in &stats.build.assets {
        lines.push(format!("    {} {}", style(&asset.name).cyan(), style(format_size(asset.size)).dim()));
    }
    for error in &stats.build.errors {
        let location = error
            .module
            .as_ref()
            .map(|m| format!("{}: ", m))
            .unwrap_or_default();
        lines.push(fit_to_terminal(&format!("    {} {}{}", style("ERROR").red(), location, error.message)));
    }
    for warning in &stats.build.warnings {
        lines.push(fit_to_terminal(&format!("    {} {}", style("WARNING").yellow(), warning)));
    }

    lines
}

/// Format a completion as display lines
pub fn format_completion(completion: &Completion) -> Vec<String> {
    let mut lines = Vec::new();

    match &completion.outcome {
        Some(PassOutcome::Single(stats)) => lines.extend(format_stats(stats)),
        Some(PassOutcome::Multi(multi)) => {
            for child in &multi.children {
                match &child.outcome {
                    ChildOutcome::Built(stats) => lines.extend(format_stats(stats)),
                    ChildOutcome::Failed { error } => lines.push(format!(
                        "{}{} {}",
                        CROSS,
                        style(&child.name).bold(),
                        style(error).red()
                    )),
                    ChildOutcome::Skipped { blocked_by } => lines.push(format!(
                        "{}{} skipped ({} did not succeed)",
                        INFO,
                        style(&child.name).dim(),
                        style(blocked_by).bold()
                    )),
                }
            }
        }
        None => {}
    }

    if let Some(error) = &completion.error {
        lines.extend(format_run_error(error));
    }

    lines
}

fn format_run_error(error: &RunError) -> Vec<String> {
    error
        .leaves()
        .into_iter()
        .map(|leaf| fit_to_terminal(&format!("{}{}", CROSS, style(leaf).red())))
        .collect()
}

/// Format schema violations for display
pub fn format_violations(error: &ValidationError) -> Vec<String> {
    let mut lines = vec![format!(
        "{}{}",
        CROSS,
        style("Invalid configuration object:").red().bold()
    )];
    for violation in &error.violations {
        lines.push(format!("  - {} {}", style(&violation.path).bold(), violation.message));
    }
    lines
}

pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else if millis < 60_000 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        let secs = duration.as_secs();
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

pub fn format_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;
    if bytes < KIB {
        format!("{} B", bytes)
    } else if bytes < MIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    }
}

/// Truncate a line to the terminal width, if there is a terminal
pub fn fit_to_terminal(line: &str) -> String {
    match term_size::dimensions_stdout() {
        Some((width, _)) => truncate_visible(line, width),
        None => line.to_string(),
    }
}

fn truncate_visible(line: &str, width: usize) -> String {
    if console::measure_text_width(line) <= width || width < 4 {
        return line.to_string();
    }
    console::truncate_str(line, width, "...").into_owned()
}
