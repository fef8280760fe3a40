//! Two-stage defaulting
//!
//! Base defaults run before any plugin and only fill what plugins need to
//! exist (the context directory and infrastructure logging). Full defaults
//! run after plugins and fill everything else from the resolved
//! configuration. Neither stage overwrites a field that is already set.

use crate::core::config::{
    CacheOptions, ConfigError, Configuration, Devtool, LogLevel, ModuleIds, Mode, NodeEnv,
};

pub const DEFAULT_AGGREGATE_TIMEOUT_MS: u64 = 20;
pub const DEFAULT_PARALLELISM: usize = 100;
pub const DEFAULT_ENTRY_IMPORT: &str = "./src";
pub const DEFAULT_FILENAME: &str = "[name].js";
pub const DEFAULT_PUBLIC_PATH: &str = "auto";
pub const DEFAULT_TARGET: &str = "web";
pub const DEFAULT_OUTPUT_DIR: &str = "dist";

const FILENAME_PLACEHOLDERS: &[&str] = &["[name]", "[id]", "[chunkhash]", "[contenthash]"];

/// Fill the fields needed before plugins run
pub fn apply_base_defaults(config: &mut Configuration) -> Result<(), ConfigError> {
    if config.context.is_none() {
        let cwd = std::env::current_dir().map_err(ConfigError::Context)?;
        config.context = Some(cwd);
    }

    let logging = &mut config.infrastructure_logging;
    logging.level.get_or_insert(LogLevel::Info);
    logging.debug.get_or_insert_with(Vec::new);
    logging.colors.get_or_insert_with(console::colors_enabled_stderr);

    Ok(())
}

/// Fill every remaining field; idempotent
pub fn apply_full_defaults(config: &mut Configuration) {
    let mode = *config.mode.get_or_insert(Mode::Production);
    let development = mode == Mode::Development;
    let production = mode == Mode::Production;
    let context = config.context_dir();

    for entry in config.entry.values_mut() {
        entry
            .import
            .get_or_insert_with(|| vec![DEFAULT_ENTRY_IMPORT.to_string()]);
    }

    let output = &mut config.output;
    output
        .path
        .get_or_insert_with(|| context.join(DEFAULT_OUTPUT_DIR));
    let filename = output
        .filename
        .get_or_insert_with(|| DEFAULT_FILENAME.to_string())
        .clone();
    output
        .chunk_filename
        .get_or_insert_with(|| chunk_filename_for(&filename));
    output
        .public_path
        .get_or_insert_with(|| DEFAULT_PUBLIC_PATH.to_string());
    output.clean.get_or_insert(false);

    config.devtool.get_or_insert_with(|| {
        if development {
            Devtool::Named("eval".to_string())
        } else {
            Devtool::Disabled
        }
    });
    config.cache.get_or_insert(if development {
        CacheOptions::Memory
    } else {
        CacheOptions::Disabled
    });
    config
        .target
        .get_or_insert_with(|| DEFAULT_TARGET.to_string());

    let optimization = &mut config.optimization;
    optimization.minimize.get_or_insert(production);
    optimization.node_env.get_or_insert_with(|| match mode {
        Mode::Production => NodeEnv::Value("production".to_string()),
        Mode::Development => NodeEnv::Value("development".to_string()),
        Mode::None => NodeEnv::Disabled,
    });
    optimization.module_ids.get_or_insert(match mode {
        Mode::Production => ModuleIds::Deterministic,
        Mode::Development => ModuleIds::Named,
        Mode::None => ModuleIds::Natural,
    });

    config.watch.get_or_insert(false);
    let watch_options = &mut config.watch_options;
    watch_options
        .aggregate_timeout
        .get_or_insert(DEFAULT_AGGREGATE_TIMEOUT_MS);
    watch_options.follow_symlinks.get_or_insert(false);

    config.parallelism.get_or_insert(DEFAULT_PARALLELISM);
    config.bail.get_or_insert(false);
    config.profile.get_or_insert(false);
}

/// Chunk filename derived from the entry filename
///
/// A filename with a per-chunk placeholder is reused as-is; otherwise `[id].`
/// is prefixed onto its last path segment so chunks get distinct names.
fn chunk_filename_for(filename: &str) -> String {
    if FILENAME_PLACEHOLDERS.iter().any(|p| filename.contains(p)) {
        return filename.to_string();
    }

    match filename.rfind('/') {
        Some(slash) => format!("{}[id].{}", &filename[..=slash], &filename[slash + 1..]),
        None => format!("[id].{}", filename),
    }
}
