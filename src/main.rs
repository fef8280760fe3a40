use anyhow::{Context, Result};
use packline::cli::commands::{BuildCommand, HistoryCommand, ValidateCommand};
use packline::cli::output::*;
use packline::cli::progress::{ProgressPlugin, PROGRESS_PLUGIN_NAME};
use packline::cli::{builtin_plugins, Cli, Command};
use packline::core::validation::validate;
use packline::engine::CommandEngineFactory;
#[cfg(feature = "sqlite")]
use packline::persistence::SqliteHistory;
use packline::persistence::{summarize, HistoryBackend, InMemoryHistory};
use packline::{Bootstrap, BootstrapError, Completion, Handle, RawConfig, RawInput, WatchEvent};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    // Execute command
    match &cli.command {
        Command::Build(cmd) => build(cmd).await?,
        Command::Validate(cmd) => validate_config(cmd)?,
        Command::History(cmd) => show_history(cmd).await?,
    }

    Ok(())
}

fn declares_plugin(config: &RawConfig, name: &str) -> bool {
    config
        .document
        .get("plugins")
        .and_then(Value::as_array)
        .map_or(false, |plugins| {
            plugins.iter().any(|p| {
                p.as_str() == Some(name) || p.get("name").and_then(Value::as_str) == Some(name)
            })
        })
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{}", line);
    }
}

async fn build(cmd: &BuildCommand) -> Result<()> {
    let mut input = RawInput::from_file(&cmd.config)
        .with_context(|| format!("Failed to load configuration {}", cmd.config))?;

    if let Some(mode) = &cmd.mode {
        input.override_field("mode", json!(mode));
    }
    if cmd.watch {
        input.override_field("watch", json!(true));
    }
    if !cmd.no_progress && console::user_attended() {
        for config in input.configs_mut() {
            if !declares_plugin(config, PROGRESS_PLUGIN_NAME) {
                config.extra_plugins.push(packline::core::config::RawPlugin::Instance(Arc::new(
                    ProgressPlugin::new(),
                )));
            }
        }
    }

    // Set up history
    let store: Arc<dyn HistoryBackend> = if cmd.no_history {
        Arc::new(InMemoryHistory::new())
    } else {
        persistent_history().await?
    };

    let bootstrap = Bootstrap::new(CommandEngineFactory::new(&cmd.engine, cmd.timeout))
        .with_plugins(builtin_plugins())
        .with_strategy(cmd.strategy.into());

    let handle = match bootstrap.create(&input) {
        Ok(handle) => handle,
        Err(BootstrapError::Validation(e)) => {
            print_lines(format_violations(&e));
            std::process::exit(1);
        }
        Err(e) => return Err(e).context("Failed to set up build"),
    };

    println!(
        "{}Building {} pipeline(s) from {}",
        ROCKET,
        style(input.len()).cyan(),
        style(&cmd.config).bold()
    );

    if handle.should_watch() {
        watch(&handle, store.as_ref()).await
    } else {
        let completion = handle.run().await;
        report(&completion, store.as_ref()).await;

        if !completion.is_success() {
            error!("Build did not complete successfully");
            std::process::exit(1);
        }
        Ok(())
    }
}

async fn watch(handle: &Handle, store: &dyn HistoryBackend) -> Result<()> {
    let (watching, mut events) = handle.watch().context("Failed to start watch mode")?;
    println!("{}Watching for changes (Ctrl-C to stop)", EYES);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(WatchEvent::Pass(completion)) => report(&completion, store).await,
                Some(WatchEvent::WatcherFailed(e)) => {
                    println!("{}{}", CROSS, style(&e).red());
                    break;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!("{}Stopping watch", INFO);
                break;
            }
        }
    }

    watching.stop().await;
    handle.close().await.context("Failed to close build")?;
    Ok(())
}

async fn report(completion: &Completion, store: &dyn HistoryBackend) {
    print_lines(format_completion(completion));

    for summary in summarize(completion) {
        if let Err(e) = store.save_pass(&summary).await {
            warn!("Failed to save pass {} to history: {:#}", summary.pass_id, e);
        }
    }
}

fn validate_config(cmd: &ValidateCommand) -> Result<()> {
    println!("{}Validating {}...", INFO, style(&cmd.config).bold());

    let input = RawInput::from_file(&cmd.config)
        .with_context(|| format!("Failed to load configuration {}", cmd.config))?;

    if let Err(e) = validate(&input) {
        print_lines(format_violations(&e));
        std::process::exit(1);
    }

    println!("{}Configuration is valid!", CHECK);
    println!("  Configurations: {}", style(input.len()).cyan());

    if cmd.json {
        // Wiring a command engine spawns nothing; it only encodes the configuration
        let handle = Bootstrap::new(CommandEngineFactory::new("packline-engine", 0))
            .with_plugins(builtin_plugins())
            .create(&input)
            .context("Failed to resolve configuration")?;

        let resolved = handle
            .pipelines()
            .iter()
            .map(|p| p.options.to_json())
            .collect::<Result<Vec<_>, _>>()?;
        let json = match resolved.as_slice() {
            [single] => serde_json::to_string_pretty(single)?,
            _ => serde_json::to_string_pretty(&resolved)?,
        };
        println!("\n{}", json);
    }

    Ok(())
}

#[cfg(feature = "sqlite")]
async fn persistent_history() -> Result<Arc<dyn HistoryBackend>> {
    Ok(Arc::new(SqliteHistory::with_default_path().await?))
}

#[cfg(not(feature = "sqlite"))]
async fn persistent_history() -> Result<Arc<dyn HistoryBackend>> {
    warn!("Built without the sqlite feature; pass history is kept in memory only");
    Ok(Arc::new(InMemoryHistory::new()))
}

async fn show_history(cmd: &HistoryCommand) -> Result<()> {
    let store = persistent_history().await?;

    let passes = match &cmd.pipeline {
        Some(pipeline_name) => store.list_passes(pipeline_name, cmd.limit).await?,
        None => store.recent_passes(cmd.limit).await?,
    };

    if passes.is_empty() {
        println!("{}No passes found", INFO);
        return Ok(());
    }

    if cmd.json {
        let data = json!({ "passes": passes });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        println!("{}Build history (showing latest {}):", INFO, cmd.limit);
        for summary in &passes {
            println!("  {}", format_pass_summary(summary));
        }
    }

    Ok(())
}
