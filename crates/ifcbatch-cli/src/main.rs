use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use ifcbatch_core::config::ConfigManager;
use ifcbatch_core::logging::init_tracing;
use ifcbatch_core::orchestrator::ExportOrchestrator;

#[derive(Parser)]
#[command(name = "ifcbatch")]
#[command(version)]
#[command(about = "Incremental batch export of CAD models to IFC")]
struct Cli {
    /// Configuration file; created with defaults when missing.
    #[arg(short, long, default_value = "ifcbatch.toml")]
    config: PathBuf,

    /// Plan the run and write manifests and job tables, but do not
    /// launch the converter.
    #[arg(long)]
    dry_run: bool,

    /// Verbose logging here and a debug flag for the converter.
    #[arg(long)]
    debug: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(success) => {
            if success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<bool> {
    let cli = Cli::parse();

    let mut manager = ConfigManager::new(&cli.config);
    manager
        .load_or_create()
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    manager.ensure_dirs_exist().context("creating run directories")?;

    let default_directive = if cli.debug { "debug" } else { "info" };
    // Keep the appender guard alive until exit or the tail of the file
    // log is dropped.
    let _guard = init_tracing(default_directive, Some(&manager.logs_folder()));

    tracing::info!(
        version = ifcbatch_core::version(),
        config = %cli.config.display(),
        dry_run = cli.dry_run,
        "starting export run"
    );

    let summary = ExportOrchestrator::new(manager.settings().clone())
        .with_dry_run(cli.dry_run)
        .with_debug(cli.debug)
        .run()
        .context("export run failed")?;

    match serde_json::to_string(&summary) {
        Ok(json) => tracing::info!(summary = %json, "run summary"),
        Err(e) => tracing::warn!(error = %e, "could not serialize the run summary"),
    }

    Ok(summary.success())
}
