//! Backup Sync - Main entry point
//!
//! One invocation performs one run over every job file in the jobs
//! directory, then exits.

use anyhow::{Context, Result};
use backup_sync::config::{discover_jobs, Config};
use backup_sync::storage::{CommandGateway, Gateway, LocalGateway};
use backup_sync::utils::{self, process::CommandRunner, shutdown::ShutdownCoordinator};
use backup_sync::Orchestrator;
use chrono::Local;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Jobs directory (overrides config)
    #[arg(short, long, value_name = "DIR")]
    jobs_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Log storage commands instead of running them
    #[arg(long)]
    dry_run: bool,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        Config::from_file(config_path)
            .with_context(|| format!("Failed to load config {}", config_path.display()))?
    } else {
        Config::default()
    };
    if let Some(jobs_dir) = args.jobs_dir {
        config.paths.jobs_dir = jobs_dir;
    }
    if args.dry_run {
        config.storage.dry_run = true;
    }

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::info!(
        "Starting backup-sync v{} (jobs: {})",
        env!("CARGO_PKG_VERSION"),
        config.paths.jobs_dir.display()
    );

    let shutdown = ShutdownCoordinator::new();
    let runner = CommandRunner::new(config.command_timeout(), shutdown.token());
    let signals = shutdown.clone();
    let signal_handle = tokio::spawn(async move { signals.wait_for_signal().await });

    let jobs = discover_jobs(&config.paths.jobs_dir)?;

    let gateway = Gateway::new(
        CommandGateway::new(
            &config.storage.tool,
            config.storage.tool_dir.as_deref(),
            runner.clone(),
            config.storage.dry_run,
        ),
        LocalGateway::new(config.storage.dry_run),
    );
    let orchestrator = Orchestrator::new(&config, &gateway, runner);

    let result = orchestrator.run(&jobs, Local::now().naive_local()).await;

    shutdown.shutdown();
    let _ = signal_handle.await;

    let report = result?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.render_text());
    }

    if report.has_failures() {
        tracing::warn!("Run finished with failures");
    }

    Ok(())
}
