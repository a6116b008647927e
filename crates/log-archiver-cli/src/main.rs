mod commands;
mod logging;
mod progress;
mod report;

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use indicatif::HumanBytes;
use log_archiver_core::config::load_configuration;
use log_archiver_core::naming;
use log_archiver_core::{AppConfig, ArchiveEngine, ArchiveMode, ArchiveSettings, CompressionKind};
use progress::CliReporter;
use tracing::{error, info, warn};

fn main() {
    dotenv().ok();

    let _guard = logging::init_logger();

    let args = Cli::parse();
    let Some(command) = args.command else {
        let _ = Cli::command().print_long_help();
        return;
    };

    let config = match load_configuration(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    if let Commands::PrintConfig = command {
        if let Err(err) = print_config(&config) {
            error!("Error: {:#}", err);
            process::exit(1);
        }
        return;
    }

    let settings = match config.validate() {
        Ok(settings) => settings,
        Err(err) => {
            error!("Invalid configuration: {}", err);
            process::exit(1);
        }
    };

    let result = match command {
        Commands::Run => run_archive(&config, settings),
        Commands::Plan => run_plan(settings),
        Commands::Prune => run_prune(settings),
        Commands::PrintConfig => Ok(()),
    };
    if let Err(err) = result {
        error!("Error: {:#}", err);
        process::exit(1);
    }
}

fn print_config(config: &AppConfig) -> Result<()> {
    let rendered = toml::to_string_pretty(config).context("rendering configuration")?;
    println!("{}", rendered);
    Ok(())
}

fn run_archive(config: &AppConfig, settings: ArchiveSettings) -> Result<()> {
    info!(
        "Archiving logs older than {} days from {} into {} ({} scope, {} mode, {} workers)",
        settings.min_age_days,
        settings.source_dir.display(),
        settings.dest_dir.display(),
        settings.scope.as_str(),
        settings.mode.as_str(),
        settings.workers
    );

    let engine = ArchiveEngine::new(settings);
    let reporter = CliReporter::new();
    let stats = engine.run(&reporter);
    reporter.finish();

    report::print_summary(&stats);

    let report_dir = config
        .report_dir
        .as_deref()
        .filter(|dir| !dir.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    match report::write_run_report(&stats, &report_dir) {
        Ok(path) => info!("Run report written to {}", path.display()),
        Err(err) => warn!("Could not write run report: {:#}", err),
    }

    if stats.has_errors() {
        warn!("Run finished with {} errors", stats.errors.len());
    }
    Ok(())
}

fn run_plan(settings: ArchiveSettings) -> Result<()> {
    let now = Local::now();
    let engine = ArchiveEngine::new(settings);
    let groups = engine.plan(&now).context("planning archive run")?;
    let settings = engine.settings();

    if groups.is_empty() {
        println!("Nothing to archive.");
        return Ok(());
    }

    for group in &groups {
        let target = match (settings.mode, group.reference_time()) {
            (ArchiveMode::PerFile, _) => "one container per file".to_string(),
            (ArchiveMode::Grouped, Some(reference)) => naming::group_container_name(
                &settings.name_pattern,
                &reference,
                settings.scope,
                CompressionKind::Zip,
            ),
            (ArchiveMode::Grouped, None) => continue,
        };
        println!(
            "{}  {} files, {}  -> {}",
            group.key.bold(),
            group.files.len(),
            HumanBytes(group.total_bytes()),
            target.cyan()
        );
    }

    let files: usize = groups.iter().map(|g| g.files.len()).sum();
    println!(
        "{} groups, {} files would be archived into {}",
        groups.len(),
        files,
        settings.dest_dir.display()
    );
    Ok(())
}

fn run_prune(settings: ArchiveSettings) -> Result<()> {
    let engine = ArchiveEngine::new(settings);
    let reporter = CliReporter::new();
    let outcome = engine
        .prune_at(&Local::now(), &reporter)
        .context("applying retention")?;

    println!(
        "Removed {} old archives ({})",
        outcome.removed.len().to_string().green(),
        engine.settings().retention.describe()
    );
    for err in &outcome.errors {
        println!("  {}", err.red());
    }
    Ok(())
}
