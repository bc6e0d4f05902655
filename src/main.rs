//! Council-Harvest main entry point
//!
//! This is the command-line interface for the Council-Harvest collector.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use council_harvest::config::{compute_config_hash, load_config_with_hash, validate, Config};
use council_harvest::crawler::{harvest, RunContext};
use council_harvest::output::{load_statistics, print_statistics};
use council_harvest::storage::SqliteStorage;
use council_harvest::{HarvestError, Phase, RunMode};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Council-Harvest: a polite, resumable collector of council records
///
/// Collects council members, their yearly document counts and the metadata
/// of every document, skipping documents already stored by earlier runs.
#[derive(Parser, Debug)]
#[command(name = "council-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A polite, resumable collector of council records", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults apply when omitted)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Which phases to run: full, basic or detailed
    #[arg(short, long, default_value = "full")]
    mode: RunMode,

    /// Log level
    #[arg(long, value_name = "LEVEL", value_enum, ignore_case = true)]
    log_level: Option<LogLevel>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,

    /// Validate config and show what would run without fetching anything
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,
}

/// Accepted values of `--log-level`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Error,
    #[value(alias = "warning")]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_directive(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.log_level, cli.verbose, cli.quiet);

    let (config, config_hash) = match load(cli.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };
    tracing::info!("Configuration loaded (hash: {})", config_hash);

    let result = if cli.dry_run {
        handle_dry_run(&config, cli.mode);
        Ok(())
    } else if cli.stats {
        handle_stats(&config)
    } else {
        handle_harvest(config, config_hash, cli.mode).await
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(HarvestError::Interrupted) => {
            tracing::warn!("Interrupted by user");
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Loads the configuration file, or the defaults when no file is given
fn load(path: Option<&Path>) -> anyhow::Result<(Config, String)> {
    match path {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            load_config_with_hash(path)
                .with_context(|| format!("failed to load configuration from {}", path.display()))
        }
        None => {
            let config = Config::default();
            validate(&config).context("built-in defaults are invalid")?;
            Ok((config, compute_config_hash("")))
        }
    }
}

/// Sets up the logging/tracing subscriber
///
/// `RUST_LOG` wins when set; otherwise `--log-level`, then `-v`/`-q`.
fn setup_logging(log_level: Option<LogLevel>, verbose: u8, quiet: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if quiet {
            return EnvFilter::new("error");
        }
        if let Some(level) = log_level {
            return EnvFilter::new(format!("council_harvest={},warn", level.as_directive()));
        }
        match verbose {
            0 => EnvFilter::new("council_harvest=info,warn"),
            1 => EnvFilter::new("council_harvest=debug,info"),
            2 => EnvFilter::new("council_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the effective configuration and phases
fn handle_dry_run(config: &Config, mode: RunMode) {
    println!("=== Council-Harvest Dry Run ===\n");

    println!("Source:");
    println!("  Base URL: {}", config.source.base_url);
    println!("  Members page: {}", config.source.members_path);
    println!("  Detail index: {}", config.source.index_path);
    println!("  Timeout: {}s", config.source.timeout_secs);

    println!("\nThrottle:");
    println!("  Request delay: {}ms", config.throttle.request_delay_ms);
    println!("  Batch delay: {}ms", config.throttle.batch_delay_ms);
    println!("  Document delay: {}ms", config.throttle.document_delay_ms);
    println!(
        "  Retries: {} (backoff base {}ms)",
        config.throttle.max_retries, config.throttle.retry_delay_ms
    );

    println!("\nCollection:");
    println!("  Minimum year: {}", config.collection.min_year);
    println!("  Flush threshold: {}", config.collection.flush_threshold);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Images: {}", config.output.image_dir);
    println!("  Metrics: {}", config.output.metrics_dir);

    println!("\nPhases ({} mode):", mode);
    for phase in Phase::all_phases() {
        let mark = if mode.includes(phase) { "run" } else { "skip" };
        println!("  {:<12} {}", phase.name(), mark);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> Result<(), HarvestError> {
    println!("Database: {}\n", config.output.database_path);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&storage, config.collection.top_n)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles a harvest run, wiring Ctrl-C to the cancellation token
async fn handle_harvest(config: Config, config_hash: String, mode: RunMode) -> Result<(), HarvestError> {
    let cancel = CancellationToken::new();

    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing current step");
            signal_token.cancel();
        }
    });

    let ctx = RunContext::new(config, config_hash);
    let summary = harvest(ctx, mode, cancel).await?;

    for outcome in &summary.outcomes {
        tracing::info!("{}: {}", outcome.phase, outcome);
    }
    if let Some(path) = &summary.metrics_path {
        tracing::info!("Metrics: {}", path.display());
    }
    Ok(())
}
