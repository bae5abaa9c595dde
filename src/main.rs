mod backends;
mod config;
mod error;
mod hunt_filter;
mod hunt_manager;
mod protocol;
mod retry;
mod sampling;
mod state_ledger;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info, warn};

use backends::build_backend;
use config::{load_config, resolve_instances, state_database_path};
use error::HuntError;
use hunt_manager::{log_summary, HuntManager, HuntTarget};
use protocol::RunSummary;
use sampling::PageSampler;
use state_ledger::StateLedger;

const EXIT_INSTANCE_FAILURES: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_STATE_STORE_ERROR: u8 = 3;

/// Search missing and upgrade-eligible media in Sonarr/Radarr.
#[derive(Debug, Parser)]
#[command(
    name = "huntarr",
    version,
    about = "Search missing & upgrade media in Sonarr/Radarr"
)]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Show what would be searched without triggering searches or touching state
    #[arg(long)]
    dry_run: bool,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,
}

fn setup_logging(verbose: bool) {
    let mut clog = colog::default_builder();
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    clog.filter(None, level);
    clog.filter_module("ureq", log::LevelFilter::Warn);
    clog.filter_module("rustls", log::LevelFilter::Warn);
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));
}

fn run(cli: &Cli) -> Result<RunSummary, HuntError> {
    let config = load_config(&cli.config)?;
    let instances = resolve_instances(&config)?;
    if instances.is_empty() {
        warn!("No [[sonarr]] or [[radarr]] instances configured");
    }

    let db_path = state_database_path(&config)?;
    let ledger = if cli.dry_run {
        StateLedger::open_read_only(&db_path)?
    } else {
        StateLedger::open(&db_path)?
    };
    info!(
        "Using state ledger path={} records={} read_only={}",
        db_path.display(),
        ledger.record_count()?,
        ledger.is_read_only()
    );

    let targets: Vec<HuntTarget> = instances
        .into_iter()
        .map(|instance| HuntTarget {
            backend: build_backend(&instance, &config.http),
            instance,
        })
        .collect();

    let sampler = PageSampler::new(rand::rng(), &config.sampling);
    let mut manager = HuntManager::new(&ledger, sampler, config.sampling.page_size, cli.dry_run);
    manager.run(&targets)
}

fn exit_code_for_summary(summary: &RunSummary) -> u8 {
    if summary.has_failures() {
        EXIT_INSTANCE_FAILURES
    } else {
        0
    }
}

fn exit_code_for_error(err: &HuntError) -> u8 {
    match err {
        HuntError::Config(_) => EXIT_CONFIG_ERROR,
        HuntError::StateStore(_) => EXIT_STATE_STORE_ERROR,
        HuntError::InstanceUnreachable { .. } | HuntError::TriggerFailed { .. } => {
            EXIT_INSTANCE_FAILURES
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    if cli.dry_run {
        info!("=== DRY RUN MODE - no searches will be triggered ===");
    }

    match run(&cli) {
        Ok(summary) => {
            log_summary(&summary);
            ExitCode::from(exit_code_for_summary(&summary))
        }
        Err(err) => {
            error!("{err}");
            ExitCode::from(exit_code_for_error(&err))
        }
    }
}
