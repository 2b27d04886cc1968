//! quotawatchd - usage and quota telemetry daemon.
//!
//! Discovers provider credentials, then runs the refresh scheduler: poll all
//! configured providers, persist snapshots to the history database, and
//! evaluate threshold alerts, either once or on a timer.

#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use quotawatch::core::{http, logging};
use quotawatch::discovery::DiscoveryService;
use quotawatch::orchestrator::UsageOrchestrator;
use quotawatch::providers::AdapterRegistry;
use quotawatch::scheduler::{LogNotifier, NotificationSink, RefreshScheduler};
use quotawatch::storage::{AppPaths, ConfigStore, HistoryStore, SnapshotHistory};

#[derive(Parser)]
#[command(name = "quotawatchd", version, about = "Usage and quota telemetry daemon")]
struct Cli {
    /// Refresh interval in minutes (overrides stored preferences).
    #[arg(long)]
    interval: Option<u64>,

    /// Alert threshold in effective-used percent (overrides stored preferences).
    #[arg(long)]
    threshold: Option<f64>,

    /// Path to the credential/preferences file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the history database.
    #[arg(long)]
    history: Option<PathBuf>,

    /// Run one refresh cycle and exit.
    #[arg(long)]
    once: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "QUOTAWATCH_LOG")]
    log_level: Option<String>,

    /// Emit JSON logs.
    #[arg(long)]
    json_logs: bool,

    /// Verbose output.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = cli
        .log_level
        .as_deref()
        .and_then(logging::LogLevel::from_arg)
        .unwrap_or_default();
    let log_format = if cli.json_logs {
        logging::LogFormat::Json
    } else {
        logging::parse_log_format_from_env().unwrap_or_default()
    };
    let log_file = logging::parse_log_file_from_env();
    logging::init(log_level, log_format, log_file, cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("quotawatchd: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> quotawatch::Result<()> {
    let paths = AppPaths::new();
    paths.ensure_dirs()?;

    let config_store = ConfigStore::new(cli.config.unwrap_or_else(|| paths.auth_file()));
    let existing = config_store.load_providers()?;
    let mut preferences = config_store.load_preferences()?;
    if let Some(interval) = cli.interval {
        preferences.refresh_interval_minutes = interval.max(1);
    }
    if let Some(threshold) = cli.threshold {
        preferences.alert_threshold = threshold;
    }

    let discovery = DiscoveryService::with_defaults();
    let configs = discovery.discover_configurations(existing).await;
    config_store.save_providers(&configs)?;
    info!(
        providers = configs.len(),
        configured = configs.iter().filter(|c| c.has_key()).count(),
        "credential discovery complete"
    );

    let history = Arc::new(HistoryStore::open(
        &cli.history.unwrap_or_else(|| paths.history_db_file()),
    )?);
    match history.cleanup_default() {
        Ok(0) => {}
        Ok(deleted) => info!(deleted, "expired history rows removed"),
        Err(e) => warn!(error = %e, "history cleanup failed"),
    }

    let registry = AdapterRegistry::with_defaults(http::default_client()?);
    let orchestrator = UsageOrchestrator::new(registry);

    let scheduler = Arc::new(RefreshScheduler::new(
        orchestrator,
        Arc::clone(&history) as Arc<dyn SnapshotHistory>,
        Arc::new(LogNotifier) as Arc<dyn NotificationSink>,
        configs,
        preferences,
    ));

    if cli.once {
        scheduler.refresh_once().await?;
        let telemetry = scheduler.telemetry();
        info!(
            cycles = telemetry.count,
            avg_latency_ms = telemetry.avg_latency_ms,
            "refresh complete"
        );
        return Ok(());
    }

    scheduler.run().await;
    Ok(())
}
