use clap::{Parser, Subcommand};
use funding_anomaly_engine::{
    config::EngineConfig,
    engine::{AnomalyEngine, EngineHealth, PassKind, PassScheduler},
    store::{AnomalyResultStore, SqliteStore},
    utils::{logger, metrics},
    EngineError, UpdateZone, Result,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "anomaly-engine")]
#[command(about = "Funding-rate statistical anomaly engine")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/anomaly-engine.toml")]
    config: PathBuf,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log file path
    #[arg(long, default_value = "logs/anomaly-engine.log")]
    log_file: PathBuf,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bootstrap, then run active and stable passes until interrupted
    Run,
    /// Run a single pass and print its report
    Pass {
        /// Contracts to cover: all, active or stable
        #[arg(long, default_value = "all")]
        zone: PassKind,
    },
    /// Validate configuration
    Validate,
    /// Show stored zone membership
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let _guard = logger::init(&cli.log_level, &cli.log_file, cli.json_logs)?;

    info!("Starting {} v{}", funding_anomaly_engine::APP_NAME, funding_anomaly_engine::VERSION);

    let config = EngineConfig::from_file(&cli.config)?;
    info!("Configuration loaded from: {}", cli.config.display());

    if let Commands::Validate = cli.command {
        return validate_config(config);
    }
    config.validate()?;

    match cli.command {
        Commands::Run => run_scheduler(config).await,
        Commands::Pass { zone } => run_single_pass(config, zone).await,
        Commands::Validate => Ok(()),
        Commands::Status => show_status(config).await,
    }
}

async fn run_scheduler(config: EngineConfig) -> Result<()> {
    if config.monitoring.enable_metrics {
        metrics::install_prometheus(&config.monitoring.metrics_listen_addr)?;
        info!("Metrics exporter listening on {}", config.monitoring.metrics_listen_addr);
    }

    let store = Arc::new(SqliteStore::open(&config.storage.database_path)?);
    let health = EngineHealth::new();
    let engine = Arc::new(AnomalyEngine::new(store, config, health.clone()));
    let (scheduler, handle) = PassScheduler::new(engine)?;

    let task = tokio::spawn(scheduler.run());

    tokio::signal::ctrl_c().await?;
    info!("Interrupt received, stopping after the current pass");
    handle.stop();

    match task.await {
        Ok(result) => result?,
        Err(e) => return Err(EngineError::Scheduler(format!("scheduler task aborted: {}", e)).into()),
    }

    let snapshot = health.snapshot().await;
    info!(
        succeeded = snapshot.passes_succeeded,
        failed = snapshot.passes_failed,
        "Engine shut down"
    );
    Ok(())
}

async fn run_single_pass(config: EngineConfig, kind: PassKind) -> Result<()> {
    let store = Arc::new(SqliteStore::open(&config.storage.database_path)?);
    let engine = AnomalyEngine::new(store, config, EngineHealth::new());

    if kind != PassKind::Bootstrap && engine.store().zone_membership().await?.is_empty() {
        warn!("No stored zone membership; every contract with data will be treated as unclassified");
    }

    let report = engine.run_pass(kind).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn validate_config(config: EngineConfig) -> Result<()> {
    info!("Validating configuration...");

    match config.validate() {
        Ok(_) => {
            info!("Configuration is valid");
            println!("Configuration validation passed!");
            Ok(())
        }
        Err(e) => {
            error!("Configuration validation failed: {}", e);
            Err(e)
        }
    }
}

async fn show_status(config: EngineConfig) -> Result<()> {
    let store = SqliteStore::open(&config.storage.database_path)?;
    let membership = store.zone_membership().await?;
    let active = membership.values().filter(|zone| **zone == UpdateZone::Active).count();

    println!("Engine Status:");
    println!("  Version: {}", funding_anomaly_engine::VERSION);
    println!("  Database: {}", config.storage.database_path);
    println!("  Contracts scored: {}", membership.len());
    println!("  Active zone: {}", active);
    println!("  Stable zone: {}", membership.len() - active);

    Ok(())
}
