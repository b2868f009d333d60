//! CLI entry point for the lanwatch daemon.

use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use lanwatch_core::{ScanTrigger, ScanType};

use lanwatch_discover::api;
use lanwatch_discover::config::DiscoverConfig;
use lanwatch_discover::engine::Engine;
use lanwatch_discover::orchestrator::ScanTarget;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

#[derive(Parser)]
#[command(name = "lanwatch")]
#[command(about = "LAN discovery and monitoring daemon")]
struct Cli {
    /// Range to scan in --once mode (CIDR, span or single address).
    /// Defaults to the saved default range or the local network.
    #[arg(short, long)]
    target: Option<String>,

    /// Scan type: quick, full.
    #[arg(short, long, default_value = "full")]
    scan_type: String,

    /// Run a single full scan, print its summary and exit.
    #[arg(long)]
    once: bool,

    /// Run as daemon: REST API plus scheduled scans.
    #[arg(long)]
    daemon: bool,

    /// Override the API bind address.
    #[arg(long)]
    bind: Option<String>,

    /// Config file prefix (default: lanwatch).
    #[arg(short, long, default_value = "lanwatch")]
    config: String,

    #[arg(long, value_enum, default_value = "json")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match cli.log_format {
        LogFormat::Json => fmt().with_env_filter(filter).json().init(),
        LogFormat::Pretty => fmt().with_env_filter(filter).init(),
    }

    let mut config = load_config(&cli.config)?;
    if let Some(bind) = &cli.bind {
        config.bind = bind.clone();
    }

    if cli.once {
        let scan_type: ScanType = cli.scan_type.parse().map_err(anyhow::Error::msg)?;
        let target = match cli.target.clone() {
            Some(range) => ScanTarget::Range(range),
            None => ScanTarget::Default,
        };
        let engine = Engine::build(config).await?;
        let job = engine
            .orchestrator
            .run_scan(target, scan_type, ScanTrigger::Manual)
            .await?;
        engine.shutdown();
        println!("{}", serde_json::to_string_pretty(&job)?);
    } else if cli.daemon {
        run_daemon(config).await?;
    } else {
        anyhow::bail!("Specify --once (one-shot scan) or --daemon (API and scheduled scans)");
    }

    Ok(())
}

async fn run_daemon(config: DiscoverConfig) -> anyhow::Result<()> {
    let bind = config.bind.clone();
    let engine = Arc::new(Engine::build(config).await?);
    let shutdown = CancellationToken::new();

    let scheduler = engine.scheduler.clone();
    let scheduler_token = shutdown.clone();
    let scheduler_task = tokio::spawn(async move { scheduler.run(scheduler_token).await });

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
        }
        tracing::info!("Shutdown requested");
        signal_token.cancel();
    });

    let served = api::serve(engine.clone(), &bind, shutdown.clone()).await;
    shutdown.cancel();
    if let Err(e) = scheduler_task.await {
        tracing::error!(error = %e, "Scheduler task panicked");
    }
    engine.shutdown();
    served?;
    Ok(())
}

fn load_config(file_prefix: &str) -> anyhow::Result<DiscoverConfig> {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix("LANWATCH")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    match cfg.get::<DiscoverConfig>("lanwatch") {
        Ok(c) => Ok(c),
        Err(config::ConfigError::NotFound(_)) => Ok(DiscoverConfig::default()),
        Err(e) => Err(anyhow::anyhow!("invalid configuration: {e}")),
    }
}
