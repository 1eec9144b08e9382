use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use telemetry_analytics::alerter::AlertDispatcher;
use telemetry_analytics::cache::{CacheGateway, MemoryCache, NoopCache};
use telemetry_analytics::config::Config;
use telemetry_analytics::events::EventBus;
use telemetry_analytics::ingest;
use telemetry_analytics::service::AnalyticsService;

#[derive(Parser, Debug)]
#[command(name = "telemetry-analytics", about = "Rolling z-score anomaly detection over device telemetry")]
struct Cli {
    /// Path to configuration file; built-in defaults when omitted
    #[arg(short, long)]
    config: Option<String>,

    /// Read newline-delimited JSON samples from this file instead of stdin
    #[arg(short, long)]
    input: Option<String>,

    /// Validate config and exit
    #[arg(long)]
    check: bool,

    /// Print version and exit
    #[arg(short, long)]
    version: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("telemetry-analytics {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = match cli.config.as_deref() {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    if cli.check {
        println!("Configuration is valid.");
        return Ok(());
    }

    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        instance = %config.service.instance,
        "Starting telemetry analytics"
    );

    if let Err(e) = run(config, cli.input).await {
        error!(error = %e, "Terminated with error");
        return Err(e);
    }

    Ok(())
}

fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.service.log_level));

    // Logs go to stderr; stdout carries results.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(config: Config, input: Option<String>) -> Result<()> {
    let cache: Arc<dyn CacheGateway> = if config.cache.enabled {
        Arc::new(MemoryCache::new())
    } else {
        Arc::new(NoopCache)
    };

    let (bus, subscription) = EventBus::new(config.events.queue_capacity);
    let dispatcher = AlertDispatcher::new(
        &config.alerting,
        config.analytics.zscore_threshold,
        &config.service.instance,
    )?;
    let dispatcher_handle = tokio::spawn(dispatcher.run(subscription));

    let service = AnalyticsService::new(&config.analytics, &config.cache, cache, bus);

    match input {
        Some(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("Failed to open input file: {}", path))?;
            ingest_lines(&service, BufReader::new(file)).await?;
        }
        None => ingest_lines(&service, BufReader::new(tokio::io::stdin())).await?,
    }

    let summary = service.get_summary().await;
    info!(
        devices = summary.total_devices,
        samples = summary.total_metrics,
        anomalies = summary.anomaly_count,
        dropped_events = service.events().dropped(),
        "Input finished"
    );
    println!("{}", serde_json::to_string(&summary)?);

    // Dropping the service closes the bus so the dispatcher can drain and exit.
    drop(service);
    dispatcher_handle.await.context("Anomaly dispatcher panicked")?;

    Ok(())
}

async fn ingest_lines<R>(service: &AnalyticsService, reader: R) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read input")?,
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal, stopping ingestion");
                None
            }
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let sample = match ingest::parse_line(&line) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "Skipping invalid sample");
                continue;
            }
        };

        match service.process_sample(sample).await {
            Ok(result) => println!("{}", serde_json::to_string(&result)?),
            Err(e) => warn!(error = %e, "Sample rejected"),
        }
    }
    Ok(())
}
