mod sink;

use chrono::Utc;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use qualwatch_anomaly::runner::{AnomalyRunner, InboundMessage, NotificationRunner};
use qualwatch_anomaly::{DedupVerdict, Deduplicator, NatsAlertSink, QualwatchConfig, load_config};
use qualwatch_core::{Normalizer, SinkRecord};
use std::path::PathBuf;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "qualwatch-worker")]
#[command(about = "Report quality stream workers", long_about = None)]
struct Cli {
    /// TOML config file (all defaults when omitted)
    #[arg(short, long, env = "QUALWATCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Normalize and deduplicate events into ClickHouse
    Ingest,
    /// Windowed anomaly detection, publishing alerts
    Detect,
    /// Send published alerts to Slack
    Notify,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => {
            info!(path = %path.display(), "Loading config");
            load_config(path)?
        }
        None => QualwatchConfig::default(),
    };
    config.validate()?;

    //connect to NATS
    info!(url = %config.nats.url, "Connecting to NATS...");
    let nats = async_nats::connect(config.nats.url.as_str()).await?;
    info!("Connected to NATS!");

    match cli.command {
        Command::Ingest => ingest(&config, nats).await,
        Command::Detect => detect(config, nats).await,
        Command::Notify => notify(&config, nats).await,
    }
}

async fn ingest(
    config: &QualwatchConfig,
    nats: async_nats::Client,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Connecting to ClickHouse...");
    let clickhouse = sink::connect(&config.clickhouse);
    sink::create_events_table(&clickhouse).await?;
    info!(database = %config.clickhouse.database, "Connected to ClickHouse!");

    let events = nats.subscribe(config.nats.events_subject.clone()).await?;
    let backfill = nats.subscribe(config.nats.backfill_subject.clone()).await?;
    info!(
        events = %config.nats.events_subject,
        backfill = %config.nats.backfill_subject,
        "Subscribed"
    );

    let normalizer = Normalizer::default();
    let mut dedup = Deduplicator::new(&config.dedup);
    let mut messages = futures::stream::select(events, backfill).map(InboundMessage::from);

    //process messages
    while let Some(message) = messages.next().await {
        let event = match normalizer.normalize(&message.payload, &message.attributes) {
            Ok(event) => event,
            Err(reason) => {
                warn!(category = reason.category(), reason = %reason, "Dropping inbound message");
                continue;
            }
        };

        if dedup.check(&event.insert_id, Utc::now()) == DedupVerdict::Duplicate {
            debug!(insert_id = %event.insert_id, team_id = %event.team_id, "Duplicate event suppressed");
            continue;
        }

        if let Err(e) = sink::insert_event(&clickhouse, &SinkRecord::from(&event)).await {
            error!(insert_id = %event.insert_id, error = %e, "Failed to insert event");
        }
    }
    Ok(())
}

async fn detect(
    config: QualwatchConfig,
    nats: async_nats::Client,
) -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = nats.subscribe(config.nats.events_subject.clone()).await?;
    let sink = NatsAlertSink::new(nats.clone(), config.nats.alerts_subject.clone());
    info!(
        events = %config.nats.events_subject,
        alerts = %config.nats.alerts_subject,
        "Subscribed"
    );

    let runner = AnomalyRunner::new(config)?;
    let summary = runner.run(subscriber.map(InboundMessage::from), sink).await;

    // flush alerts published during the final drain
    nats.flush().await?;
    info!(summary = ?summary, "Detector finished");
    Ok(())
}

async fn notify(
    config: &QualwatchConfig,
    nats: async_nats::Client,
) -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = nats.subscribe(config.nats.alerts_subject.clone()).await?;
    info!(alerts = %config.nats.alerts_subject, "Subscribed");

    let mut runner = NotificationRunner::new(config);
    let summary = runner
        .run(subscriber.map(|message| message.payload.to_vec()))
        .await;

    info!(summary = ?summary, "Notifier finished");
    Ok(())
}
