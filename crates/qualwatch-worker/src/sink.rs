//! ClickHouse sink for normalized quality events

use clickhouse::Client;
use qualwatch_anomaly::config::ClickHouseConfig;
use qualwatch_core::SinkRecord;
use tracing::{debug, info};

pub fn connect(config: &ClickHouseConfig) -> Client {
    Client::default()
        .with_url(&config.url)
        .with_database(&config.database)
}

// ReplacingMergeTree collapses rows sharing an insert_id, which finishes
// the job of the best-effort dedup in front of it
pub async fn create_events_table(client: &Client) -> Result<(), clickhouse::error::Error> {
    client.query(r#"
        CREATE TABLE IF NOT EXISTS quality_events (
            insert_id String,
            team_id String,
            report_id String,
            event_ts DateTime64(3),
            overallScore Nullable(Float64),
            coverage Nullable(Float64),
            gaps Nullable(UInt32),
            overlaps Nullable(UInt32),
            avgDur Nullable(Float64),
            source Nullable(String),
            load_ts Nullable(DateTime64(3))
        ) ENGINE = ReplacingMergeTree()
        ORDER BY insert_id
        PARTITION BY toYYYYMM(event_ts)
    "#).execute().await?;

    info!("quality_events table ready");
    Ok(())
}

pub async fn insert_event(client: &Client, record: &SinkRecord) -> Result<(), clickhouse::error::Error> {
    client.query(r#"
        INSERT INTO quality_events (insert_id, team_id, report_id, event_ts, overallScore, coverage, gaps, overlaps, avgDur, source, load_ts)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    "#)
    .bind(&record.insert_id)
    .bind(&record.team_id)
    .bind(&record.report_id)
    .bind(record.event_ts.timestamp_millis())
    .bind(record.overall_score)
    .bind(record.coverage)
    .bind(record.gaps)
    .bind(record.overlaps)
    .bind(record.avg_duration)
    .bind(&record.source)
    .bind(record.load_ts.map(|t| t.timestamp_millis()))
    .execute()
    .await?;

    debug!(insert_id = %record.insert_id, "Event stored in ClickHouse");
    Ok(())
}
