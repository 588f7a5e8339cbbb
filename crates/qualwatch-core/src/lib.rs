//! Core types for report quality monitoring
//! this crate contains the shared data structures used across all components.
pub mod backfill;
pub mod normalize;

pub use normalize::{DropReason, Normalizer};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// QUALITY EVENT //

/// One quality measurement for one report, as produced by the normalizer.
/// Immutable once created; windows share it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityEvent {
    pub insert_id: String, // idempotency key

    pub team_id: String,

    pub report_id: String,

    #[serde(rename = "event_ts")]
    pub event_time: DateTime<Utc>, // authoritative time used for windowing

    #[serde(rename = "overallScore")]
    pub overall_score: f64, // [0, 1]

    pub coverage: f64, // [0, 1]

    pub gaps: u32,

    pub overlaps: u32,

    #[serde(rename = "avgDur")]
    pub avg_duration: f64,

    pub source: String, // "stream", "backfill", ...

    #[serde(rename = "load_ts")]
    pub load_time: DateTime<Utc>, // when the normalizer saw it
}

// SINK RECORD (append-only store row)

/// Row appended to the persisted store. Metric columns are nullable there,
/// `insert_id` is the key the store deduplicates on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkRecord {
    pub insert_id: String,
    pub team_id: String,
    pub report_id: String,
    pub event_ts: DateTime<Utc>,

    #[serde(rename = "overallScore")]
    pub overall_score: Option<f64>,
    pub coverage: Option<f64>,
    pub gaps: Option<u32>,
    pub overlaps: Option<u32>,
    #[serde(rename = "avgDur")]
    pub avg_duration: Option<f64>,

    pub source: Option<String>,
    pub load_ts: Option<DateTime<Utc>>,
}

impl From<&QualityEvent> for SinkRecord {
    fn from(event: &QualityEvent) -> Self {
        Self {
            insert_id: event.insert_id.clone(),
            team_id: event.team_id.clone(),
            report_id: event.report_id.clone(),
            event_ts: event.event_time,
            overall_score: Some(event.overall_score),
            coverage: Some(event.coverage),
            gaps: Some(event.gaps),
            overlaps: Some(event.overlaps),
            avg_duration: Some(event.avg_duration),
            source: Some(event.source.clone()),
            load_ts: Some(event.load_time),
        }
    }
}

// ALERTS //

/// Which check fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    ScoreAnomaly,    // z-score of the latest score
    ScoreMadAnomaly, // median absolute deviation of the latest score
    CoverageLow,
    GapsHigh,
    OverlapsHigh,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::ScoreAnomaly => "score_anomaly",
            AlertKind::ScoreMadAnomaly => "score_mad_anomaly",
            AlertKind::CoverageLow => "coverage_low",
            AlertKind::GapsHigh => "gaps_high",
            AlertKind::OverlapsHigh => "overlaps_high",
        }
    }

    /// Statistical checks, as opposed to fixed rule thresholds
    pub fn is_statistical(&self) -> bool {
        matches!(self, AlertKind::ScoreAnomaly | AlertKind::ScoreMadAnomaly)
    }
}

/// One triggered check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertItem {
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub message: String,
}

/// Summary of the window an alert was raised for.
/// `mean` and `stdev` are over the window's overall scores (sample stdev).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSummary {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub count: usize,
    pub mean: f64,
    pub stdev: f64,
}

/// Alert for one closed window, carrying a snapshot of the latest event's metrics.
/// This is also the outbound wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyAlert {
    pub team_id: String,
    pub report_id: String,
    pub event_ts: DateTime<Utc>,

    #[serde(rename = "overallScore")]
    pub overall_score: f64,
    pub coverage: f64,
    pub gaps: u32,
    pub overlaps: u32,

    pub window: WindowSummary,
    pub alerts: Vec<AlertItem>,
}

impl AnomalyAlert {
    /// Alert types in emission order
    pub fn kinds(&self) -> Vec<AlertKind> {
        self.alerts.iter().map(|a| a.kind).collect()
    }
}
