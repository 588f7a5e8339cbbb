//! Export document converter for the batch (backfill) path
//!
//! Documents are named like
//! `projects/P/databases/(default)/documents/teams/T/reports/R/qualityReports/TS`
//! and carry typed field wrappers (`integerValue`, `doubleValue`, ...).
//! Each document becomes an inbound payload and goes through the same
//! `Normalizer` as the streaming path.

use crate::normalize::{DropReason, Normalizer};
use crate::QualityEvent;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

pub const BACKFILL_SOURCE: &str = "backfill";

const METRIC_FIELDS: [&str; 5] = ["overallScore", "coverage", "gaps", "overlaps", "avgDur"];

/// Path segments identifying one quality report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPath {
    pub team_id: String,
    pub report_id: String,
    pub timestamp: String,
}

impl DocumentPath {
    /// Pull team/report/timestamp out of a document name
    pub fn parse(name: &str) -> Option<Self> {
        let parts: Vec<&str> = name.split('/').collect();
        let after = |marker: &str| {
            parts
                .iter()
                .position(|p| *p == marker)
                .and_then(|i| parts.get(i + 1))
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
        };

        Some(Self {
            team_id: after("teams")?,
            report_id: after("reports")?,
            timestamp: after("qualityReports")?,
        })
    }

    /// Deterministic idempotency key shared with any re-run of the same export
    pub fn insert_id(&self) -> String {
        format!("{}-{}-{}", self.team_id, self.report_id, self.timestamp)
    }
}

/// Outcome for one document in an export
#[derive(Debug)]
pub enum DocumentOutcome {
    Event(QualityEvent),
    Skipped { name: String },              // path does not name a quality report
    Dropped { name: String, reason: DropReason },
}

/// Convert the documents of one export file.
/// Accepts `{"documents": [...]}`, a bare array, or a single document.
pub fn convert_export(
    content: &str,
    normalizer: &Normalizer,
    now: DateTime<Utc>,
) -> Result<Vec<DocumentOutcome>, serde_json::Error> {
    let data: Value = serde_json::from_str(content)?;

    let docs: Vec<&Value> = match &data {
        Value::Object(obj) if obj.contains_key("documents") => obj
            .get("documents")
            .and_then(Value::as_array)
            .map(|a| a.iter().collect())
            .unwrap_or_default(),
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };

    Ok(docs
        .into_iter()
        .map(|doc| convert_document(doc, normalizer, now))
        .collect())
}

pub fn convert_document(doc: &Value, normalizer: &Normalizer, now: DateTime<Utc>) -> DocumentOutcome {
    let name = doc
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let Some(path) = DocumentPath::parse(&name) else {
        return DocumentOutcome::Skipped { name };
    };

    let payload = to_inbound_payload(doc, &path, now);
    match normalizer.normalize_value(&payload, &HashMap::new(), now) {
        Ok(event) => DocumentOutcome::Event(event),
        Err(reason) => DocumentOutcome::Dropped { name, reason },
    }
}

// build the same shape the streaming feed delivers
fn to_inbound_payload(doc: &Value, path: &DocumentPath, now: DateTime<Utc>) -> Value {
    let empty = Map::new();
    let fields = doc
        .get("fields")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let metrics = fields
        .get("metrics")
        .and_then(|m| m.get("mapValue"))
        .and_then(|m| m.get("fields"))
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let event_ts = fields
        .get("createdAt")
        .and_then(extract_timestamp)
        .or_else(|| doc.get("updateTime").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| now.to_rfc3339_opts(SecondsFormat::Micros, true));

    let mut payload = json!({
        "insert_id": path.insert_id(),
        "team_id": path.team_id,
        "report_id": path.report_id,
        "event_ts": event_ts,
        "source": BACKFILL_SOURCE,
    });

    if let Some(obj) = payload.as_object_mut() {
        for field in METRIC_FIELDS {
            if let Some(v) = metrics.get(field).and_then(extract_value) {
                obj.insert(field.to_string(), v);
            }
        }
    }
    payload
}

/// Unwrap a typed export value
fn extract_value(field: &Value) -> Option<Value> {
    let obj = field.as_object()?;
    ["integerValue", "doubleValue", "stringValue", "booleanValue", "timestampValue"]
        .iter()
        .find_map(|key| obj.get(*key).cloned())
}

fn extract_timestamp(field: &Value) -> Option<String> {
    field
        .get("timestampValue")
        .or_else(|| field.get("stringValue"))
        .and_then(Value::as_str)
        .map(str::to_string)
}
