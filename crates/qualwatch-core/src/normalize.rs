//! Event normalizer - raw inbound message -> validated QualityEvent
//!
//! Validation runs in a fixed order: decode, required fields, type coercion,
//! value ranges. The first failure decides the `DropReason`.

use crate::QualityEvent;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

pub const REQUIRED_FIELDS: [&str; 4] = ["insert_id", "team_id", "report_id", "event_ts"];

const DEFAULT_SOURCE: &str = "stream";

/// Why a message did not become an event
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DropReason {
    #[error("payload is not valid JSON: {0}")]
    Undecodable(String),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("field {field} has invalid value: {detail}")]
    InvalidField { field: &'static str, detail: String },

    #[error("field {field} out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },
}

impl DropReason {
    /// Coarse category used as a log/metric label
    pub fn category(&self) -> &'static str {
        match self {
            DropReason::OutOfRange { .. } => "out_of_range",
            _ => "malformed",
        }
    }
}

/// Turns inbound payloads into `QualityEvent`s.
#[derive(Debug, Clone)]
pub struct Normalizer {
    default_source: String,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(DEFAULT_SOURCE)
    }
}

impl Normalizer {
    pub fn new(default_source: impl Into<String>) -> Self {
        Self {
            default_source: default_source.into(),
        }
    }

    /// Normalize one message, stamping the load time with the current clock
    pub fn normalize(
        &self,
        payload: &[u8],
        attributes: &HashMap<String, String>,
    ) -> Result<QualityEvent, DropReason> {
        self.normalize_at(payload, attributes, Utc::now())
    }

    pub fn normalize_at(
        &self,
        payload: &[u8],
        attributes: &HashMap<String, String>,
        now: DateTime<Utc>,
    ) -> Result<QualityEvent, DropReason> {
        // (a) decode
        let value: Value = serde_json::from_slice(payload)
            .map_err(|e| DropReason::Undecodable(e.to_string()))?;
        self.normalize_value(&value, attributes, now)
    }

    /// Normalize an already decoded payload. The batch path enters here.
    pub fn normalize_value(
        &self,
        value: &Value,
        attributes: &HashMap<String, String>,
        now: DateTime<Utc>,
    ) -> Result<QualityEvent, DropReason> {
        let obj = value.as_object().ok_or(DropReason::NotAnObject)?;

        // (b) required fields
        for field in REQUIRED_FIELDS {
            if present(obj, field).is_none() {
                return Err(DropReason::MissingField(field));
            }
        }

        // (c) coercion
        let insert_id = required_string(obj, "insert_id")?;
        let team_id = required_string(obj, "team_id")?;
        let report_id = required_string(obj, "report_id")?;
        let event_time = required_timestamp(obj, "event_ts")?;
        let overall_score = optional_f64(obj, "overallScore")?;
        let coverage = optional_f64(obj, "coverage")?;
        let gaps = optional_i64(obj, "gaps")?;
        let overlaps = optional_i64(obj, "overlaps")?;
        let avg_duration = optional_f64(obj, "avgDur")?;
        let source = match present(obj, "source") {
            Some(v) => coerce_string(v).ok_or_else(|| invalid("source", v))?,
            None => attributes
                .get("source")
                .cloned()
                .unwrap_or_else(|| self.default_source.clone()),
        };

        // (d) ranges
        check_unit_interval("overallScore", overall_score)?;
        check_unit_interval("coverage", coverage)?;
        let gaps = check_count("gaps", gaps)?;
        let overlaps = check_count("overlaps", overlaps)?;
        if avg_duration < 0.0 {
            return Err(DropReason::OutOfRange {
                field: "avgDur",
                value: avg_duration,
            });
        }

        Ok(QualityEvent {
            insert_id,
            team_id,
            report_id,
            event_time,
            overall_score,
            coverage,
            gaps,
            overlaps,
            avg_duration,
            source,
            load_time: now,
        })
    }
}

// null counts as absent
fn present<'a>(obj: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    obj.get(field).filter(|v| !v.is_null())
}

fn invalid(field: &'static str, value: &Value) -> DropReason {
    DropReason::InvalidField {
        field,
        detail: value.to_string(),
    }
}

fn coerce_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn required_string(obj: &Map<String, Value>, field: &'static str) -> Result<String, DropReason> {
    let value = present(obj, field).ok_or(DropReason::MissingField(field))?;
    let s = coerce_string(value).ok_or_else(|| invalid(field, value))?;
    if s.trim().is_empty() {
        return Err(DropReason::MissingField(field));
    }
    Ok(s)
}

fn required_timestamp(
    obj: &Map<String, Value>,
    field: &'static str,
) -> Result<DateTime<Utc>, DropReason> {
    let value = present(obj, field).ok_or(DropReason::MissingField(field))?;
    value
        .as_str()
        .and_then(parse_timestamp)
        .ok_or_else(|| invalid(field, value))
}

/// ISO-8601 with offset, or a naive timestamp taken as UTC
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
}

// missing metrics default to zero
fn optional_f64(obj: &Map<String, Value>, field: &'static str) -> Result<f64, DropReason> {
    let Some(value) = present(obj, field) else {
        return Ok(0.0);
    };
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(invalid(field, value)),
    }
}

fn optional_i64(obj: &Map<String, Value>, field: &'static str) -> Result<i64, DropReason> {
    let Some(value) = present(obj, field) else {
        return Ok(0);
    };
    let parsed = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(integral)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))
        }
        _ => None,
    };
    parsed.ok_or_else(|| invalid(field, value))
}

// counts may arrive as 3.0 but never as 2.9
fn integral(f: f64) -> Option<i64> {
    (f.is_finite() && f.fract() == 0.0).then_some(f as i64)
}

fn check_unit_interval(field: &'static str, value: f64) -> Result<(), DropReason> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(DropReason::OutOfRange { field, value })
    }
}

fn check_count(field: &'static str, value: i64) -> Result<u32, DropReason> {
    u32::try_from(value).map_err(|_| DropReason::OutOfRange {
        field,
        value: value as f64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_variants() {
        assert!(parse_timestamp("2025-03-01T12:00:00Z").is_some());
        assert!(parse_timestamp("2025-03-01T21:00:00+09:00").is_some());
        assert!(parse_timestamp("2025-03-01T12:00:00.123456").is_some());
        assert!(parse_timestamp("2025-03-01 12:00:00").is_some());
        assert!(parse_timestamp("yesterday").is_none());

        let offset = parse_timestamp("2025-03-01T21:00:00+09:00").unwrap();
        let utc = parse_timestamp("2025-03-01T12:00:00Z").unwrap();
        assert_eq!(offset, utc);
    }

    #[test]
    fn test_drop_reason_category() {
        assert_eq!(DropReason::MissingField("team_id").category(), "malformed");
        assert_eq!(
            DropReason::OutOfRange { field: "coverage", value: 1.2 }.category(),
            "out_of_range"
        );
    }
}
