// Quality event simulator - synthetic report quality feed for a set of teams

use chrono::Utc;
use clap::ValueEnum;
use rand::prelude::*;
use serde_json::{json, Value};
use uuid::Uuid;

// ticks of normal traffic before a scenario kicks in
pub const WARMUP_TICKS: u64 = 10;

#[derive(Clone, Copy, Debug, ValueEnum, Default, PartialEq, Eq)]
pub enum Scenario {
    #[default]
    Normal,
    /// team-0's overall score collapses after warmup
    ScoreDrop,
    /// team-0's coverage falls under the floor after warmup
    CoverageDrop,
    /// every event is sent twice
    Duplicates,
    /// some payloads are malformed or out of range
    Invalid,
}

/// One tick's worth of payloads, in send order
pub fn generate_tick(scenario: Scenario, tick: u64, teams: usize) -> Vec<Vec<u8>> {
    let mut rng = rand::rng();
    let mut out = Vec::with_capacity(teams * 2);

    for team in 0..teams {
        let affected = team == 0 && tick >= WARMUP_TICKS;
        let mut event = healthy_event(team);

        match scenario {
            Scenario::ScoreDrop if affected => {
                event["overallScore"] = json!(rng.random_range(0.15..0.35));
            }
            Scenario::CoverageDrop if affected => {
                event["coverage"] = json!(rng.random_range(0.70..0.85));
            }
            Scenario::Invalid if rng.random_ratio(1, 4) => {
                out.push(invalid_payload(&mut event));
                continue;
            }
            _ => {}
        }

        let payload = event.to_string().into_bytes();
        if scenario == Scenario::Duplicates {
            out.push(payload.clone());
        }
        out.push(payload);
    }

    out
}

fn healthy_event(team: usize) -> Value {
    let mut rng = rand::rng();
    json!({
        "insert_id": Uuid::new_v4().to_string(),
        "team_id": format!("team-{}", team),
        "report_id": format!("report-{}", rng.random_range(1..50)),
        "event_ts": Utc::now().to_rfc3339(),
        "overallScore": rng.random_range(0.88..0.95),
        "coverage": rng.random_range(0.93..0.99),
        "gaps": rng.random_range(0..4),
        "overlaps": rng.random_range(0..3),
        "avgDur": rng.random_range(1.0..3.0),
    })
}

// one of three ways a producer gets it wrong
fn invalid_payload(event: &mut Value) -> Vec<u8> {
    let mut rng = rand::rng();
    match rng.random_range(0..3) {
        0 => {
            if let Some(obj) = event.as_object_mut() {
                obj.remove("team_id");
            }
            event.to_string().into_bytes()
        }
        1 => {
            event["coverage"] = json!(1.7);
            event.to_string().into_bytes()
        }
        _ => b"{\"insert_id\": \"broken".to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qualwatch_core::Normalizer;
    use std::collections::HashMap;

    fn normalize(payload: &[u8]) -> Option<qualwatch_core::QualityEvent> {
        Normalizer::default().normalize(payload, &HashMap::new()).ok()
    }

    #[test]
    fn test_normal_tick_is_valid() {
        let batch = generate_tick(Scenario::Normal, 0, 3);
        assert_eq!(batch.len(), 3);

        let events: Vec<_> = batch.iter().filter_map(|p| normalize(p)).collect();
        assert_eq!(events.len(), 3);
        assert_eq!(events[2].team_id, "team-2");
        assert!(events.iter().all(|e| e.overall_score >= 0.88 && e.coverage >= 0.93));
    }

    #[test]
    fn test_score_drop_after_warmup() {
        let before = generate_tick(Scenario::ScoreDrop, WARMUP_TICKS - 1, 2);
        assert!(normalize(&before[0]).unwrap().overall_score >= 0.88);

        let after = generate_tick(Scenario::ScoreDrop, WARMUP_TICKS, 2);
        assert!(normalize(&after[0]).unwrap().overall_score < 0.35);
        // only team-0 degrades
        assert!(normalize(&after[1]).unwrap().overall_score >= 0.88);
    }

    #[test]
    fn test_coverage_drop_after_warmup() {
        let after = generate_tick(Scenario::CoverageDrop, WARMUP_TICKS + 3, 1);
        assert!(normalize(&after[0]).unwrap().coverage < 0.85);
    }

    #[test]
    fn test_duplicates_are_identical_pairs() {
        let batch = generate_tick(Scenario::Duplicates, 0, 4);
        assert_eq!(batch.len(), 8);
        for pair in batch.chunks(2) {
            assert_eq!(pair[0], pair[1]);
        }
    }

    #[test]
    fn test_invalid_payloads_are_rejected() {
        let mut event = healthy_event(0);
        for _ in 0..20 {
            let payload = invalid_payload(&mut event.clone());
            assert!(normalize(&payload).is_none());
        }
        assert!(normalize(&invalid_payload(&mut event)).is_none());
    }
}
