// Backfill planning - export outcomes -> unique events to publish

use qualwatch_core::backfill::DocumentOutcome;
use qualwatch_core::QualityEvent;
use std::collections::HashSet;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub documents: usize,
    pub events: usize,
    pub skipped: usize,    // not a quality report path
    pub dropped: usize,    // failed normalization
    pub duplicates: usize, // insert_id already seen in this run
}

/// Keep the first event per insert_id, counting everything else
pub fn plan(outcomes: Vec<DocumentOutcome>) -> (Vec<QualityEvent>, BackfillReport) {
    let mut report = BackfillReport {
        documents: outcomes.len(),
        ..Default::default()
    };
    let mut seen = HashSet::new();
    let mut events = Vec::new();

    for outcome in outcomes {
        match outcome {
            DocumentOutcome::Event(event) => {
                if seen.insert(event.insert_id.clone()) {
                    events.push(event);
                } else {
                    report.duplicates += 1;
                }
            }
            DocumentOutcome::Skipped { .. } => report.skipped += 1,
            DocumentOutcome::Dropped { .. } => report.dropped += 1,
        }
    }

    report.events = events.len();
    (events, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use qualwatch_core::backfill::convert_export;
    use qualwatch_core::Normalizer;

    fn doc(team: &str, ts: &str, coverage: f64) -> String {
        format!(
            r#"{{"name": "projects/p/databases/(default)/documents/teams/{team}/reports/rep-1/qualityReports/{ts}",
                "fields": {{"metrics": {{"mapValue": {{"fields": {{
                    "overallScore": {{"doubleValue": 0.9}},
                    "coverage": {{"doubleValue": {coverage}}}
                }}}}}}}}}}"#
        )
    }

    #[test]
    fn test_plan_counts_every_outcome() {
        let export = format!(
            r#"{{"documents": [{}, {}, {}, {}, {{"name": "projects/p/databases/(default)/documents/teams/t1"}}]}}"#,
            doc("t1", "1735689600000", 0.95),
            doc("t1", "1735689600000", 0.95),
            doc("t2", "1735689600000", 0.91),
            doc("t2", "1735689700000", 3.0),
        );
        let outcomes = convert_export(&export, &Normalizer::default(), Utc::now()).unwrap();
        let (events, report) = plan(outcomes);

        assert_eq!(
            report,
            BackfillReport {
                documents: 5,
                events: 2,
                skipped: 1,
                dropped: 1,
                duplicates: 1,
            }
        );
        assert_eq!(events[0].insert_id, "t1-rep-1-1735689600000");
        assert_eq!(events[1].insert_id, "t2-rep-1-1735689600000");
        assert!(events.iter().all(|e| e.source == "backfill"));
    }
}
