//! Statistical and rule-based anomaly detection over closed windows

use crate::config::DetectionConfig;
use crate::stats;
use crate::window::ClosedWindow;
use qualwatch_core::{AlertItem, AlertKind, AnomalyAlert, QualityEvent, WindowSummary};

// fewer events than this and the window is not evaluated at all
pub const MIN_WINDOW_EVENTS: usize = 3;

// the MAD check needs a larger sample to mean anything
pub const MIN_MAD_EVENTS: usize = 5;

// main anomaly detector
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    config: DetectionConfig,
}

impl AnomalyDetector {
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    /// Evaluate one closed window. Yields at most one alert, carrying every
    /// check that fired; windows with nothing to report yield nothing.
    pub fn detect(&self, window: &ClosedWindow) -> Option<AnomalyAlert> {
        if window.events.len() < MIN_WINDOW_EVENTS {
            return None;
        }
        let latest = window.latest()?;
        let scores = window.scores();

        let alerts = self.evaluate(&scores, latest);
        if alerts.is_empty() {
            return None;
        }

        Some(AnomalyAlert {
            team_id: window.team_id.clone(),
            report_id: latest.report_id.clone(),
            event_ts: latest.event_time,
            overall_score: latest.overall_score,
            coverage: latest.coverage,
            gaps: latest.gaps,
            overlaps: latest.overlaps,
            window: WindowSummary {
                start: window.start,
                end: window.end,
                count: window.events.len(),
                mean: stats::mean(&scores).unwrap_or(0.0),
                stdev: stats::sample_stdev(&scores).unwrap_or(0.0),
            },
            alerts,
        })
    }

    /// Run every check against the latest event; each fires independently
    pub fn evaluate(&self, scores: &[f64], latest: &QualityEvent) -> Vec<AlertItem> {
        let mut alerts = Vec::new();
        alerts.extend(self.check_zscore(scores, latest.overall_score));
        alerts.extend(self.check_mad(scores, latest.overall_score));
        alerts.extend(self.check_rules(latest));
        alerts
    }

    /// Z-score of the latest score against the window mean
    fn check_zscore(&self, scores: &[f64], latest_score: f64) -> Option<AlertItem> {
        if scores.len() < MIN_WINDOW_EVENTS {
            return None;
        }
        let mean = stats::mean(scores)?;
        let stdev = stats::sample_stdev(scores)?;
        let z = stats::deviation_score(latest_score, mean, stdev)?;

        (z > self.config.z_threshold).then(|| AlertItem {
            kind: AlertKind::ScoreAnomaly,
            message: format!(
                "Score Z-score {:.2} > {:?} (mean={:.2}, latest={:.2})",
                z, self.config.z_threshold, mean, latest_score
            ),
        })
    }

    /// Robust variant: distance from the median in MADs
    fn check_mad(&self, scores: &[f64], latest_score: f64) -> Option<AlertItem> {
        if scores.len() < MIN_MAD_EVENTS {
            return None;
        }
        let (median, mad) = stats::median_absolute_deviation(scores)?;
        let score = stats::deviation_score(latest_score, median, mad)?;

        (score > self.config.z_threshold).then(|| AlertItem {
            kind: AlertKind::ScoreMadAnomaly,
            message: format!(
                "Score MAD-score {:.2} > {:?} (median={:.2}, latest={:.2})",
                score, self.config.z_threshold, median, latest_score
            ),
        })
    }

    // fixed thresholds on the latest event
    fn check_rules(&self, latest: &QualityEvent) -> Vec<AlertItem> {
        let mut alerts = Vec::new();

        if latest.coverage < self.config.cov_min {
            alerts.push(AlertItem {
                kind: AlertKind::CoverageLow,
                message: format!(
                    "coverage {:.1}% < {:.0}%",
                    latest.coverage * 100.0,
                    self.config.cov_min * 100.0
                ),
            });
        }

        if latest.gaps > self.config.gaps_max {
            alerts.push(AlertItem {
                kind: AlertKind::GapsHigh,
                message: format!("gaps {} > {}", latest.gaps, self.config.gaps_max),
            });
        }

        if latest.overlaps > self.config.overlaps_max {
            alerts.push(AlertItem {
                kind: AlertKind::OverlapsHigh,
                message: format!("overlaps {} > {}", latest.overlaps, self.config.overlaps_max),
            });
        }

        alerts
    }
}
