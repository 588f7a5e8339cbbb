//! One partition's processing state: dedup -> windows -> detection
//!
//! A `Pipeline` is owned by exactly one task and is never shared, so the
//! teams routed to it need no locking.

use crate::config::{ConfigError, QualwatchConfig};
use crate::dedup::{DedupVerdict, Deduplicator};
use crate::detection::AnomalyDetector;
use crate::window::{Assignment, ClosedWindow, WindowAssigner};
use chrono::{DateTime, Utc};
use qualwatch_core::{AnomalyAlert, QualityEvent};
use std::sync::Arc;
use tracing::debug;

/// What happened to one admitted event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted { windows: usize },
    Duplicate,
    Late,
    TooEarly,
}

/// Counters for one partition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub accepted: u64,
    pub duplicates: u64,
    pub late_events: u64,  // every window already closed
    pub late_windows: u64, // individual window assignments skipped
    pub too_early: u64,    // dated past the future skew bound
    pub windows_closed: u64,
    pub alerts: u64,
}

impl PipelineStats {
    pub fn merge(&mut self, other: &PipelineStats) {
        self.accepted += other.accepted;
        self.duplicates += other.duplicates;
        self.late_events += other.late_events;
        self.late_windows += other.late_windows;
        self.too_early += other.too_early;
        self.windows_closed += other.windows_closed;
        self.alerts += other.alerts;
    }
}

pub struct Pipeline {
    dedup: Deduplicator,
    windows: WindowAssigner,
    detector: AnomalyDetector,
    stats: PipelineStats,
}

impl Pipeline {
    /// Fails on a config whose window geometry or limits are unusable
    pub fn new(config: &QualwatchConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            dedup: Deduplicator::new(&config.dedup),
            windows: WindowAssigner::new(&config.window),
            detector: AnomalyDetector::new(config.detection.clone()),
            stats: PipelineStats::default(),
        })
    }

    /// Deduplicate and window one event
    pub fn admit(&mut self, event: QualityEvent, now: DateTime<Utc>) -> Admission {
        if self.dedup.check(&event.insert_id, now) == DedupVerdict::Duplicate {
            debug!(insert_id = %event.insert_id, team_id = %event.team_id, "Duplicate event suppressed");
            self.stats.duplicates += 1;
            return Admission::Duplicate;
        }

        let event = Arc::new(event);
        match self.windows.assign(Arc::clone(&event), now) {
            Assignment::Assigned { windows, late } => {
                self.stats.accepted += 1;
                self.stats.late_windows += late as u64;
                Admission::Accepted { windows }
            }
            Assignment::Late => {
                debug!(
                    insert_id = %event.insert_id,
                    team_id = %event.team_id,
                    event_ts = %event.event_time,
                    "Late event dropped, all windows closed"
                );
                self.stats.late_events += 1;
                Admission::Late
            }
            Assignment::TooEarly => {
                debug!(
                    insert_id = %event.insert_id,
                    team_id = %event.team_id,
                    event_ts = %event.event_time,
                    "Future-dated event dropped"
                );
                self.stats.too_early += 1;
                Admission::TooEarly
            }
        }
    }

    /// Close windows whose time has passed and run detection on each
    pub fn close_due(&mut self, now: DateTime<Utc>) -> Vec<AnomalyAlert> {
        let closed = self.windows.close_due(now);
        self.detect_all(closed)
    }

    /// Close and detect every open window
    pub fn drain(&mut self) -> Vec<AnomalyAlert> {
        let closed = self.windows.drain();
        self.detect_all(closed)
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn open_windows(&self) -> usize {
        self.windows.open_windows()
    }

    // each closed window is consumed here and its buffer released
    fn detect_all(&mut self, closed: Vec<ClosedWindow>) -> Vec<AnomalyAlert> {
        self.stats.windows_closed += closed.len() as u64;

        let alerts: Vec<AnomalyAlert> = closed
            .into_iter()
            .filter_map(|window| self.detector.detect(&window))
            .collect();

        self.stats.alerts += alerts.len() as u64;
        alerts
    }
}
