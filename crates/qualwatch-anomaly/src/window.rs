//! Sliding window assignment and per-team window buffers
//!
//! Windows have size `S` and start every `P` (aligned to the unix epoch), so an
//! event lands in `S / P` overlapping windows. Each `(team_id, start)` window
//! goes through open -> accumulate -> close -> detect -> discard: it is created
//! by the first event that falls in it, buffers events in event-time order, and
//! is handed out exactly once when processing time passes `end + lateness`.
//! Closed windows are never re-opened; events that only fit closed windows are late.

use crate::config::WindowConfig;
use chrono::{DateTime, Utc};
use qualwatch_core::QualityEvent;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Window geometry in milliseconds since the epoch
#[derive(Debug, Clone, Copy)]
pub struct WindowSpec {
    size_ms: i64,
    period_ms: i64,
    lateness_ms: i64,
    future_skew_ms: i64,
}

impl WindowSpec {
    // `config` must have passed `QualwatchConfig::validate` (non-zero period)
    pub(crate) fn new(config: &WindowConfig) -> Self {
        Self {
            size_ms: config.size_seconds as i64 * 1000,
            period_ms: config.period_seconds as i64 * 1000,
            lateness_ms: config.allowed_lateness_seconds as i64 * 1000,
            future_skew_ms: config.max_future_skew_seconds as i64 * 1000,
        }
    }

    /// Start times (ms) of every window containing `t`, newest first
    pub fn starts_for(&self, t: DateTime<Utc>) -> Vec<i64> {
        let t_ms = t.timestamp_millis();
        let last = t_ms.div_euclid(self.period_ms) * self.period_ms;

        let mut starts = Vec::with_capacity((self.size_ms / self.period_ms) as usize);
        let mut start = last;
        while start > t_ms - self.size_ms {
            starts.push(start);
            start -= self.period_ms;
        }
        starts
    }

    pub fn end_of(&self, start_ms: i64) -> i64 {
        start_ms + self.size_ms
    }

    /// A window is closed once `now` is strictly past its end plus lateness
    pub fn is_closed(&self, start_ms: i64, now: DateTime<Utc>) -> bool {
        now.timestamp_millis() > self.end_of(start_ms) + self.lateness_ms
    }

    /// Too far ahead of processing time to be trusted with a window
    pub fn is_too_early(&self, t: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        t.timestamp_millis() > now.timestamp_millis().saturating_add(self.future_skew_ms)
    }
}

/// Events of one open window, kept sorted by event time
#[derive(Debug)]
struct WindowBuffer {
    events: Vec<Arc<QualityEvent>>,
}

impl WindowBuffer {
    fn new() -> Self {
        Self { events: Vec::new() }
    }

    // equal event times keep arrival order
    fn insert(&mut self, event: Arc<QualityEvent>) {
        let pos = self
            .events
            .partition_point(|e| e.event_time <= event.event_time);
        self.events.insert(pos, event);
    }
}

/// A window handed to the detector
#[derive(Debug, Clone)]
pub struct ClosedWindow {
    pub team_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub events: Vec<Arc<QualityEvent>>, // ascending event time
}

impl ClosedWindow {
    /// The event with the greatest event time
    pub fn latest(&self) -> Option<&QualityEvent> {
        self.events.last().map(|e| e.as_ref())
    }

    pub fn scores(&self) -> Vec<f64> {
        self.events.iter().map(|e| e.overall_score).collect()
    }
}

/// Result of assigning one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    // `late` counts windows skipped because they had already closed
    Assigned { windows: usize, late: usize },
    // every window for this event had closed
    Late,
    // event time is past `now + max_future_skew`; no window is opened
    TooEarly,
}

/// Open windows for every team of one partition
pub struct WindowAssigner {
    spec: WindowSpec,
    // team_id -> window start (ms) -> buffer
    teams: HashMap<String, BTreeMap<i64, WindowBuffer>>,
}

impl WindowAssigner {
    pub(crate) fn new(config: &WindowConfig) -> Self {
        Self {
            spec: WindowSpec::new(config),
            teams: HashMap::new(),
        }
    }

    /// Add the event to every still-open window that contains it
    pub fn assign(&mut self, event: Arc<QualityEvent>, now: DateTime<Utc>) -> Assignment {
        if self.spec.is_too_early(event.event_time, now) {
            return Assignment::TooEarly;
        }

        let starts = self.spec.starts_for(event.event_time);
        let (open, closed): (Vec<i64>, Vec<i64>) = starts
            .into_iter()
            .partition(|start| !self.spec.is_closed(*start, now));

        if open.is_empty() {
            return Assignment::Late;
        }

        let windows = self.teams.entry(event.team_id.clone()).or_default();
        for start in &open {
            windows
                .entry(*start)
                .or_insert_with(WindowBuffer::new)
                .insert(Arc::clone(&event));
        }

        Assignment::Assigned {
            windows: open.len(),
            late: closed.len(),
        }
    }

    /// Remove and return every window whose close time has passed
    pub fn close_due(&mut self, now: DateTime<Utc>) -> Vec<ClosedWindow> {
        let spec = self.spec;
        let mut closed = Vec::new();

        for (team_id, windows) in self.teams.iter_mut() {
            // starts are ordered, so due windows form a prefix
            let due: Vec<i64> = windows
                .keys()
                .take_while(|start| spec.is_closed(**start, now))
                .copied()
                .collect();

            for start in due {
                if let Some(buffer) = windows.remove(&start) {
                    closed.push(Self::to_closed(&spec, team_id, start, buffer));
                }
            }
        }

        self.teams.retain(|_, windows| !windows.is_empty());
        closed
    }

    /// Close everything regardless of time (used at end of input)
    pub fn drain(&mut self) -> Vec<ClosedWindow> {
        let spec = self.spec;
        self.teams
            .drain()
            .flat_map(|(team_id, windows)| {
                windows
                    .into_iter()
                    .map(move |(start, buffer)| Self::to_closed(&spec, &team_id, start, buffer))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    pub fn open_windows(&self) -> usize {
        self.teams.values().map(|w| w.len()).sum()
    }

    pub fn teams(&self) -> usize {
        self.teams.len()
    }

    fn to_closed(spec: &WindowSpec, team_id: &str, start: i64, buffer: WindowBuffer) -> ClosedWindow {
        ClosedWindow {
            team_id: team_id.to_string(),
            start: ms_to_datetime(start),
            end: ms_to_datetime(spec.end_of(start)),
            events: buffer.events,
        }
    }
}

// window bounds derive from valid event times, so they are always representable
fn ms_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn config(size: u64, period: u64, lateness: u64) -> WindowConfig {
        WindowConfig {
            size_seconds: size,
            period_seconds: period,
            allowed_lateness_seconds: lateness,
            close_check_interval_seconds: 5,
            max_future_skew_seconds: 21_600,
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn event(id: &str, team: &str, secs: i64, score: f64) -> Arc<QualityEvent> {
        Arc::new(QualityEvent {
            insert_id: id.to_string(),
            team_id: team.to_string(),
            report_id: format!("r-{}", id),
            event_time: at(secs),
            overall_score: score,
            coverage: 0.95,
            gaps: 0,
            overlaps: 0,
            avg_duration: 1.0,
            source: "stream".to_string(),
            load_time: at(secs),
        })
    }

    #[test]
    fn test_window_starts_default_geometry() {
        let spec = WindowSpec::new(&config(900, 300, 0));

        // t = 650s belongs to windows starting at 600, 300 and 0, not 900
        let starts = spec.starts_for(at(650));
        assert_eq!(starts, vec![600_000, 300_000, 0]);
        assert!(!starts.contains(&900_000));

        // a boundary belongs to the window it starts, not the one it ends
        assert_eq!(spec.starts_for(at(900)), vec![900_000, 600_000, 300_000]);
    }

    #[test]
    fn test_window_starts_fan_out() {
        let spec = WindowSpec::new(&config(600, 60, 0));
        let t = Utc.with_ymd_and_hms(2025, 3, 1, 12, 34, 56).unwrap();
        let starts = spec.starts_for(t);
        assert_eq!(starts.len(), 10);
        for start in starts {
            assert!(start <= t.timestamp_millis());
            assert!(t.timestamp_millis() < spec.end_of(start));
            assert_eq!(start % 60_000, 0);
        }

        // tumbling when size == period
        let tumbling = WindowSpec::new(&config(300, 300, 0));
        assert_eq!(tumbling.starts_for(at(650)), vec![600_000]);
    }

    #[test]
    fn test_window_starts_before_epoch() {
        let spec = WindowSpec::new(&config(900, 300, 0));
        assert_eq!(spec.starts_for(at(-10)), vec![-300_000, -600_000, -900_000]);
    }

    #[test]
    fn test_events_sorted_within_window() {
        let mut assigner = WindowAssigner::new(&config(900, 300, 0));
        let now = at(0);

        assigner.assign(event("c", "t", 650, 0.3), now);
        assigner.assign(event("a", "t", 610, 0.1), now);
        assigner.assign(event("b", "t", 620, 0.2), now);
        assigner.assign(event("d", "t", 650, 0.4), now);

        let closed = assigner.drain();
        assert_eq!(closed.len(), 3);
        for window in &closed {
            let ids: Vec<&str> = window.events.iter().map(|e| e.insert_id.as_str()).collect();
            assert_eq!(ids, vec!["a", "b", "c", "d"]);
            assert_eq!(window.latest().unwrap().insert_id, "d");
        }
    }

    #[test]
    fn test_close_due_exactly_once() {
        let mut assigner = WindowAssigner::new(&config(900, 300, 0));
        let now = at(700);
        assert_eq!(
            assigner.assign(event("a", "t", 650, 0.5), now),
            Assignment::Assigned { windows: 3, late: 0 }
        );
        assert_eq!(assigner.open_windows(), 3);

        // window [0, 900) closes only after 900
        assert!(assigner.close_due(at(900)).is_empty());
        let closed = assigner.close_due(at(901));
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].start, at(0));
        assert_eq!(closed[0].end, at(900));

        // closing again is a no-op
        assert!(assigner.close_due(at(901)).is_empty());
        assert_eq!(assigner.open_windows(), 2);

        let closed = assigner.close_due(at(1600));
        assert_eq!(closed.len(), 2);
        assert_eq!(assigner.open_windows(), 0);
        assert_eq!(assigner.teams(), 0);
    }

    #[test]
    fn test_late_event_skips_closed_windows() {
        let mut assigner = WindowAssigner::new(&config(900, 300, 0));
        assigner.assign(event("a", "t", 650, 0.5), at(700));
        assert_eq!(assigner.close_due(at(901)).len(), 1);

        // same window again: [0, 900) is closed, the other two still accept
        assert_eq!(
            assigner.assign(event("b", "t", 660, 0.5), at(950)),
            Assignment::Assigned { windows: 2, late: 1 }
        );
        assert!(assigner.close_due(at(950)).is_empty());

        // everything for t=100 has closed
        assert_eq!(assigner.assign(event("c", "t", 100, 0.5), at(950)), Assignment::Late);
    }

    #[test]
    fn test_allowed_lateness_keeps_window_open() {
        let mut assigner = WindowAssigner::new(&config(900, 300, 60));
        assigner.assign(event("a", "t", 650, 0.5), at(700));

        assert!(assigner.close_due(at(950)).is_empty());
        assert_eq!(
            assigner.assign(event("b", "t", 890, 0.5), at(955)),
            Assignment::Assigned { windows: 3, late: 0 }
        );

        let closed = assigner.close_due(at(961));
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].events.len(), 2);
    }

    #[test]
    fn test_teams_are_isolated() {
        let mut assigner = WindowAssigner::new(&config(900, 300, 0));
        let now = at(0);
        assigner.assign(event("a", "team-a", 650, 0.5), now);
        assigner.assign(event("b", "team-b", 650, 0.5), now);
        assigner.assign(event("c", "team-b", 660, 0.5), now);

        assert_eq!(assigner.teams(), 2);
        let closed = assigner.drain();
        assert_eq!(closed.len(), 6);
        for window in closed {
            let expected = if window.team_id == "team-a" { 1 } else { 2 };
            assert_eq!(window.events.len(), expected);
            assert!(window.events.iter().all(|e| e.team_id == window.team_id));
        }
    }

    #[test]
    fn test_far_future_events_open_no_windows() {
        let mut assigner = WindowAssigner::new(&config(900, 300, 0));
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let far = Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap().timestamp();

        for i in 0..1000 {
            let id = format!("f-{}", i);
            let team = format!("team-{}", i % 10);
            assert_eq!(
                assigner.assign(event(&id, &team, far + i, 0.5), now),
                Assignment::TooEarly
            );
        }
        assert_eq!(assigner.open_windows(), 0);
        assert_eq!(assigner.teams(), 0);

        // the bound is inclusive
        let edge = now.timestamp() + 21_600;
        assert_eq!(
            assigner.assign(event("edge", "t", edge, 0.5), now),
            Assignment::Assigned { windows: 3, late: 0 }
        );
        assert_eq!(
            assigner.assign(event("over", "t", edge + 1, 0.5), now),
            Assignment::TooEarly
        );
    }
}
