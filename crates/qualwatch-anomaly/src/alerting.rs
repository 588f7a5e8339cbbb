//! Alert engine with cooldown-based deduplication for notifications

use chrono::{DateTime, Duration, Utc};
use qualwatch_core::{AlertKind, AnomalyAlert};
use std::collections::HashMap;

// unique key to identify a notification (team + window + what fired)
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct AlertKey {
    pub team_id: String,
    pub window_end: DateTime<Utc>,
    pub kinds: Vec<AlertKind>,
}

impl AlertKey {
    pub fn from_alert(alert: &AnomalyAlert) -> Self {
        Self {
            team_id: alert.team_id.clone(),
            window_end: alert.window.end,
            kinds: alert.kinds(),
        }
    }
}

// Main alert engine - remembers what was recently notified
pub struct AlertEngine {
    cooldown: Duration,

    // key -> last notification time
    last_notified: HashMap<AlertKey, DateTime<Utc>>,
}

impl AlertEngine {
    pub fn new(cooldown_minutes: u64) -> Self {
        Self {
            cooldown: Duration::minutes(cooldown_minutes as i64),
            last_notified: HashMap::new(),
        }
    }

    // filter incoming alerts down to the ones that should be sent
    pub fn process_alerts(
        &mut self,
        alerts: Vec<AnomalyAlert>,
        now: DateTime<Utc>,
    ) -> Vec<AnomalyAlert> {
        alerts
            .into_iter()
            .filter(|alert| self.should_notify(alert, now))
            .collect()
    }

    // check cooldown and record the notification if it goes out
    pub fn should_notify(&mut self, alert: &AnomalyAlert, now: DateTime<Utc>) -> bool {
        let cooldown = self.cooldown;
        self.last_notified.retain(|_, sent_at| now - *sent_at < cooldown);

        let key = AlertKey::from_alert(alert);
        if self.last_notified.contains_key(&key) {
            return false;
        }
        self.last_notified.insert(key, now);
        true
    }

    pub fn tracked(&self) -> usize {
        self.last_notified.len()
    }
}
