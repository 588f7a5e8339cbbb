//! Idempotency filter - suppresses re-delivered events by `insert_id`
//!
//! Keys are remembered for a fixed TTL from first sight. Expiry runs off a
//! queue ordered by first-seen time, so each call only touches expired keys.
//! The cache is per partition and best effort: restarts and other partitions
//! do not share it, the persisted sink's key closes that gap.

use crate::config::DedupConfig;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupVerdict {
    Pass,
    Duplicate,
}

pub struct Deduplicator {
    ttl: Duration,
    max_keys: usize,
    // insert_id -> first seen
    seen: HashMap<String, DateTime<Utc>>,
    // (first seen, insert_id) in insertion order
    expiry: VecDeque<(DateTime<Utc>, String)>,
}

impl Deduplicator {
    pub fn new(config: &DedupConfig) -> Self {
        Self {
            ttl: Duration::seconds(config.ttl_seconds as i64),
            max_keys: config.max_keys,
            seen: HashMap::new(),
            expiry: VecDeque::new(),
        }
    }

    /// Record `insert_id` and report whether it was already seen within the TTL
    pub fn check(&mut self, insert_id: &str, now: DateTime<Utc>) -> DedupVerdict {
        self.evict_expired(now);

        if let Some(first_seen) = self.seen.get(insert_id) {
            if !self.is_expired(*first_seen, now) {
                return DedupVerdict::Duplicate;
            }
        }

        while self.seen.len() >= self.max_keys {
            if !self.evict_oldest() {
                break;
            }
        }

        self.seen.insert(insert_id.to_string(), now);
        self.expiry.push_back((now, insert_id.to_string()));
        DedupVerdict::Pass
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn is_expired(&self, first_seen: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - first_seen > self.ttl
    }

    fn evict_expired(&mut self, now: DateTime<Utc>) {
        while let Some((first_seen, _)) = self.expiry.front() {
            if !self.is_expired(*first_seen, now) {
                break;
            }
            self.evict_oldest();
        }
    }

    // pop the queue head; the map entry goes only if it still belongs to that queue slot
    fn evict_oldest(&mut self) -> bool {
        let Some((first_seen, key)) = self.expiry.pop_front() else {
            return false;
        };
        if self.seen.get(&key) == Some(&first_seen) {
            self.seen.remove(&key);
            debug!(insert_id = %key, "Dedup key evicted");
        }
        true
    }
}
