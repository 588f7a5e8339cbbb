//! Qualwatch windowed deduplication, anomaly detection & alerting

pub mod config;
pub mod dedup;
pub mod window;
pub mod stats;
pub mod detection;
pub mod publisher;
pub mod pipeline;
pub mod alerting;
pub mod slack;
pub mod runner;

pub use config::{QualwatchConfig, load_config};
pub use dedup::{DedupVerdict, Deduplicator};
pub use window::{ClosedWindow, WindowAssigner};
pub use detection::AnomalyDetector;
pub use publisher::{AlertPublisher, AlertSink, NatsAlertSink};
pub use pipeline::{Admission, Pipeline};
pub use alerting::AlertEngine;
pub use slack::SlackClient;
pub use runner::{AnomalyRunner, InboundMessage, NotificationRunner};
