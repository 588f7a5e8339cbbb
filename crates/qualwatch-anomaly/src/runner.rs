use crate::alerting::AlertEngine;
use crate::config::{ConfigError, QualwatchConfig};
use crate::pipeline::{Pipeline, PipelineStats};
use crate::publisher::{AlertPublisher, AlertSink};
use crate::slack::SlackClient;
use chrono::Utc;
use futures::{Stream, StreamExt};
use qualwatch_core::{AnomalyAlert, Normalizer, QualityEvent};
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

// message attributes copied from transport headers
const ATTRIBUTE_KEYS: [&str; 1] = ["source"];

/// One inbound message: payload plus optional attributes
#[derive(Debug, Clone, Default)]
pub struct InboundMessage {
    pub payload: Vec<u8>,
    pub attributes: HashMap<String, String>,
}

impl InboundMessage {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            attributes: HashMap::new(),
        }
    }
}

impl From<async_nats::Message> for InboundMessage {
    fn from(message: async_nats::Message) -> Self {
        let mut attributes = HashMap::new();
        if let Some(headers) = &message.headers {
            for key in ATTRIBUTE_KEYS {
                if let Some(value) = headers.get(key) {
                    attributes.insert(key.to_string(), value.as_str().to_string());
                }
            }
        }
        Self {
            payload: message.payload.to_vec(),
            attributes,
        }
    }
}

/// Totals for one `AnomalyRunner::run`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub received: u64,
    pub dropped: u64, // failed normalization
    pub pipeline: PipelineStats,
    pub published: u64,
    pub publish_failures: u64,
}

/// Stable team -> partition routing
pub fn partition_for(team_id: &str, partitions: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    team_id.hash(&mut hasher);
    (hasher.finish() % partitions as u64) as usize
}

// main runner that orchestrates windowed anomaly detection
pub struct AnomalyRunner {
    config: QualwatchConfig,
    normalizer: Normalizer,
}

impl AnomalyRunner {
    pub fn new(config: QualwatchConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            normalizer: Normalizer::default(),
        })
    }

    /// Consume `messages` until the stream ends, publishing alerts to `sink`.
    /// Open windows are drained when input ends.
    pub async fn run<St, S>(&self, mut messages: St, sink: S) -> RunSummary
    where
        St: Stream<Item = InboundMessage> + Unpin,
        S: AlertSink + 'static,
    {
        let capacity = self.config.runtime.channel_capacity;
        let partitions = self.config.runtime.partitions;
        let check_every = Duration::from_secs(self.config.window.close_check_interval_seconds);

        info!(
            partitions,
            window_size = self.config.window.size_seconds,
            window_period = self.config.window.period_seconds,
            "Starting anomaly detection"
        );

        let pipelines = match (0..partitions)
            .map(|_| Pipeline::new(&self.config))
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(pipelines) => pipelines,
            Err(e) => {
                error!(error = %e, "Cannot build partition pipelines");
                return RunSummary::default();
            }
        };

        // publisher
        let (alert_tx, mut alert_rx) = mpsc::channel::<AnomalyAlert>(capacity);
        let publisher = AlertPublisher::new(sink);
        let publish_task = tokio::spawn(async move {
            let (mut published, mut failed) = (0u64, 0u64);
            while let Some(alert) = alert_rx.recv().await {
                match publisher.publish(&alert).await {
                    Ok(()) => published += 1,
                    Err(_) => failed += 1,
                }
            }
            (published, failed)
        });

        // partitions
        let mut senders = Vec::with_capacity(partitions);
        let mut handles = Vec::with_capacity(partitions);
        for (id, pipeline) in pipelines.into_iter().enumerate() {
            let (tx, rx) = mpsc::channel::<QualityEvent>(capacity);
            senders.push(tx);
            handles.push(tokio::spawn(run_partition(
                id,
                pipeline,
                rx,
                alert_tx.clone(),
                check_every,
            )));
        }
        drop(alert_tx);

        // router
        let mut summary = RunSummary::default();
        while let Some(message) = messages.next().await {
            summary.received += 1;

            match self.normalizer.normalize(&message.payload, &message.attributes) {
                Ok(event) => {
                    let idx = partition_for(&event.team_id, senders.len());
                    if senders[idx].send(event).await.is_err() {
                        error!(partition = idx, "Partition task stopped, event lost");
                    }
                }
                Err(reason) => {
                    summary.dropped += 1;
                    warn!(
                        category = reason.category(),
                        reason = %reason,
                        "Dropping inbound message"
                    );
                }
            }
        }

        // closing the channels lets every partition drain
        drop(senders);
        for (id, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(stats) => summary.pipeline.merge(&stats),
                Err(e) => error!(partition = id, error = %e, "Partition task failed"),
            }
        }

        match publish_task.await {
            Ok((published, failed)) => {
                summary.published = published;
                summary.publish_failures = failed;
            }
            Err(e) => error!(error = %e, "Publisher task failed"),
        }

        info!(
            received = summary.received,
            dropped = summary.dropped,
            duplicates = summary.pipeline.duplicates,
            late = summary.pipeline.late_events,
            too_early = summary.pipeline.too_early,
            windows = summary.pipeline.windows_closed,
            alerts = summary.published,
            "Anomaly detection stopped"
        );
        summary
    }
}

async fn run_partition(
    id: usize,
    mut pipeline: Pipeline,
    mut events: mpsc::Receiver<QualityEvent>,
    alerts: mpsc::Sender<AnomalyAlert>,
    check_every: Duration,
) -> PipelineStats {
    let mut ticker = interval(check_every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            maybe = events.recv() => match maybe {
                Some(event) => {
                    pipeline.admit(event, Utc::now());
                }
                None => break,
            },
            _ = ticker.tick() => {
                let due = pipeline.close_due(Utc::now());
                forward(&alerts, due).await;
                debug!(partition = id, open_windows = pipeline.open_windows(), "Close check");
            }
        }
    }

    let remaining = pipeline.drain();
    forward(&alerts, remaining).await;

    info!(partition = id, stats = ?pipeline.stats(), "Partition drained");
    pipeline.stats().clone()
}

async fn forward(tx: &mpsc::Sender<AnomalyAlert>, alerts: Vec<AnomalyAlert>) {
    for alert in alerts {
        if tx.send(alert).await.is_err() {
            error!("Publisher stopped, alert lost");
        }
    }
}

/// Totals for one `NotificationRunner::run`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotifySummary {
    pub received: u64,
    pub undecodable: u64,
    pub suppressed: u64,
    pub sent: u64,
    pub failed: u64,
}

// consumes published alerts and notifies, muting repeats
pub struct NotificationRunner {
    alert_engine: AlertEngine,
    slack_client: SlackClient,
}

impl NotificationRunner {
    pub fn new(config: &QualwatchConfig) -> Self {
        Self {
            alert_engine: AlertEngine::new(config.notify.cooldown_minutes),
            slack_client: SlackClient::new(config.slack.webhook_url.clone(), config.slack.enabled),
        }
    }

    pub async fn run<St>(&mut self, mut payloads: St) -> NotifySummary
    where
        St: Stream<Item = Vec<u8>> + Unpin,
    {
        info!(slack = self.slack_client.is_enabled(), "Starting alert notifier");
        let mut summary = NotifySummary::default();

        while let Some(payload) = payloads.next().await {
            summary.received += 1;

            let alert: AnomalyAlert = match serde_json::from_slice(&payload) {
                Ok(alert) => alert,
                Err(e) => {
                    summary.undecodable += 1;
                    warn!(error = %e, "Skipping undecodable alert");
                    continue;
                }
            };

            if !self.alert_engine.should_notify(&alert, Utc::now()) {
                summary.suppressed += 1;
                debug!(team_id = %alert.team_id, window_end = %alert.window.end, "Repeat alert muted");
                continue;
            }

            match self.slack_client.send_alert(&alert).await {
                Ok(()) => {
                    summary.sent += 1;
                    info!(team_id = %alert.team_id, alerts = alert.alerts.len(), "Alert notified");
                }
                Err(e) => {
                    summary.failed += 1;
                    error!(team_id = %alert.team_id, error = %e, "Failed to send Slack alert");
                }
            }
        }
        summary
    }
}
