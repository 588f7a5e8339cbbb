//! Alert publisher - serializes alerts and hands them to the outbound channel

use async_trait::async_trait;
use qualwatch_core::AnomalyAlert;
use thiserror::Error;
use tracing::{error, info};

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("failed to encode alert: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("outbound channel rejected alert: {0}")]
    Channel(String),
}

/// Outbound channel for encoded alerts
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, payload: Vec<u8>) -> Result<(), PublishError>;
}

/// Publishes onto a NATS subject
pub struct NatsAlertSink {
    client: async_nats::Client,
    subject: String,
}

impl NatsAlertSink {
    pub fn new(client: async_nats::Client, subject: impl Into<String>) -> Self {
        Self {
            client,
            subject: subject.into(),
        }
    }
}

#[async_trait]
impl AlertSink for NatsAlertSink {
    async fn send(&self, payload: Vec<u8>) -> Result<(), PublishError> {
        self.client
            .publish(self.subject.clone(), payload.into())
            .await
            .map_err(|e| PublishError::Channel(e.to_string()))
    }
}

pub struct AlertPublisher<S> {
    sink: S,
}

impl<S: AlertSink> AlertPublisher<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    /// Canonical JSON form of an alert
    pub fn encode(alert: &AnomalyAlert) -> Result<Vec<u8>, PublishError> {
        Ok(serde_json::to_vec(alert)?)
    }

    /// Encode and send one alert. Failures are logged and the alert is
    /// dropped; nothing is retried here.
    pub async fn publish(&self, alert: &AnomalyAlert) -> Result<(), PublishError> {
        let result = match Self::encode(alert) {
            Ok(payload) => self.sink.send(payload).await,
            Err(e) => Err(e),
        };

        match &result {
            Ok(()) => info!(
                team_id = %alert.team_id,
                report_id = %alert.report_id,
                window_end = %alert.window.end,
                alerts = alert.alerts.len(),
                "Anomaly alert published"
            ),
            Err(e) => error!(
                team_id = %alert.team_id,
                window_end = %alert.window.end,
                error = %e,
                "Dropping anomaly alert"
            ),
        }
        result
    }
}
