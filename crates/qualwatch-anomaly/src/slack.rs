//! Slack webhook integration

use qualwatch_core::AnomalyAlert;
use reqwest::Client;
use serde::Serialize;

// Slack client for sending alerts
pub struct SlackClient {
    client: Client,
    webhook_url: String,
    enabled: bool,
}

// slack message payload
#[derive(Debug, Serialize)]
pub struct SlackMessage {
    pub text: String,
    pub attachments: Vec<SlackAttachment>,
}

// slack attachment (colored sidebar with details)
#[derive(Debug, Serialize)]
pub struct SlackAttachment {
    pub color: String,
    pub title: String,
    pub text: String,
    pub fields: Vec<SlackField>,
    pub footer: String,
    pub ts: i64,
}

// slack field (key value in attachment)
#[derive(Debug, Serialize)]
pub struct SlackField {
    pub title: String,
    pub value: String,
    pub short: bool,
}

impl SlackClient {
    // create a new Slack client
    pub fn new(webhook_url: String, enabled: bool) -> Self {
        Self {
            client: Client::new(),
            webhook_url,
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    // send an alert to slack
    pub async fn send_alert(&self, alert: &AnomalyAlert) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        //skip if disabled
        if !self.enabled {
            return Ok(());
        }
        let message = build_message(alert);

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&message)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            let error_text = response.text().await.unwrap_or_default();
            Err(format!("Slack API error: {}", error_text).into())
        }
    }
}

// Build Slack message from an alert
pub fn build_message(alert: &AnomalyAlert) -> SlackMessage {
    let statistical = alert.alerts.iter().any(|a| a.kind.is_statistical());
    let (emoji, color) = if statistical {
        ("🚨", "danger")
    } else {
        ("⚠️", "warning")
    };

    let lines: Vec<String> = alert
        .alerts
        .iter()
        .map(|a| format!("• {}: {}", a.kind.as_str(), a.message))
        .collect();

    SlackMessage {
        text: format!("{} Quality anomaly: team {}", emoji, alert.team_id),
        attachments: vec![SlackAttachment {
            color: color.to_string(),
            title: format!("Report {}", alert.report_id),
            text: lines.join("\n"),
            fields: vec![
                SlackField {
                    title: "Window".to_string(),
                    value: format!(
                        "{} ~ {} (n={})",
                        alert.window.start.format("%Y-%m-%d %H:%M"),
                        alert.window.end.format("%H:%M"),
                        alert.window.count
                    ),
                    short: false,
                },
                SlackField {
                    title: "Mean / Stdev".to_string(),
                    value: format!("{:.2} / {:.2}", alert.window.mean, alert.window.stdev),
                    short: true,
                },
                SlackField {
                    title: "Event time".to_string(),
                    value: alert.event_ts.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
                    short: true,
                },
            ],
            footer: "Qualwatch Anomaly Detection".to_string(),
            ts: alert.event_ts.timestamp(),
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use qualwatch_core::{AlertItem, AlertKind, WindowSummary};

    fn alert(kinds: &[AlertKind]) -> AnomalyAlert {
        AnomalyAlert {
            team_id: "team-a".to_string(),
            report_id: "r-9".to_string(),
            event_ts: Utc.with_ymd_and_hms(2025, 3, 1, 12, 14, 0).unwrap(),
            overall_score: 0.2,
            coverage: 0.85,
            gaps: 0,
            overlaps: 0,
            window: WindowSummary {
                start: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
                end: Utc.with_ymd_and_hms(2025, 3, 1, 12, 15, 0).unwrap(),
                count: 9,
                mean: 0.823,
                stdev: 0.234,
            },
            alerts: kinds
                .iter()
                .map(|k| AlertItem { kind: *k, message: "m".to_string() })
                .collect(),
        }
    }

    #[test]
    fn test_build_message() {
        let msg = build_message(&alert(&[AlertKind::ScoreAnomaly, AlertKind::CoverageLow]));
        let attachment = &msg.attachments[0];

        assert!(msg.text.contains("team-a"));
        assert_eq!(attachment.color, "danger");
        assert_eq!(attachment.text, "• score_anomaly: m\n• coverage_low: m");
        assert_eq!(attachment.fields[0].value, "2025-03-01 12:00 ~ 12:15 (n=9)");
        assert_eq!(attachment.fields[1].value, "0.82 / 0.23");
    }

    #[test]
    fn test_rule_only_alert_is_warning() {
        let msg = build_message(&alert(&[AlertKind::GapsHigh]));
        assert_eq!(msg.attachments[0].color, "warning");
    }

    #[tokio::test]
    async fn test_disabled_client_is_noop() {
        let client = SlackClient::new(String::new(), false);
        assert!(client.send_alert(&alert(&[AlertKind::GapsHigh])).await.is_ok());
    }
}
