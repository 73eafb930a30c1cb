//! Webhook-based notification hub.
//!
//! Fans a message out to every configured channel (Slack, Discord, Teams,
//! PagerDuty, custom webhook). Channels are independent: one failing
//! delivery never blocks the others. Ticket creation reuses the custom
//! webhook endpoint when configured.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use crate::domain::errors::{GuardianError, GuardianResult};
use crate::domain::models::config::Config;
use crate::domain::models::signal::Severity;
use crate::domain::ports::notify::Notifier;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

fn severity_emoji(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => ":information_source:",
        Severity::Warning => ":warning:",
        Severity::Critical => ":rotating_light:",
    }
}

pub struct WebhookNotifier {
    http: reqwest::Client,
    slack_url: Option<String>,
    discord_url: Option<String>,
    teams_url: Option<String>,
    pagerduty_key: Option<String>,
    custom_url: Option<String>,
}

impl WebhookNotifier {
    pub fn from_config(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            slack_url: config.slack_webhook_url.clone(),
            discord_url: config.discord_webhook_url.clone(),
            teams_url: config.teams_webhook_url.clone(),
            pagerduty_key: config.pagerduty_integration_key.clone(),
            custom_url: config.custom_webhook_url.clone(),
        }
    }

    /// True when at least one channel is configured.
    pub fn has_channels(&self) -> bool {
        self.slack_url.is_some()
            || self.discord_url.is_some()
            || self.teams_url.is_some()
            || self.pagerduty_key.is_some()
            || self.custom_url.is_some()
    }

    async fn post(&self, channel: &str, url: &str, payload: serde_json::Value) -> bool {
        match self
            .http
            .post(url)
            .json(&payload)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(channel, status = %response.status(), "notification rejected");
                false
            }
            Err(err) => {
                warn!(channel, error = %err, "notification delivery failed");
                false
            }
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, message: &str, severity: Severity) -> HashMap<String, bool> {
        let mut delivered = HashMap::new();

        if let Some(url) = &self.slack_url {
            let payload = json!({
                "text": format!("{} {message}", severity_emoji(severity)),
            });
            delivered.insert("slack".to_string(), self.post("slack", url, payload).await);
        }

        if let Some(url) = &self.discord_url {
            let payload = json!({
                "content": format!("{} {message}", severity_emoji(severity)),
            });
            delivered.insert(
                "discord".to_string(),
                self.post("discord", url, payload).await,
            );
        }

        if let Some(url) = &self.teams_url {
            let payload = json!({
                "@type": "MessageCard",
                "@context": "http://schema.org/extensions",
                "summary": "Cluster Guardian",
                "title": format!("Cluster Guardian ({})", severity.as_str()),
                "text": message,
            });
            delivered.insert("teams".to_string(), self.post("teams", url, payload).await);
        }

        // PagerDuty only pages for critical findings.
        if let (Some(key), Severity::Critical) = (&self.pagerduty_key, severity) {
            let payload = json!({
                "routing_key": key,
                "event_action": "trigger",
                "payload": {
                    "summary": message,
                    "source": "cluster-guardian",
                    "severity": "critical",
                },
            });
            delivered.insert(
                "pagerduty".to_string(),
                self.post("pagerduty", "https://events.pagerduty.com/v2/enqueue", payload)
                    .await,
            );
        }

        if let Some(url) = &self.custom_url {
            let payload = json!({
                "message": message,
                "severity": severity.as_str(),
                "source": "cluster-guardian",
            });
            delivered.insert(
                "custom".to_string(),
                self.post("custom", url, payload).await,
            );
        }

        delivered
    }

    async fn create_ticket(
        &self,
        title: &str,
        description: &str,
        severity: Severity,
    ) -> GuardianResult<String> {
        let Some(url) = &self.custom_url else {
            return Err(GuardianError::unavailable(
                "ticketing",
                "no ticketing endpoint configured",
            ));
        };
        let ticket_id = uuid::Uuid::new_v4().to_string();
        let payload = json!({
            "kind": "ticket",
            "id": ticket_id,
            "title": title,
            "description": description,
            "severity": severity.as_str(),
            "source": "cluster-guardian",
        });
        if self.post("ticket", url, payload).await {
            Ok(ticket_id)
        } else {
            Err(GuardianError::unavailable(
                "ticketing",
                "ticket delivery failed",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_notify_reports_per_channel_status() {
        let mut server = mockito::Server::new_async().await;
        let _slack = server
            .mock("POST", "/slack")
            .with_status(200)
            .create_async()
            .await;
        let _custom = server
            .mock("POST", "/custom")
            .with_status(500)
            .create_async()
            .await;

        let notifier = WebhookNotifier {
            http: reqwest::Client::new(),
            slack_url: Some(format!("{}/slack", server.url())),
            discord_url: None,
            teams_url: None,
            pagerduty_key: None,
            custom_url: Some(format!("{}/custom", server.url())),
        };

        let delivered = notifier.notify("pod restarted", Severity::Info).await;
        assert_eq!(delivered.get("slack"), Some(&true));
        assert_eq!(delivered.get("custom"), Some(&false));
        assert!(!delivered.contains_key("discord"));
    }

    #[tokio::test]
    async fn test_ticket_without_endpoint_errors() {
        let notifier = WebhookNotifier {
            http: reqwest::Client::new(),
            slack_url: None,
            discord_url: None,
            teams_url: None,
            pagerduty_key: None,
            custom_url: None,
        };
        let err = notifier
            .create_ticket("t", "d", Severity::Warning)
            .await
            .unwrap_err();
        assert!(err.is_degraded());
    }
}
