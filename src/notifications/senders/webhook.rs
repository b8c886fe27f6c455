use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{header, Client};
use serde_json::{json, Value};
use std::sync::Arc;

use super::{NotificationSender, SenderError};
use crate::alerting::models::Alert;
use crate::alerting::rules::Severity;
use crate::notifications::models::{ChannelKind, NotificationPolicy, RateLimitSettings, SendOutcome};
use crate::notifications::rate_limiter::ChannelRateLimiter;

static WEBHOOK_URL_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https://hooks\.slack\.com/services/[A-Za-z0-9]+/[A-Za-z0-9]+/[A-Za-z0-9]+$")
        .expect("webhook URL pattern is valid")
});

/// Checks a user-supplied incoming-webhook URL before it is accepted.
pub fn validate_webhook_url(url: &str) -> Result<(), SenderError> {
    if WEBHOOK_URL_SHAPE.is_match(url) {
        Ok(())
    } else {
        Err(SenderError::InvalidConfiguration(format!(
            "Not an incoming webhook URL: {}",
            url
        )))
    }
}

fn severity_emoji(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => ":red_circle:",
        Severity::Warning => ":warning:",
        Severity::Info => ":information_source:",
    }
}

/// Block-kit message: header, field section, message section and context footer.
pub fn build_payload(alert: &Alert) -> Value {
    let severity = alert.severity.as_str().to_uppercase();
    json!({
        "text": format!("[{}] {}: {}", severity, alert.rule_name, alert.message),
        "blocks": [
            {
                "type": "header",
                "text": {
                    "type": "plain_text",
                    "text": format!("{} {}", severity_emoji(alert.severity), alert.rule_name),
                    "emoji": true
                }
            },
            {
                "type": "section",
                "fields": [
                    { "type": "mrkdwn", "text": format!("*Category:*\n{}", alert.category) },
                    { "type": "mrkdwn", "text": format!("*Severity:*\n{}", severity) },
                    { "type": "mrkdwn", "text": format!("*Value:*\n{}", alert.value) },
                    { "type": "mrkdwn", "text": format!("*Threshold:*\n{}", alert.threshold) }
                ]
            },
            {
                "type": "section",
                "text": { "type": "mrkdwn", "text": alert.message }
            },
            {
                "type": "context",
                "elements": [
                    {
                        "type": "mrkdwn",
                        "text": format!(
                            "Alert `{}` | {}",
                            alert.id,
                            alert.created_at.format("%Y-%m-%d %H:%M:%S UTC")
                        )
                    }
                ]
            }
        ]
    })
}

/// A sender for pushing alerts to a chat incoming webhook.
pub struct WebhookSender {
    client: Client,
    url: String,
    limiter: Arc<ChannelRateLimiter>,
    rate_limit: RateLimitSettings,
    policy: NotificationPolicy,
}

impl WebhookSender {
    pub fn new(
        client: Client,
        url: String,
        limiter: Arc<ChannelRateLimiter>,
        rate_limit: RateLimitSettings,
        policy: NotificationPolicy,
    ) -> Result<Self, SenderError> {
        validate_webhook_url(&url)?;
        Ok(Self {
            client,
            url,
            limiter,
            rate_limit,
            policy,
        })
    }

    pub fn limiter(&self) -> &Arc<ChannelRateLimiter> {
        &self.limiter
    }
}

#[async_trait]
impl NotificationSender for WebhookSender {
    fn channel(&self) -> ChannelKind {
        ChannelKind::Webhook
    }

    fn accepts(&self, alert: &Alert) -> bool {
        self.policy.allows(alert.severity)
    }

    async fn send(&self, alert: &Alert) -> Result<SendOutcome, SenderError> {
        self.limiter
            .try_reserve(
                &alert.rule_id,
                Utc::now(),
                self.rate_limit.cooldown_seconds,
                self.rate_limit.daily_cap,
            )
            .map_err(|limited| SenderError::rate_limited(&alert.rule_id, limited))?;

        let response = self
            .client
            .post(&self.url)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&build_payload(alert))
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(SenderError::SendFailed(format!(
                "Webhook returned non-success status: {}. Body: {}",
                status, error_body
            )));
        }

        Ok(SendOutcome::Delivered { message_id: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::models::AlertStatus;
    use crate::alerting::rules::Category;
    use chrono::TimeZone;

    fn alert() -> Alert {
        Alert {
            id: "a-1".into(),
            rule_id: "disk-full".into(),
            rule_name: "Disk almost full".into(),
            category: Category::Disk,
            severity: Severity::Warning,
            status: AlertStatus::Active,
            message: "disk usage is 96.00, at or above threshold 95".into(),
            value: 96.0,
            threshold: 95.0,
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            acknowledged_at: None,
            resolved_at: None,
        }
    }

    #[test]
    fn test_webhook_url_shape() {
        assert!(validate_webhook_url("https://hooks.slack.com/services/T000/B000/XXXXabc123").is_ok());
        assert!(validate_webhook_url("http://hooks.slack.com/services/T000/B000/XXXX").is_err());
        assert!(validate_webhook_url("https://evil.example.com/services/T000/B000/XXXX").is_err());
        assert!(validate_webhook_url("https://hooks.slack.com/services/T000/B000").is_err());
        assert!(validate_webhook_url("https://hooks.slack.com/services/T000/B000/XX/../x").is_err());
    }

    #[test]
    fn test_invalid_url_rejected_at_construction() {
        let result = WebhookSender::new(
            Client::new(),
            "https://example.com/hook".into(),
            Arc::new(ChannelRateLimiter::new(ChannelKind::Webhook)),
            RateLimitSettings {
                cooldown_seconds: 60,
                daily_cap: 200,
            },
            NotificationPolicy::default(),
        );
        assert!(matches!(result, Err(SenderError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_payload_structure() {
        let payload = build_payload(&alert());
        assert_eq!(
            payload["text"],
            "[WARNING] Disk almost full: disk usage is 96.00, at or above threshold 95"
        );

        let blocks = payload["blocks"].as_array().unwrap();
        assert_eq!(blocks.len(), 4);
        assert_eq!(blocks[0]["type"], "header");
        assert_eq!(blocks[0]["text"]["text"], ":warning: Disk almost full");
        assert_eq!(blocks[1]["fields"].as_array().unwrap().len(), 4);
        assert_eq!(blocks[1]["fields"][0]["text"], "*Category:*\ndisk");
        assert_eq!(blocks[3]["type"], "context");
        assert_eq!(
            blocks[3]["elements"][0]["text"],
            "Alert `a-1` | 2026-03-01 12:00:00 UTC"
        );
    }
}
