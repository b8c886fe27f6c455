use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tera::{Context, Tera};
use tracing::debug;

use super::{NotificationSender, SenderError};
use crate::alerting::models::Alert;
use crate::notifications::models::{
    ChannelKind, EmailRequest, EmailResponse, NotificationPolicy, RateLimitSettings, SendOutcome,
};
use crate::notifications::rate_limiter::ChannelRateLimiter;

const ALERT_TEMPLATE_NAME: &str = "alert_email.html";

const ALERT_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<body style="font-family: sans-serif;">
  <h2>{{ severity | upper }}: {{ rule_name }}</h2>
  <p>{{ message }}</p>
  <table cellpadding="4">
    <tr><td><b>Category</b></td><td>{{ category }}</td></tr>
    <tr><td><b>Value</b></td><td>{{ value }}</td></tr>
    <tr><td><b>Threshold</b></td><td>{{ threshold }}</td></tr>
    <tr><td><b>Triggered</b></td><td>{{ created_at }}</td></tr>
  </table>
  <p style="color: #888; font-size: 12px;">Alert {{ alert_id }}</p>
</body>
</html>
"#;

#[derive(Debug, Clone)]
pub struct EmailSettings {
    pub api_url: String,
    pub api_key: String,
    pub from: String,
    pub to: String,
    pub rate_limit: RateLimitSettings,
}

#[derive(Debug, Deserialize)]
struct ProviderResponse {
    id: Option<String>,
}

/// Transactional email through an HTTP mail API (bearer key, JSON body).
pub struct EmailSender {
    client: Client,
    settings: EmailSettings,
    limiter: Arc<ChannelRateLimiter>,
    policy: NotificationPolicy,
    templates: Tera,
}

impl EmailSender {
    pub fn new(
        client: Client,
        settings: EmailSettings,
        limiter: Arc<ChannelRateLimiter>,
        policy: NotificationPolicy,
    ) -> Result<Self, SenderError> {
        if settings.api_url.is_empty() || settings.to.is_empty() || settings.from.is_empty() {
            return Err(SenderError::InvalidConfiguration(
                "Email channel needs api_url, from and to.".to_string(),
            ));
        }
        let mut templates = Tera::default();
        templates
            .add_raw_template(ALERT_TEMPLATE_NAME, ALERT_TEMPLATE)
            .map_err(|e| SenderError::TemplatingError(e.to_string()))?;
        Ok(Self {
            client,
            settings,
            limiter,
            policy,
            templates,
        })
    }

    pub fn limiter(&self) -> &Arc<ChannelRateLimiter> {
        &self.limiter
    }

    /// Renders the alert into a request addressed to the configured recipient.
    pub fn build_request(&self, alert: &Alert) -> Result<EmailRequest, SenderError> {
        let mut context = Context::new();
        context.insert("alert_id", &alert.id);
        context.insert("rule_name", &alert.rule_name);
        context.insert("severity", alert.severity.as_str());
        context.insert("category", alert.category.as_str());
        context.insert("message", &alert.message);
        context.insert("value", &alert.value);
        context.insert("threshold", &alert.threshold);
        context.insert(
            "created_at",
            &alert.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        );

        let html = self
            .templates
            .render(ALERT_TEMPLATE_NAME, &context)
            .map_err(|e| SenderError::TemplatingError(e.to_string()))?;

        Ok(EmailRequest {
            to: self.settings.to.clone(),
            subject: format!(
                "[{}] {}",
                alert.severity.as_str().to_uppercase(),
                alert.rule_name
            ),
            html,
            rule_id: Some(alert.rule_id.clone()),
        })
    }

    /// Reserves quota for `request.rule_id` (when present) and posts the email.
    /// The reservation stands even if the provider call fails.
    pub async fn send_email(
        &self,
        request: &EmailRequest,
        now: DateTime<Utc>,
    ) -> Result<EmailResponse, SenderError> {
        if let Some(rule_id) = &request.rule_id {
            let limits = self.settings.rate_limit;
            self.limiter
                .try_reserve(rule_id, now, limits.cooldown_seconds, limits.daily_cap)
                .map_err(|limited| SenderError::rate_limited(rule_id, limited))?;
        }

        let body = json!({
            "from": self.settings.from,
            "to": [request.to],
            "subject": request.subject,
            "html": request.html,
        });

        let response = self
            .client
            .post(&self.settings.api_url)
            .bearer_auth(&self.settings.api_key)
            .json(&body)
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(SenderError::SendFailed(format!(
                "Email API returned non-success status: {}. Body: {}",
                status, error_body
            )));
        }

        // Acceptance is the status code; the id in the body is optional.
        let body = response.text().await.unwrap_or_default();
        let message_id = serde_json::from_str::<ProviderResponse>(&body)
            .ok()
            .and_then(|provider| provider.id);
        debug!(message_id = ?message_id, to = %request.to, "Email accepted by provider.");
        Ok(EmailResponse {
            success: true,
            message_id,
        })
    }
}

#[async_trait]
impl NotificationSender for EmailSender {
    fn channel(&self) -> ChannelKind {
        ChannelKind::Email
    }

    fn accepts(&self, alert: &Alert) -> bool {
        self.policy.allows(alert.severity)
    }

    /// Rate-limit reservations are made against wall-clock time, not the
    /// alert's event time.
    async fn send(&self, alert: &Alert) -> Result<SendOutcome, SenderError> {
        let request = self.build_request(alert)?;
        let response = self.send_email(&request, Utc::now()).await?;
        Ok(SendOutcome::Delivered {
            message_id: response.message_id,
        })
    }
}
