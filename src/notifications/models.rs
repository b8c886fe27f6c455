use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::alerting::models::Alert;
use crate::alerting::rules::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChannelKind {
    Toast,
    Desktop,
    Email,
    Webhook,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::Toast => f.write_str("toast"),
            ChannelKind::Desktop => f.write_str("desktop"),
            ChannelKind::Email => f.write_str("email"),
            ChannelKind::Webhook => f.write_str("webhook"),
        }
    }
}

/// Account-level escalation policy shared by the email and webhook channels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPolicy {
    /// Only critical alerts leave the machine.
    pub critical_only: bool,
}

impl NotificationPolicy {
    pub fn allows(&self, severity: Severity) -> bool {
        !self.critical_only || severity == Severity::Critical
    }
}

/// Per-channel send limits applied by the rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitSettings {
    pub cooldown_seconds: u64,
    pub daily_cap: u32,
}

/// In-app toast payload published to UI subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToastNotification {
    pub alert_id: String,
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
}

impl From<&Alert> for ToastNotification {
    fn from(alert: &Alert) -> Self {
        Self {
            alert_id: alert.id.clone(),
            title: alert.rule_name.clone(),
            message: alert.message.clone(),
            severity: alert.severity,
            created_at: alert.created_at,
        }
    }
}

/// Transactional email request. `rule_id` enables per-rule rate limiting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailRequest {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub rule_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailResponse {
    pub success: bool,
    pub message_id: Option<String>,
}

/// What a channel did with an alert when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum SendOutcome {
    Delivered { message_id: Option<String> },
    Skipped { reason: String },
}

/// Result of one channel attempt, as reported by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum DeliveryStatus {
    Delivered { message_id: Option<String> },
    Skipped { reason: String },
    /// Cooldown or daily cap; a defined "no send", not a failure.
    Suppressed { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelReport {
    pub channel: ChannelKind,
    pub alert_id: String,
    pub status: DeliveryStatus,
}
