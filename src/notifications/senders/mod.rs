use async_trait::async_trait;
use thiserror::Error;

use super::models::{ChannelKind, SendOutcome};
use super::rate_limiter::RateLimited;
use crate::alerting::models::Alert;

pub mod desktop;
pub mod email;
pub mod toast;
pub mod webhook;

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("Cooldown active for rule '{rule_id}', {remaining_seconds}s remaining")]
    CooldownActive {
        rule_id: String,
        remaining_seconds: u64,
    },
    #[error("Daily limit of {cap} sends reached")]
    DailyLimitReached { cap: u32 },
    #[error("Failed to send notification: {0}")]
    SendFailed(String),
    #[error("Invalid configuration for sender: {0}")]
    InvalidConfiguration(String),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("Templating error: {0}")]
    TemplatingError(String),
}

impl SenderError {
    pub(crate) fn rate_limited(rule_id: &str, limited: RateLimited) -> Self {
        match limited {
            RateLimited::Cooldown { remaining_seconds } => SenderError::CooldownActive {
                rule_id: rule_id.to_string(),
                remaining_seconds,
            },
            RateLimited::DailyLimit { cap } => SenderError::DailyLimitReached { cap },
        }
    }

    /// Cooldown and daily cap refusals are expected "no send" results, not failures.
    pub fn is_suppression(&self) -> bool {
        matches!(
            self,
            SenderError::CooldownActive { .. } | SenderError::DailyLimitReached { .. }
        )
    }
}

/// A delivery channel for fired alerts.
///
/// Implementations carry their own configuration, credentials and rate limiter
/// so the dispatcher can iterate them uniformly.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    fn channel(&self) -> ChannelKind;

    /// Whether this channel wants the alert at all (severity routing, policy).
    fn accepts(&self, alert: &Alert) -> bool;

    async fn send(&self, alert: &Alert) -> Result<SendOutcome, SenderError>;
}
