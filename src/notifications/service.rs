use chrono::Utc;
use futures::future::join_all;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

use super::models::{ChannelKind, ChannelReport, DeliveryStatus, NotificationPolicy, RateLimitSettings, SendOutcome};
use super::rate_limiter::ChannelRateLimiter;
use super::senders::{
    desktop::DesktopSender,
    email::{EmailSender, EmailSettings},
    toast::ToastSender,
    webhook::WebhookSender,
    NotificationSender, SenderError,
};
use crate::alerting::models::{Alert, AlertStatus};
use crate::alerting::rules::{Category, Severity};
use crate::server::config::NotificationSettings;

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("Sender error: {0}")]
    SenderError(#[from] SenderError),
    #[error("No notification channels configured")]
    NoChannels,
}

/// Fans fired alerts out to every configured channel.
///
/// Channels run concurrently and in isolation: one channel failing or being
/// rate limited never affects another, and nothing here touches the alert
/// record itself.
pub struct NotificationService {
    senders: Vec<Arc<dyn NotificationSender>>,
}

impl NotificationService {
    pub fn new(senders: Vec<Arc<dyn NotificationSender>>) -> Self {
        Self { senders }
    }

    /// Builds the channel set from configuration. Toast and desktop are always
    /// present (desktop skips itself without permission); email and webhook only
    /// when enabled.
    pub fn from_config(
        settings: &NotificationSettings,
        toasts: ToastSender,
    ) -> Result<Self, NotificationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.http_timeout_seconds))
            .build()?;
        let policy = NotificationPolicy {
            critical_only: settings.critical_only,
        };

        let mut senders: Vec<Arc<dyn NotificationSender>> = Vec::new();
        senders.push(Arc::new(toasts));
        senders.push(Arc::new(DesktopSender::new(settings.desktop_enabled)));

        if settings.email.enabled {
            let email = &settings.email;
            let sender = EmailSender::new(
                client.clone(),
                EmailSettings {
                    api_url: email.api_url.clone(),
                    api_key: email.api_key.clone(),
                    from: email.from.clone(),
                    to: email.to.clone(),
                    rate_limit: RateLimitSettings {
                        cooldown_seconds: email.cooldown_seconds,
                        daily_cap: email.daily_cap,
                    },
                },
                Arc::new(ChannelRateLimiter::new(ChannelKind::Email)),
                policy,
            )?;
            senders.push(Arc::new(sender));
        }

        if settings.webhook.enabled {
            let webhook = &settings.webhook;
            let sender = WebhookSender::new(
                client,
                webhook.url.clone(),
                Arc::new(ChannelRateLimiter::new(ChannelKind::Webhook)),
                RateLimitSettings {
                    cooldown_seconds: webhook.cooldown_seconds,
                    daily_cap: webhook.daily_cap,
                },
                policy,
            )?;
            senders.push(Arc::new(sender));
        }

        info!(
            channels = ?senders.iter().map(|s| s.channel()).collect::<Vec<_>>(),
            critical_only = settings.critical_only,
            "Notification channels configured."
        );
        Ok(Self::new(senders))
    }

    pub fn channels(&self) -> Vec<ChannelKind> {
        self.senders.iter().map(|s| s.channel()).collect()
    }

    /// Fire-and-forget: one task per accepting channel. Outcomes only surface in logs.
    /// Must be called from within a Tokio runtime.
    pub fn dispatch(&self, alert: &Alert) {
        let alert = Arc::new(alert.clone());
        for sender in self.accepting(&alert) {
            let alert = alert.clone();
            tokio::spawn(async move {
                deliver(sender, alert).await;
            });
        }
    }

    /// Same fan-out as [`dispatch`](Self::dispatch), but waits for every
    /// channel and reports what each one did.
    pub async fn dispatch_and_wait(&self, alert: &Alert) -> Vec<ChannelReport> {
        let alert = Arc::new(alert.clone());
        let attempts = self
            .accepting(&alert)
            .into_iter()
            .map(|sender| deliver(sender, alert.clone()));
        join_all(attempts).await
    }

    /// Pushes a synthetic critical alert through every configured channel,
    /// bypassing severity routing.
    pub async fn send_test(&self) -> Result<Vec<ChannelReport>, NotificationError> {
        if self.senders.is_empty() {
            return Err(NotificationError::NoChannels);
        }
        let alert = Arc::new(test_alert());
        let attempts = self
            .senders
            .iter()
            .cloned()
            .map(|sender| deliver(sender, alert.clone()));
        Ok(join_all(attempts).await)
    }

    fn accepting(&self, alert: &Alert) -> Vec<Arc<dyn NotificationSender>> {
        self.senders
            .iter()
            .filter(|s| s.accepts(alert))
            .cloned()
            .collect()
    }
}

async fn deliver(sender: Arc<dyn NotificationSender>, alert: Arc<Alert>) -> ChannelReport {
    let channel = sender.channel();
    let status = match sender.send(&alert).await {
        Ok(SendOutcome::Delivered { message_id }) => {
            debug!(channel = %channel, alert_id = %alert.id, message_id = ?message_id, "Notification delivered.");
            DeliveryStatus::Delivered { message_id }
        }
        Ok(SendOutcome::Skipped { reason }) => {
            debug!(channel = %channel, alert_id = %alert.id, reason = %reason, "Notification skipped.");
            DeliveryStatus::Skipped { reason }
        }
        Err(e) if e.is_suppression() => {
            info!(channel = %channel, alert_id = %alert.id, rule_id = %alert.rule_id, reason = %e, "Notification suppressed by rate limit.");
            DeliveryStatus::Suppressed {
                reason: e.to_string(),
            }
        }
        Err(e) => {
            error!(channel = %channel, alert_id = %alert.id, rule_id = %alert.rule_id, error = %e, "Failed to send notification.");
            DeliveryStatus::Failed {
                error: e.to_string(),
            }
        }
    };
    ChannelReport {
        channel,
        alert_id: alert.id.clone(),
        status,
    }
}

fn test_alert() -> Alert {
    Alert {
        id: format!("test-{}", uuid::Uuid::new_v4()),
        rule_id: "notification-test".to_string(),
        rule_name: "Test notification".to_string(),
        category: Category::Cpu,
        severity: Severity::Critical,
        status: AlertStatus::Active,
        message: "This is a test notification from the alerting service.".to_string(),
        value: 0.0,
        threshold: 0.0,
        created_at: Utc::now(),
        acknowledged_at: None,
        resolved_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::config::{EmailChannelSettings, WebhookChannelSettings};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    enum Behavior {
        Deliver,
        Fail,
        Suppress,
    }

    struct FakeSender {
        kind: ChannelKind,
        behavior: Behavior,
        critical_only: bool,
        calls: AtomicUsize,
    }

    impl FakeSender {
        fn new(kind: ChannelKind, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                kind,
                behavior,
                critical_only: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn critical(kind: ChannelKind) -> Arc<Self> {
            Arc::new(Self {
                kind,
                behavior: Behavior::Deliver,
                critical_only: true,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl NotificationSender for FakeSender {
        fn channel(&self) -> ChannelKind {
            self.kind
        }

        fn accepts(&self, alert: &Alert) -> bool {
            !self.critical_only || alert.severity == Severity::Critical
        }

        async fn send(&self, _alert: &Alert) -> Result<SendOutcome, SenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Deliver => Ok(SendOutcome::Delivered {
                    message_id: Some("m-1".into()),
                }),
                Behavior::Fail => Err(SenderError::SendFailed("connection reset".into())),
                Behavior::Suppress => Err(SenderError::DailyLimitReached { cap: 2 }),
            }
        }
    }

    /// Signals every call on a channel so fire-and-forget dispatch can be observed.
    struct SignallingSender {
        kind: ChannelKind,
        tx: mpsc::UnboundedSender<ChannelKind>,
    }

    #[async_trait]
    impl NotificationSender for SignallingSender {
        fn channel(&self) -> ChannelKind {
            self.kind
        }

        fn accepts(&self, _alert: &Alert) -> bool {
            true
        }

        async fn send(&self, _alert: &Alert) -> Result<SendOutcome, SenderError> {
            let _ = self.tx.send(self.kind);
            Err(SenderError::SendFailed("boom".into()))
        }
    }

    fn alert(severity: Severity) -> Alert {
        Alert {
            severity,
            ..test_alert()
        }
    }

    fn status_of(reports: &[ChannelReport], channel: ChannelKind) -> Option<&DeliveryStatus> {
        reports.iter().find(|r| r.channel == channel).map(|r| &r.status)
    }

    #[tokio::test]
    async fn test_failing_email_does_not_block_webhook() {
        let email = FakeSender::new(ChannelKind::Email, Behavior::Fail);
        let webhook = FakeSender::new(ChannelKind::Webhook, Behavior::Deliver);
        let service = NotificationService::new(vec![email.clone() as Arc<dyn NotificationSender>, webhook.clone() as _]);

        let reports = service.dispatch_and_wait(&alert(Severity::Warning)).await;

        assert_eq!(reports.len(), 2);
        assert!(matches!(
            status_of(&reports, ChannelKind::Email),
            Some(DeliveryStatus::Failed { .. })
        ));
        assert_eq!(
            status_of(&reports, ChannelKind::Webhook),
            Some(&DeliveryStatus::Delivered {
                message_id: Some("m-1".into())
            })
        );
        assert_eq!(webhook.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_suppression_is_reported_separately_from_failure() {
        let email = FakeSender::new(ChannelKind::Email, Behavior::Suppress);
        let service = NotificationService::new(vec![email as Arc<dyn NotificationSender>]);

        let reports = service.dispatch_and_wait(&alert(Severity::Critical)).await;
        assert!(matches!(
            status_of(&reports, ChannelKind::Email),
            Some(DeliveryStatus::Suppressed { .. })
        ));
    }

    #[tokio::test]
    async fn test_critical_only_channels_skip_lower_severities() {
        let toast = FakeSender::new(ChannelKind::Toast, Behavior::Deliver);
        let desktop = FakeSender::critical(ChannelKind::Desktop);
        let service = NotificationService::new(vec![toast.clone() as Arc<dyn NotificationSender>, desktop.clone() as _]);

        let reports = service.dispatch_and_wait(&alert(Severity::Warning)).await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].channel, ChannelKind::Toast);

        let reports = service.dispatch_and_wait(&alert(Severity::Critical)).await;
        assert_eq!(reports.len(), 2);
        assert_eq!(toast.calls.load(Ordering::SeqCst), 2);
        assert_eq!(desktop.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dispatch_spawns_every_channel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let service = NotificationService::new(vec![
            Arc::new(SignallingSender {
                kind: ChannelKind::Email,
                tx: tx.clone(),
            }) as Arc<dyn NotificationSender>,
            Arc::new(SignallingSender {
                kind: ChannelKind::Webhook,
                tx,
            }) as _,
        ]);

        service.dispatch(&alert(Severity::Info));

        let mut seen = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
        seen.sort_by_key(|k| k.to_string());
        assert_eq!(seen, vec![ChannelKind::Email, ChannelKind::Webhook]);
    }

    #[tokio::test]
    async fn test_send_test_reaches_every_channel() {
        let desktop = FakeSender::critical(ChannelKind::Desktop);
        let email = FakeSender::new(ChannelKind::Email, Behavior::Fail);
        let service = NotificationService::new(vec![desktop as Arc<dyn NotificationSender>, email as _]);

        let reports = service.send_test().await.unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.alert_id.starts_with("test-")));

        let empty = NotificationService::new(Vec::new());
        assert!(matches!(empty.send_test().await, Err(NotificationError::NoChannels)));
    }

    #[tokio::test]
    async fn test_from_config_builds_enabled_channels() {
        let toasts = ToastSender::new(16);
        let mut toast_rx = toasts.subscribe();

        let settings = NotificationSettings::default();
        let service = NotificationService::from_config(&settings, toasts).unwrap();
        assert_eq!(service.channels(), vec![ChannelKind::Toast, ChannelKind::Desktop]);

        // Desktop is not permitted by default, so a critical alert only yields a toast.
        let reports = service.dispatch_and_wait(&alert(Severity::Critical)).await;
        assert!(matches!(
            status_of(&reports, ChannelKind::Desktop),
            Some(DeliveryStatus::Skipped { .. })
        ));
        assert_eq!(toast_rx.recv().await.unwrap().severity, Severity::Critical);
    }

    #[test]
    fn test_from_config_rejects_bad_webhook_url() {
        let settings = NotificationSettings {
            webhook: WebhookChannelSettings {
                enabled: true,
                url: "https://example.com/not-a-webhook".into(),
                ..WebhookChannelSettings::default()
            },
            ..NotificationSettings::default()
        };
        let result = NotificationService::from_config(&settings, ToastSender::new(4));
        assert!(matches!(
            result,
            Err(NotificationError::SenderError(SenderError::InvalidConfiguration(_)))
        ));
    }

    #[test]
    fn test_from_config_with_all_channels() {
        let settings = NotificationSettings {
            critical_only: true,
            email: EmailChannelSettings {
                enabled: true,
                api_key: "key".into(),
                from: "alerts@example.com".into(),
                to: "ops@example.com".into(),
                ..EmailChannelSettings::default()
            },
            webhook: WebhookChannelSettings {
                enabled: true,
                url: "https://hooks.slack.com/services/T000/B000/XXXX".into(),
                ..WebhookChannelSettings::default()
            },
            ..NotificationSettings::default()
        };
        let service = NotificationService::from_config(&settings, ToastSender::new(4)).unwrap();
        assert_eq!(
            service.channels(),
            vec![
                ChannelKind::Toast,
                ChannelKind::Desktop,
                ChannelKind::Email,
                ChannelKind::Webhook
            ]
        );
    }
}
