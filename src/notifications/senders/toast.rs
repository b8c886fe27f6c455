use async_trait::async_trait;
use tokio::sync::broadcast;

use super::{NotificationSender, SenderError};
use crate::alerting::models::Alert;
use crate::notifications::models::{ChannelKind, SendOutcome, ToastNotification};

/// In-app toasts, published to every subscribed UI. Never rate limited.
#[derive(Debug, Clone)]
pub struct ToastSender {
    tx: broadcast::Sender<ToastNotification>,
}

impl ToastSender {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ToastNotification> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl NotificationSender for ToastSender {
    fn channel(&self) -> ChannelKind {
        ChannelKind::Toast
    }

    fn accepts(&self, _alert: &Alert) -> bool {
        true
    }

    async fn send(&self, alert: &Alert) -> Result<SendOutcome, SenderError> {
        match self.tx.send(ToastNotification::from(alert)) {
            Ok(_) => Ok(SendOutcome::Delivered { message_id: None }),
            Err(_) => Ok(SendOutcome::Skipped {
                reason: "no toast subscribers".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::models::AlertStatus;
    use crate::alerting::rules::{Category, Severity};
    use chrono::Utc;

    fn alert() -> Alert {
        Alert {
            id: "a-1".into(),
            rule_id: "cpu-high".into(),
            rule_name: "CPU high".into(),
            category: Category::Cpu,
            severity: Severity::Info,
            status: AlertStatus::Active,
            message: "cpu usage is 95.00, above threshold 90".into(),
            value: 95.0,
            threshold: 90.0,
            created_at: Utc::now(),
            acknowledged_at: None,
            resolved_at: None,
        }
    }

    #[tokio::test]
    async fn test_subscribers_receive_toast() {
        let sender = ToastSender::new(8);
        let mut rx = sender.subscribe();

        let outcome = sender.send(&alert()).await.unwrap();
        assert_eq!(outcome, SendOutcome::Delivered { message_id: None });

        let toast = rx.recv().await.unwrap();
        assert_eq!(toast.alert_id, "a-1");
        assert_eq!(toast.title, "CPU high");
    }

    #[tokio::test]
    async fn test_without_subscribers_is_skipped() {
        let sender = ToastSender::new(8);
        assert!(matches!(
            sender.send(&alert()).await.unwrap(),
            SendOutcome::Skipped { .. }
        ));
    }
}
