use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{NotificationSender, SenderError};
use crate::alerting::models::Alert;
use crate::alerting::rules::Severity;
use crate::notifications::models::{ChannelKind, SendOutcome};

/// Native desktop notification for critical alerts, via `notify-send` on
/// Linux and `osascript` on macOS.
#[derive(Debug, Clone)]
pub struct DesktopSender {
    permission_granted: bool,
}

impl DesktopSender {
    pub fn new(permission_granted: bool) -> Self {
        Self { permission_granted }
    }

    fn command(title: &str, body: &str) -> Option<Command> {
        if cfg!(target_os = "macos") {
            let script = format!(
                "display notification \"{}\" with title \"{}\"",
                escape_applescript(body),
                escape_applescript(title)
            );
            let mut cmd = Command::new("osascript");
            cmd.arg("-e").arg(script);
            Some(cmd)
        } else if cfg!(unix) {
            let mut cmd = Command::new("notify-send");
            cmd.arg("--urgency=critical").arg(title).arg(body);
            Some(cmd)
        } else {
            None
        }
    }
}

fn escape_applescript(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[async_trait]
impl NotificationSender for DesktopSender {
    fn channel(&self) -> ChannelKind {
        ChannelKind::Desktop
    }

    fn accepts(&self, alert: &Alert) -> bool {
        alert.severity == Severity::Critical
    }

    async fn send(&self, alert: &Alert) -> Result<SendOutcome, SenderError> {
        if !self.permission_granted {
            debug!(alert_id = %alert.id, "Desktop notifications not permitted, skipping.");
            return Ok(SendOutcome::Skipped {
                reason: "desktop notifications not permitted".to_string(),
            });
        }

        let title = format!("[{}] {}", alert.severity.as_str().to_uppercase(), alert.rule_name);
        let Some(mut cmd) = Self::command(&title, &alert.message) else {
            return Ok(SendOutcome::Skipped {
                reason: "no desktop notifier on this platform".to_string(),
            });
        };

        let output = cmd
            .output()
            .await
            .map_err(|e| SenderError::SendFailed(format!("Failed to run desktop notifier: {}", e)))?;
        if !output.status.success() {
            return Err(SenderError::SendFailed(format!(
                "Desktop notifier exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(SendOutcome::Delivered { message_id: None })
    }
}
