use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::cooldown::CooldownTracker;
use super::evaluation_service::MetricEvaluator;
use super::log_matcher::LogPatternMatcher;
use super::models::{Alert, AlertStatus, AlertSummary, LogLine, MetricsSnapshot, NewAlert};
use super::rules::Severity;
use super::sources::{MetricsSource, RepositoryError, RuleRepository};
use super::store::AlertStore;
use crate::notifications::service::NotificationService;

#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error("Rule repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Turns metric snapshots and log lines into stored, dispatched alerts.
///
/// Both evaluators share one [`CooldownTracker`], so a rule id is throttled the
/// same way whichever path fires it. Every alert is recorded in the store before
/// notifications are dispatched, and dispatch outcomes never touch the store.
pub struct AlertEngine {
    repository: Arc<dyn RuleRepository>,
    cooldowns: Arc<CooldownTracker>,
    metric_evaluator: MetricEvaluator,
    log_matcher: Mutex<LogPatternMatcher>,
    store: Mutex<AlertStore>,
    notifications: Option<Arc<NotificationService>>,
}

impl AlertEngine {
    pub fn new(repository: Arc<dyn RuleRepository>, retention: usize) -> Self {
        let cooldowns = Arc::new(CooldownTracker::new());
        Self {
            repository,
            metric_evaluator: MetricEvaluator::new(cooldowns.clone()),
            log_matcher: Mutex::new(LogPatternMatcher::new(cooldowns.clone())),
            cooldowns,
            store: Mutex::new(AlertStore::new(retention)),
            notifications: None,
        }
    }

    pub fn with_notifications(mut self, notifications: Arc<NotificationService>) -> Self {
        self.notifications = Some(notifications);
        self
    }

    pub fn cooldowns(&self) -> &Arc<CooldownTracker> {
        &self.cooldowns
    }

    pub async fn evaluate_snapshot(
        &self,
        snapshot: &MetricsSnapshot,
    ) -> Result<Vec<Alert>, EvaluationError> {
        let rules = self.repository.list_enabled_threshold_rules().await?;
        debug!(count = rules.len(), "Evaluating metrics snapshot.");
        let candidates = self.metric_evaluator.evaluate(snapshot, &rules);
        Ok(self.commit(candidates, snapshot.collected_at).await)
    }

    pub async fn evaluate_log_line(&self, line: &LogLine) -> Result<Vec<Alert>, EvaluationError> {
        let rules = self.repository.list_enabled_log_rules().await?;
        let candidates = self.log_matcher.lock().await.evaluate(line, &rules);
        Ok(self.commit(candidates, line.timestamp).await)
    }

    async fn commit(&self, candidates: Vec<NewAlert>, at: DateTime<Utc>) -> Vec<Alert> {
        if candidates.is_empty() {
            return Vec::new();
        }
        let alerts: Vec<Alert> = {
            let mut store = self.store.lock().await;
            candidates
                .into_iter()
                .map(|candidate| store.create_at(candidate, at))
                .collect()
        };

        for alert in &alerts {
            info!(
                alert_id = %alert.id,
                rule_id = %alert.rule_id,
                rule_name = %alert.rule_name,
                severity = %alert.severity,
                message = %alert.message,
                "Alert fired."
            );
            if let Some(notifications) = &self.notifications {
                notifications.dispatch(alert);
            }
        }
        alerts
    }

    pub async fn acknowledge(&self, alert_id: &str) -> bool {
        let changed = self.store.lock().await.acknowledge(alert_id);
        if changed {
            info!(alert_id = %alert_id, "Alert acknowledged.");
        }
        changed
    }

    pub async fn resolve(&self, alert_id: &str) -> bool {
        let changed = self.store.lock().await.resolve(alert_id);
        if changed {
            info!(alert_id = %alert_id, "Alert resolved.");
        }
        changed
    }

    pub async fn clear_resolved(&self) -> usize {
        let removed = self.store.lock().await.clear_resolved();
        info!(removed, "Cleared resolved alerts.");
        removed
    }

    /// Snapshot of the alert history, newest first.
    pub async fn alerts(&self) -> Vec<Alert> {
        self.store.lock().await.all().cloned().collect()
    }

    pub async fn alerts_by_status(&self, status: AlertStatus) -> Vec<Alert> {
        self.store.lock().await.by_status(status).cloned().collect()
    }

    pub async fn alerts_by_severity(&self, severity: Severity) -> Vec<Alert> {
        self.store.lock().await.by_severity(severity).cloned().collect()
    }

    pub async fn get(&self, alert_id: &str) -> Option<Alert> {
        self.store.lock().await.get(alert_id).cloned()
    }

    pub async fn summary(&self) -> AlertSummary {
        self.store.lock().await.summary()
    }

    /// Drives evaluation from a periodic metrics tick and a log stream until
    /// `shutdown` resolves or both sources are exhausted. Errors in one cycle
    /// are logged and the loop carries on.
    pub async fn run<M, L, F>(
        self: Arc<Self>,
        mut metrics: M,
        mut logs: L,
        period: Duration,
        shutdown: F,
    ) where
        M: MetricsSource,
        L: Stream<Item = LogLine> + Unpin,
        F: Future<Output = ()>,
    {
        info!(interval_ms = period.as_millis() as u64, "Alert engine started.");
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        let mut metrics_open = true;
        let mut logs_open = true;

        while metrics_open || logs_open {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping alert engine.");
                    return;
                }
                _ = ticker.tick(), if metrics_open => {
                    match metrics.snapshot().await {
                        Ok(Some(snapshot)) => {
                            if let Err(e) = self.evaluate_snapshot(&snapshot).await {
                                error!(error = %e, "Error during metrics evaluation cycle.");
                            }
                        }
                        Ok(None) => {
                            info!("Metrics source exhausted.");
                            metrics_open = false;
                        }
                        Err(e) => warn!(error = %e, "Failed to collect metrics snapshot."),
                    }
                }
                line = logs.next(), if logs_open => {
                    match line {
                        Some(line) => {
                            if let Err(e) = self.evaluate_log_line(&line).await {
                                error!(error = %e, source = %line.source, "Error evaluating log line.");
                            }
                        }
                        None => {
                            info!("Log stream ended.");
                            logs_open = false;
                        }
                    }
                }
            }
        }
        info!("All alert sources exhausted, alert engine stopped.");
    }
}
