use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tracing::debug;
use uuid::Uuid;

use super::models::{Alert, AlertStatus, AlertSummary, NewAlert};
use super::rules::Severity;

pub const DEFAULT_RETENTION: usize = 100;

/// Alert history, newest first, capped at `retention` entries.
///
/// The store is the only place alert records are mutated: creation assigns
/// identity, and status only moves forward through
/// active → acknowledged → resolved (or active → resolved).
#[derive(Debug)]
pub struct AlertStore {
    alerts: VecDeque<Alert>,
    retention: usize,
}

impl Default for AlertStore {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}

impl AlertStore {
    pub fn new(retention: usize) -> Self {
        let retention = retention.max(1);
        Self {
            alerts: VecDeque::with_capacity(retention),
            retention,
        }
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    pub fn create(&mut self, new_alert: NewAlert) -> Alert {
        self.create_at(new_alert, Utc::now())
    }

    pub fn create_at(&mut self, new_alert: NewAlert, now: DateTime<Utc>) -> Alert {
        let alert = Alert {
            id: Uuid::new_v4().to_string(),
            rule_id: new_alert.rule_id,
            rule_name: new_alert.rule_name,
            category: new_alert.category,
            severity: new_alert.severity,
            status: AlertStatus::Active,
            message: new_alert.message,
            value: new_alert.value,
            threshold: new_alert.threshold,
            created_at: now,
            acknowledged_at: None,
            resolved_at: None,
        };
        self.alerts.push_front(alert.clone());
        if self.alerts.len() > self.retention {
            let evicted = self.alerts.len() - self.retention;
            self.alerts.truncate(self.retention);
            debug!(evicted, retention = self.retention, "Evicted oldest alerts.");
        }
        alert
    }

    /// Moves an active alert to acknowledged. Returns false (and changes
    /// nothing) for unknown, already acknowledged or resolved alerts.
    pub fn acknowledge(&mut self, id: &str) -> bool {
        self.acknowledge_at(id, Utc::now())
    }

    pub fn acknowledge_at(&mut self, id: &str, now: DateTime<Utc>) -> bool {
        match self.find_mut(id) {
            Some(alert) if alert.status == AlertStatus::Active => {
                alert.status = AlertStatus::Acknowledged;
                alert.acknowledged_at = Some(now);
                true
            }
            _ => false,
        }
    }

    /// Resolves an active or acknowledged alert. Resolved is terminal, so a
    /// second resolve leaves the record untouched.
    pub fn resolve(&mut self, id: &str) -> bool {
        self.resolve_at(id, Utc::now())
    }

    pub fn resolve_at(&mut self, id: &str, now: DateTime<Utc>) -> bool {
        match self.find_mut(id) {
            Some(alert) if alert.status != AlertStatus::Resolved => {
                alert.status = AlertStatus::Resolved;
                alert.resolved_at = Some(now);
                true
            }
            _ => false,
        }
    }

    /// Removes every resolved alert and returns how many were dropped.
    pub fn clear_resolved(&mut self) -> usize {
        let before = self.alerts.len();
        self.alerts.retain(|a| a.status != AlertStatus::Resolved);
        before - self.alerts.len()
    }

    pub fn get(&self, id: &str) -> Option<&Alert> {
        self.alerts.iter().find(|a| a.id == id)
    }

    /// All alerts, newest first.
    pub fn all(&self) -> impl Iterator<Item = &Alert> {
        self.alerts.iter()
    }

    pub fn by_status(&self, status: AlertStatus) -> impl Iterator<Item = &Alert> {
        self.alerts.iter().filter(move |a| a.status == status)
    }

    pub fn by_severity(&self, severity: Severity) -> impl Iterator<Item = &Alert> {
        self.alerts.iter().filter(move |a| a.severity == severity)
    }

    pub fn summary(&self) -> AlertSummary {
        self.alerts
            .iter()
            .fold(AlertSummary::default(), |mut summary, alert| {
                match alert.status {
                    AlertStatus::Active => summary.active += 1,
                    AlertStatus::Acknowledged => summary.acknowledged += 1,
                    AlertStatus::Resolved => summary.resolved += 1,
                }
                summary
            })
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut Alert> {
        self.alerts.iter_mut().find(|a| a.id == id)
    }
}
