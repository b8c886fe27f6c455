use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::rules::{Category, LogLevel, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertStatus::Active => f.write_str("active"),
            AlertStatus::Acknowledged => f.write_str("acknowledged"),
            AlertStatus::Resolved => f.write_str("resolved"),
        }
    }
}

/// Candidate alert produced by an evaluator, before the store assigns identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAlert {
    pub rule_id: String,
    pub rule_name: String,
    pub category: Category,
    pub severity: Severity,
    pub message: String,
    pub value: f64,
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub rule_id: String,
    pub rule_name: String,
    pub category: Category,
    pub severity: Severity,
    pub status: AlertStatus,
    pub message: String,
    pub value: f64,
    pub threshold: f64,
    pub created_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Alert counts per status, for dashboard badges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertSummary {
    pub active: usize,
    pub acknowledged: usize,
    pub resolved: usize,
}

impl AlertSummary {
    pub fn total(&self) -> usize {
        self.active + self.acknowledged + self.resolved
    }
}

/// Numeric readings keyed by category and metric name, e.g. `cpu.usage`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub collected_at: DateTime<Utc>,
    pub values: HashMap<Category, HashMap<String, f64>>,
}

impl MetricsSnapshot {
    pub fn new(collected_at: DateTime<Utc>) -> Self {
        Self {
            collected_at,
            values: HashMap::new(),
        }
    }

    pub fn with(mut self, category: Category, metric: &str, value: f64) -> Self {
        self.insert(category, metric, value);
        self
    }

    pub fn insert(&mut self, category: Category, metric: &str, value: f64) {
        self.values
            .entry(category)
            .or_default()
            .insert(metric.to_string(), value);
    }

    pub fn get(&self, category: Category, metric: &str) -> Option<f64> {
        self.values.get(&category)?.get(metric).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.values.values().all(HashMap::is_empty)
    }
}

/// One structured log record from a container, the system journal or an application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogLine {
    pub source: String,
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}
