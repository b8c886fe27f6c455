use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::{fmt, str::FromStr};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("Rule field '{0}' must not be empty")]
    EmptyField(&'static str),
    #[error("Rule {rule_id}: threshold must be a finite number")]
    InvalidThreshold { rule_id: String },
    #[error("Rule {rule_id}: category '{category}' is not valid for threshold rules")]
    InvalidCategory { rule_id: String, category: Category },
    #[error("Rule {rule_id}: keyword rule needs at least one non-empty term")]
    EmptyTerms { rule_id: String },
    #[error("Rule {rule_id}: invalid regex: {source}")]
    InvalidRegex {
        rule_id: String,
        #[source]
        source: regex::Error,
    },
    #[error("Rule {rule_id}: frequency threshold and window must both be greater than zero")]
    InvalidFrequency { rule_id: String },
    #[error("Unknown log level '{0}'")]
    UnknownLogLevel(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource family a rule watches. `Log` is reserved for alerts raised by log rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Cpu,
    Memory,
    Disk,
    Network,
    Container,
    Log,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Cpu => "cpu",
            Category::Memory => "memory",
            Category::Disk => "disk",
            Category::Network => "network",
            Category::Container => "container",
            Category::Log => "log",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOperator {
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = "==")]
    Equal,
}

impl ComparisonOperator {
    /// Exact floating point comparison, no tolerance.
    #[allow(clippy::float_cmp)]
    pub fn compare(self, value: f64, threshold: f64) -> bool {
        match self {
            ComparisonOperator::GreaterThan => value > threshold,
            ComparisonOperator::LessThan => value < threshold,
            ComparisonOperator::GreaterOrEqual => value >= threshold,
            ComparisonOperator::LessOrEqual => value <= threshold,
            ComparisonOperator::Equal => value == threshold,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonOperator::GreaterThan => ">",
            ComparisonOperator::LessThan => "<",
            ComparisonOperator::GreaterOrEqual => ">=",
            ComparisonOperator::LessOrEqual => "<=",
            ComparisonOperator::Equal => "==",
        }
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub metric: String,
    pub operator: ComparisonOperator,
    pub threshold: f64,
}

/// Who a rule belongs to. Filtering by owner happens in the rule repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleScope {
    #[default]
    Global,
    User(String),
}

fn default_enabled() -> bool {
    true
}

/// Threshold rule evaluated against metric snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    pub category: Category,
    pub condition: Condition,
    pub severity: Severity,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub cooldown_seconds: u64,
    #[serde(default)]
    pub owner: RuleScope,
}

impl AlertRule {
    pub fn validate(&self) -> Result<(), RuleError> {
        if self.id.trim().is_empty() {
            return Err(RuleError::EmptyField("id"));
        }
        if self.name.trim().is_empty() {
            return Err(RuleError::EmptyField("name"));
        }
        if self.condition.metric.trim().is_empty() {
            return Err(RuleError::EmptyField("condition.metric"));
        }
        if self.category == Category::Log {
            return Err(RuleError::InvalidCategory {
                rule_id: self.id.clone(),
                category: self.category,
            });
        }
        if !self.condition.threshold.is_finite() {
            return Err(RuleError::InvalidThreshold {
                rule_id: self.id.clone(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[serde(alias = "warning")]
    Warn,
    Error,
    #[serde(alias = "critical", alias = "crit")]
    Fatal,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Fatal => "fatal",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "fatal" | "critical" | "crit" => Ok(LogLevel::Fatal),
            _ => Err(RuleError::UnknownLogLevel(s.to_string())),
        }
    }
}

/// Matching strategy of a log rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum LogRuleKind {
    /// Case-insensitive substring match on any of the terms.
    Keyword { terms: BTreeSet<String> },
    /// Regular expression tested against the message.
    Pattern { regex: String },
    /// At least `threshold` lines of `level` inside a sliding window.
    #[serde(rename_all = "camelCase")]
    Frequency {
        level: LogLevel,
        threshold: u32,
        window_seconds: u64,
    },
}

impl LogRuleKind {
    pub fn name(&self) -> &'static str {
        match self {
            LogRuleKind::Keyword { .. } => "keyword",
            LogRuleKind::Pattern { .. } => "pattern",
            LogRuleKind::Frequency { .. } => "frequency",
        }
    }
}

/// Rule evaluated against streaming log lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogAlertRule {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub kind: LogRuleKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub severity: Severity,
    #[serde(default)]
    pub cooldown_seconds: u64,
    /// Restricts the rule to lines from this source; `None` matches every source.
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub owner: RuleScope,
}

impl LogAlertRule {
    pub fn validate(&self) -> Result<(), RuleError> {
        if self.id.trim().is_empty() {
            return Err(RuleError::EmptyField("id"));
        }
        if self.name.trim().is_empty() {
            return Err(RuleError::EmptyField("name"));
        }
        match &self.kind {
            LogRuleKind::Keyword { terms } => {
                if terms.iter().all(|t| t.trim().is_empty()) {
                    return Err(RuleError::EmptyTerms {
                        rule_id: self.id.clone(),
                    });
                }
            }
            LogRuleKind::Pattern { regex } => {
                Regex::new(regex).map_err(|source| RuleError::InvalidRegex {
                    rule_id: self.id.clone(),
                    source,
                })?;
            }
            LogRuleKind::Frequency {
                threshold,
                window_seconds,
                ..
            } => {
                if *threshold == 0 || *window_seconds == 0 {
                    return Err(RuleError::InvalidFrequency {
                        rule_id: self.id.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn applies_to_source(&self, source: &str) -> bool {
        self.source.as_deref().is_none_or(|s| s == source)
    }
}
