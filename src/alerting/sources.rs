//! Interfaces to the collaborators the engine consumes: the rule repository
//! and the metrics collector. Log lines arrive as a plain `Stream`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

use super::models::MetricsSnapshot;
use super::rules::{AlertRule, LogAlertRule, RuleError};

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Failed to read rules file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse rules file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid rule: {0}")]
    InvalidRule(#[from] RuleError),
    #[error("Duplicate rule id '{0}'")]
    DuplicateId(String),
    #[error("Rule source unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
#[error("Metrics collection failed: {0}")]
pub struct SourceError(pub String);

/// Read side of the rule persistence layer.
#[async_trait]
pub trait RuleRepository: Send + Sync {
    async fn list_enabled_threshold_rules(&self) -> Result<Vec<AlertRule>, RepositoryError>;
    async fn list_enabled_log_rules(&self) -> Result<Vec<LogAlertRule>, RepositoryError>;
}

/// Produces metric snapshots on demand, once per evaluation tick.
/// `Ok(None)` means the source is exhausted and will not be polled again.
#[async_trait]
pub trait MetricsSource: Send {
    async fn snapshot(&mut self) -> Result<Option<MetricsSnapshot>, SourceError>;
}

/// On-disk layout of a rules file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<AlertRule>,
    #[serde(default)]
    pub log_rules: Vec<LogAlertRule>,
}

impl RuleSet {
    /// Validates every rule and rejects ids shared by any two rules, across both kinds.
    pub fn validate(&self) -> Result<(), RepositoryError> {
        let mut seen = std::collections::HashSet::new();
        for rule in &self.rules {
            rule.validate()?;
            if !seen.insert(rule.id.as_str()) {
                return Err(RepositoryError::DuplicateId(rule.id.clone()));
            }
        }
        for rule in &self.log_rules {
            rule.validate()?;
            if !seen.insert(rule.id.as_str()) {
                return Err(RepositoryError::DuplicateId(rule.id.clone()));
            }
        }
        Ok(())
    }
}

/// Rules held in memory; replaceable at runtime.
#[derive(Debug, Default)]
pub struct InMemoryRuleRepository {
    rules: RwLock<RuleSet>,
}

impl InMemoryRuleRepository {
    pub fn new(rules: Vec<AlertRule>, log_rules: Vec<LogAlertRule>) -> Self {
        Self {
            rules: RwLock::new(RuleSet { rules, log_rules }),
        }
    }

    pub async fn replace(&self, set: RuleSet) {
        *self.rules.write().await = set;
    }

    pub async fn snapshot(&self) -> RuleSet {
        self.rules.read().await.clone()
    }
}

#[async_trait]
impl RuleRepository for InMemoryRuleRepository {
    async fn list_enabled_threshold_rules(&self) -> Result<Vec<AlertRule>, RepositoryError> {
        Ok(self
            .rules
            .read()
            .await
            .rules
            .iter()
            .filter(|r| r.enabled)
            .cloned()
            .collect())
    }

    async fn list_enabled_log_rules(&self) -> Result<Vec<LogAlertRule>, RepositoryError> {
        Ok(self
            .rules
            .read()
            .await
            .log_rules
            .iter()
            .filter(|r| r.enabled)
            .cloned()
            .collect())
    }
}

/// Rules loaded from a TOML file and validated before they are served.
#[derive(Debug)]
pub struct FileRuleRepository {
    path: PathBuf,
    inner: InMemoryRuleRepository,
}

impl FileRuleRepository {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let path = path.as_ref().to_path_buf();
        let set = read_rule_file(&path)?;
        info!(
            path = ?path,
            threshold_rules = set.rules.len(),
            log_rules = set.log_rules.len(),
            "Loaded alert rules."
        );
        Ok(Self {
            path,
            inner: InMemoryRuleRepository::new(set.rules, set.log_rules),
        })
    }

    /// Re-reads the file. On error the previously loaded rules stay in place.
    pub async fn reload(&self) -> Result<(), RepositoryError> {
        let set = read_rule_file(&self.path)?;
        info!(
            path = ?self.path,
            threshold_rules = set.rules.len(),
            log_rules = set.log_rules.len(),
            "Reloaded alert rules."
        );
        self.inner.replace(set).await;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RuleRepository for FileRuleRepository {
    async fn list_enabled_threshold_rules(&self) -> Result<Vec<AlertRule>, RepositoryError> {
        self.inner.list_enabled_threshold_rules().await
    }

    async fn list_enabled_log_rules(&self) -> Result<Vec<LogAlertRule>, RepositoryError> {
        self.inner.list_enabled_log_rules().await
    }
}

fn read_rule_file(path: &Path) -> Result<RuleSet, RepositoryError> {
    let contents = std::fs::read_to_string(path).map_err(|source| RepositoryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let set: RuleSet = toml::from_str(&contents).map_err(|source| RepositoryError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    set.validate()?;
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::rules::{Category, LogRuleKind, Severity};
    use std::io::Write;

    const RULES_TOML: &str = r#"
[[rules]]
id = "cpu-high"
name = "CPU high"
category = "cpu"
severity = "critical"
cooldownSeconds = 300
condition = { metric = "usage", operator = ">", threshold = 90.0 }

[[rules]]
id = "disk-full"
name = "Disk almost full"
category = "disk"
severity = "warning"
enabled = false
condition = { metric = "usage", operator = ">=", threshold = 95.0 }

[[logRules]]
id = "error-burst"
name = "Error burst"
kind = "frequency"
level = "error"
threshold = 3
windowSeconds = 60
severity = "critical"
cooldownSeconds = 120

[[logRules]]
id = "oom"
name = "OOM killer"
kind = "keyword"
terms = ["out of memory", "oom-killer"]
severity = "critical"
source = "kernel"
"#;

    fn write_rules(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_file_repository_serves_enabled_rules() {
        let file = write_rules(RULES_TOML);
        let repo = FileRuleRepository::load(file.path()).unwrap();

        let threshold = repo.list_enabled_threshold_rules().await.unwrap();
        assert_eq!(threshold.len(), 1);
        assert_eq!(threshold[0].id, "cpu-high");
        assert_eq!(threshold[0].category, Category::Cpu);

        let log_rules = repo.list_enabled_log_rules().await.unwrap();
        assert_eq!(log_rules.len(), 2);
        assert!(matches!(
            log_rules[0].kind,
            LogRuleKind::Frequency { threshold: 3, window_seconds: 60, .. }
        ));
        assert_eq!(log_rules[1].source.as_deref(), Some("kernel"));
        assert_eq!(log_rules[1].severity, Severity::Critical);
    }

    #[test]
    fn test_invalid_rules_are_rejected_at_load() {
        let bad = r#"
[[logRules]]
id = "broken"
name = "Broken regex"
kind = "pattern"
regex = "(unclosed"
severity = "info"
"#;
        let file = write_rules(bad);
        let err = FileRuleRepository::load(file.path()).unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidRule(RuleError::InvalidRegex { .. })));
    }

    #[test]
    fn test_duplicate_ids_across_kinds_are_rejected() {
        let dup = r#"
[[rules]]
id = "same"
name = "CPU"
category = "cpu"
severity = "info"
condition = { metric = "usage", operator = ">", threshold = 1.0 }

[[logRules]]
id = "same"
name = "Keyword"
kind = "keyword"
terms = ["x"]
severity = "info"
"#;
        let file = write_rules(dup);
        let err = FileRuleRepository::load(file.path()).unwrap_err();
        assert!(matches!(err, RepositoryError::DuplicateId(id) if id == "same"));
    }

    #[tokio::test]
    async fn test_reload_keeps_old_rules_on_error() {
        let file = write_rules(RULES_TOML);
        let repo = FileRuleRepository::load(file.path()).unwrap();

        std::fs::write(file.path(), "rules = 42").unwrap();
        assert!(repo.reload().await.is_err());
        assert_eq!(repo.list_enabled_threshold_rules().await.unwrap().len(), 1);
    }

    #[test]
    fn test_missing_file() {
        let err = FileRuleRepository::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, RepositoryError::Io { .. }));
    }

    #[tokio::test]
    async fn test_in_memory_replace() {
        let repo = InMemoryRuleRepository::default();
        assert!(repo.list_enabled_log_rules().await.unwrap().is_empty());

        let file = write_rules(RULES_TOML);
        let set: RuleSet = toml::from_str(&std::fs::read_to_string(file.path()).unwrap()).unwrap();
        repo.replace(set).await;
        assert_eq!(repo.list_enabled_log_rules().await.unwrap().len(), 2);
        assert_eq!(repo.snapshot().await.rules.len(), 2);
    }
}
