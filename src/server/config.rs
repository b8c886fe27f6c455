use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::alerting::store::DEFAULT_RETENTION;
use crate::notifications::senders::webhook::validate_webhook_url;

/// Prefix for environment overrides, e.g. `ALERTING_WEBHOOK_URL`.
pub const ENV_PREFIX: &str = "ALERTING_";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file at {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to load config from environment: {0}")]
    Env(#[from] envy::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub log_dir: String,
    pub metrics_interval_seconds: u64,
    pub alert_retention: usize,
    pub rules_file: Option<String>,
    pub notifications: NotificationSettings,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct NotificationSettings {
    /// Email and webhook only receive critical alerts.
    pub critical_only: bool,
    /// Whether native desktop notifications are permitted on this host.
    pub desktop_enabled: bool,
    pub http_timeout_seconds: u64,
    pub email: EmailChannelSettings,
    pub webhook: WebhookChannelSettings,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            critical_only: false,
            desktop_enabled: false,
            http_timeout_seconds: 10,
            email: EmailChannelSettings::default(),
            webhook: WebhookChannelSettings::default(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EmailChannelSettings {
    pub enabled: bool,
    pub api_url: String,
    pub api_key: String,
    pub from: String,
    pub to: String,
    pub cooldown_seconds: u64,
    pub daily_cap: u32,
}

impl Default for EmailChannelSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: "https://api.resend.com/emails".to_string(),
            api_key: String::new(),
            from: String::new(),
            to: String::new(),
            cooldown_seconds: 300,
            daily_cap: 50,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct WebhookChannelSettings {
    pub enabled: bool,
    pub url: String,
    pub cooldown_seconds: u64,
    pub daily_cap: u32,
}

impl Default for WebhookChannelSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            cooldown_seconds: 60,
            daily_cap: 200,
        }
    }
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
pub struct PartialServerConfig {
    log_dir: Option<String>,
    metrics_interval_seconds: Option<u64>,
    alert_retention: Option<usize>,
    rules_file: Option<String>,
    notifications: Option<NotificationSettings>,
}

/// Flat keys that may be overridden from the environment.
#[derive(Deserialize, Default, Debug)]
pub struct EnvOverrides {
    log_dir: Option<String>,
    metrics_interval_seconds: Option<u64>,
    alert_retention: Option<usize>,
    rules_file: Option<String>,
    critical_only: Option<bool>,
    desktop_enabled: Option<bool>,
    http_timeout_seconds: Option<u64>,
    email_enabled: Option<bool>,
    email_api_url: Option<String>,
    email_api_key: Option<String>,
    email_from: Option<String>,
    email_to: Option<String>,
    webhook_enabled: Option<bool>,
    webhook_url: Option<String>,
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_metrics_interval() -> u64 {
    5
}

impl ServerConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        // 1. Load from file (optional)
        let file_config = match config_path {
            Some(path_str) if Path::new(path_str).exists() => read_partial(Path::new(path_str))?,
            _ => PartialServerConfig::default(),
        };

        // 2. Load from environment variables
        let env_config: EnvOverrides = envy::prefixed(ENV_PREFIX).from_env()?;

        // 3. Merge: environment overrides file
        Self::from_layers(file_config, env_config)
    }

    pub fn from_layers(file: PartialServerConfig, env: EnvOverrides) -> Result<Self, ConfigError> {
        let mut notifications = file.notifications.unwrap_or_default();
        if let Some(v) = env.critical_only {
            notifications.critical_only = v;
        }
        if let Some(v) = env.desktop_enabled {
            notifications.desktop_enabled = v;
        }
        if let Some(v) = env.http_timeout_seconds {
            notifications.http_timeout_seconds = v;
        }
        let email = &mut notifications.email;
        if let Some(v) = env.email_enabled {
            email.enabled = v;
        }
        if let Some(v) = env.email_api_url {
            email.api_url = v;
        }
        if let Some(v) = env.email_api_key {
            email.api_key = v;
        }
        if let Some(v) = env.email_from {
            email.from = v;
        }
        if let Some(v) = env.email_to {
            email.to = v;
        }
        let webhook = &mut notifications.webhook;
        if let Some(v) = env.webhook_enabled {
            webhook.enabled = v;
        }
        if let Some(v) = env.webhook_url {
            webhook.url = v;
        }

        let config = ServerConfig {
            log_dir: env.log_dir.or(file.log_dir).unwrap_or_else(default_log_dir),
            metrics_interval_seconds: env
                .metrics_interval_seconds
                .or(file.metrics_interval_seconds)
                .unwrap_or_else(default_metrics_interval),
            alert_retention: env
                .alert_retention
                .or(file.alert_retention)
                .unwrap_or(DEFAULT_RETENTION),
            rules_file: env.rules_file.or(file.rules_file),
            notifications,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.metrics_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "metrics_interval_seconds must be greater than 0".to_string(),
            ));
        }
        if self.alert_retention == 0 {
            return Err(ConfigError::Invalid(
                "alert_retention must be greater than 0".to_string(),
            ));
        }
        let n = &self.notifications;
        if n.http_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "notifications.http_timeout_seconds must be greater than 0".to_string(),
            ));
        }
        if n.email.enabled {
            for (field, value) in [
                ("api_url", &n.email.api_url),
                ("api_key", &n.email.api_key),
                ("from", &n.email.from),
                ("to", &n.email.to),
            ] {
                if value.trim().is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "notifications.email.{field} is required when email is enabled"
                    )));
                }
            }
        }
        if n.webhook.enabled {
            validate_webhook_url(&n.webhook.url)
                .map_err(|e| ConfigError::Invalid(format!("notifications.webhook.url: {e}")))?;
        }
        Ok(())
    }
}

fn read_partial(path: &Path) -> Result<PartialServerConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CONFIG_TOML: &str = r#"
log_dir = "/var/log/alerting"
metrics_interval_seconds = 15
rules_file = "rules.toml"

[notifications]
critical_only = true
desktop_enabled = true

[notifications.email]
enabled = true
api_key = "re_123"
from = "alerts@example.com"
to = "ops@example.com"
daily_cap = 10

[notifications.webhook]
url = "https://hooks.slack.com/services/T000/B000/XXXX"
"#;

    fn partial(contents: &str) -> PartialServerConfig {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        read_partial(file.path()).unwrap()
    }

    #[test]
    fn test_defaults_without_any_layer() {
        let config =
            ServerConfig::from_layers(PartialServerConfig::default(), EnvOverrides::default()).unwrap();
        assert_eq!(config.log_dir, "logs");
        assert_eq!(config.metrics_interval_seconds, 5);
        assert_eq!(config.alert_retention, 100);
        assert_eq!(config.rules_file, None);
        assert_eq!(config.notifications, NotificationSettings::default());
        assert_eq!(config.notifications.email.cooldown_seconds, 300);
        assert_eq!(config.notifications.email.daily_cap, 50);
        assert_eq!(config.notifications.webhook.cooldown_seconds, 60);
        assert_eq!(config.notifications.webhook.daily_cap, 200);
        assert_eq!(config.notifications.http_timeout_seconds, 10);
    }

    #[test]
    fn test_file_layer() {
        let config = ServerConfig::from_layers(partial(CONFIG_TOML), EnvOverrides::default()).unwrap();
        assert_eq!(config.log_dir, "/var/log/alerting");
        assert_eq!(config.metrics_interval_seconds, 15);
        assert_eq!(config.rules_file.as_deref(), Some("rules.toml"));
        assert!(config.notifications.critical_only);
        assert!(config.notifications.email.enabled);
        assert_eq!(config.notifications.email.daily_cap, 10);
        // Unset keys inside a section keep their defaults.
        assert_eq!(config.notifications.email.cooldown_seconds, 300);
        assert!(!config.notifications.webhook.enabled);
    }

    #[test]
    fn test_env_overrides_file() {
        let env = EnvOverrides {
            log_dir: Some("/tmp/logs".into()),
            email_to: Some("oncall@example.com".into()),
            webhook_enabled: Some(true),
            ..EnvOverrides::default()
        };
        let config = ServerConfig::from_layers(partial(CONFIG_TOML), env).unwrap();
        assert_eq!(config.log_dir, "/tmp/logs");
        assert_eq!(config.notifications.email.to, "oncall@example.com");
        assert_eq!(config.notifications.email.from, "alerts@example.com");
        assert!(config.notifications.webhook.enabled);
    }

    #[test]
    fn test_env_overrides_from_variables() {
        let vars = vec![
            ("ALERTING_WEBHOOK_URL".to_string(), "https://hooks.slack.com/services/A/B/C".to_string()),
            ("ALERTING_CRITICAL_ONLY".to_string(), "true".to_string()),
            ("ALERTING_ALERT_RETENTION".to_string(), "250".to_string()),
        ];
        let env: EnvOverrides = envy::prefixed(ENV_PREFIX).from_iter(vars).unwrap();
        let config = ServerConfig::from_layers(PartialServerConfig::default(), env).unwrap();
        assert_eq!(config.notifications.webhook.url, "https://hooks.slack.com/services/A/B/C");
        assert!(config.notifications.critical_only);
        assert_eq!(config.alert_retention, 250);
    }

    #[test]
    fn test_enabled_webhook_needs_valid_url() {
        let env = EnvOverrides {
            webhook_enabled: Some(true),
            webhook_url: Some("https://example.com/hook".into()),
            ..EnvOverrides::default()
        };
        let err = ServerConfig::from_layers(PartialServerConfig::default(), env).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("webhook")));
    }

    #[test]
    fn test_enabled_email_needs_credentials() {
        let env = EnvOverrides {
            email_enabled: Some(true),
            ..EnvOverrides::default()
        };
        let err = ServerConfig::from_layers(PartialServerConfig::default(), env).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("api_key")));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let env = EnvOverrides {
            metrics_interval_seconds: Some(0),
            ..EnvOverrides::default()
        };
        assert!(ServerConfig::from_layers(PartialServerConfig::default(), env).is_err());
    }

    #[test]
    fn test_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"log_dir = [1, 2").unwrap();
        let err = read_partial(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"metrics_interval_seconds = 30\n").unwrap();
        let config = ServerConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.metrics_interval_seconds, 30);
    }
}
