use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use crate::circulation::{RequestPolicy, ScannerConfig};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// PostgreSQL connection URL; the in-memory store is used when absent
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default)]
    pub circulation: CirculationConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: "./logs".to_string(),
            log_file: "book_relay.log".to_string(),
            use_json: false,
            rotation: "daily".to_string(),
            postgres_url: None,
            circulation: CirculationConfig::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CirculationConfig {
    /// Handover threads open this many days before the due date
    pub due_soon_days: u32,
    pub scan_interval_secs: u64,
    pub scan_batch_size: usize,
    /// Holding period for newly added books
    pub default_reading_days: u32,
    pub request_policy: RequestPolicy,
}

impl Default for CirculationConfig {
    fn default() -> Self {
        Self {
            due_soon_days: 7,
            scan_interval_secs: 3600,
            scan_batch_size: 100,
            default_reading_days: 14,
            request_policy: RequestPolicy::default(),
        }
    }
}

impl CirculationConfig {
    pub fn scanner(&self) -> ScannerConfig {
        ScannerConfig {
            look_ahead_days: self.due_soon_days,
            scan_interval: Duration::from_secs(self.scan_interval_secs),
            batch_size: self.scan_batch_size,
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse {}", config_path))
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let config = AppConfig::from_yaml(
            r#"
log_level: debug
log_dir: ./logs
log_file: relay.log
use_json: false
rotation: never
"#,
        )
        .unwrap();
        assert!(config.postgres_url.is_none());
        assert_eq!(config.circulation.due_soon_days, 7);
        assert_eq!(config.circulation.request_policy, RequestPolicy::Queueing);
    }

    #[test]
    fn test_circulation_section() {
        let config = AppConfig::from_yaml(
            r#"
log_level: info
log_dir: ./logs
log_file: relay.log
use_json: true
rotation: hourly
postgres_url: postgres://localhost/relay
circulation:
  due_soon_days: 3
  scan_interval_secs: 60
  request_policy: strict
"#,
        )
        .unwrap();
        assert_eq!(config.postgres_url.as_deref(), Some("postgres://localhost/relay"));
        assert_eq!(config.circulation.request_policy, RequestPolicy::Strict);

        let scanner = config.circulation.scanner();
        assert_eq!(scanner.look_ahead_days, 3);
        assert_eq!(scanner.scan_interval, Duration::from_secs(60));
        assert_eq!(scanner.batch_size, 100);
    }

    #[test]
    fn test_unknown_policy_rejected() {
        let result = AppConfig::from_yaml(
            r#"
log_level: info
log_dir: ./logs
log_file: relay.log
use_json: false
rotation: daily
circulation:
  request_policy: lottery
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(AppConfig::load("does-not-exist").is_err());
    }
}
