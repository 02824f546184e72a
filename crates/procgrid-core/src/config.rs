//! procgrid.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::duration::parse_duration;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration for {key}: {value:?}")]
    Duration { key: &'static str, value: String },
}

/// Top-level `procgrid.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProcgridConfig {
    pub store: StoreConfig,
    pub scheduler: SchedulerConfig,
    pub convergence: ConvergenceConfig,
    pub stats: StatsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// redb database file.
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/procgrid/procgrid.redb"),
        }
    }
}

/// Addresses of the scheduler's services.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Desired-state service (desire app, stop index).
    pub desired_state_url: String,
    /// Actual-state query service (instance stats).
    pub actual_state_url: String,
    /// Per-request timeout, e.g. "5s".
    pub request_timeout: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            desired_state_url: "http://nsync.service.cf.internal:8787".to_string(),
            actual_state_url: "http://tps.service.cf.internal:1518".to_string(),
            request_timeout: "5s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConvergenceConfig {
    /// How often undelivered desired-state updates are retried.
    pub retry_interval: String,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            retry_interval: "10s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StatsConfig {
    /// File descriptor quota reported for every instance.
    pub fds_quota: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self { fds_quota: 16384 }
    }
}

impl ProcgridConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        debug!(?path, "configuration loaded");
        Ok(config)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ProcgridConfig = toml::from_str(content)?;
        config.scheduler.request_timeout()?;
        config.convergence.retry_interval()?;
        Ok(config)
    }
}

impl SchedulerConfig {
    pub fn request_timeout(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.request_timeout).ok_or_else(|| ConfigError::Duration {
            key: "scheduler.request_timeout",
            value: self.request_timeout.clone(),
        })
    }
}

impl ConvergenceConfig {
    pub fn retry_interval(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.retry_interval).ok_or_else(|| ConfigError::Duration {
            key: "convergence.retry_interval",
            value: self.retry_interval.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = ProcgridConfig::from_toml_str("").unwrap();
        assert_eq!(config, ProcgridConfig::default());
        assert_eq!(config.stats.fds_quota, 16384);
        assert_eq!(
            config.scheduler.request_timeout().unwrap(),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = ProcgridConfig::from_toml_str(
            r#"
[scheduler]
actual_state_url = "http://127.0.0.1:1518"
request_timeout = "250ms"
"#,
        )
        .unwrap();
        assert_eq!(config.scheduler.actual_state_url, "http://127.0.0.1:1518");
        assert_eq!(
            config.scheduler.desired_state_url,
            "http://nsync.service.cf.internal:8787"
        );
        assert_eq!(
            config.scheduler.request_timeout().unwrap(),
            Duration::from_millis(250)
        );
    }

    #[test]
    fn bad_duration_is_rejected() {
        let err = ProcgridConfig::from_toml_str(
            r#"
[convergence]
retry_interval = "often"
"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Duration {
                key: "convergence.retry_interval",
                ..
            }
        ));
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("procgrid.toml");
        std::fs::write(
            &path,
            "[store]\npath = \"/tmp/pg.redb\"\n[stats]\nfds_quota = 1024\n",
        )
        .unwrap();

        let config = ProcgridConfig::from_file(&path).unwrap();
        assert_eq!(config.store.path, PathBuf::from("/tmp/pg.redb"));
        assert_eq!(config.stats.fds_quota, 1024);
    }

    #[test]
    fn from_file_missing_is_read_error() {
        let err = ProcgridConfig::from_file(Path::new("/nonexistent/procgrid.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
