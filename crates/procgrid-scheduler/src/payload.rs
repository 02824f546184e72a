//! Wire types exchanged with the scheduler.

use chrono::{DateTime, Utc};
use procgrid_state::{HealthCheck, HealthCheckType};
use serde::{Deserialize, Serialize};

// ── Desired state ─────────────────────────────────────────────────

/// Desired-state document for one process version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DesiredLrp {
    pub process_guid: String,
    pub instances: u32,
    pub memory_mb: u32,
    pub disk_mb: u32,
    pub ports: Vec<u16>,
    /// `None` runs the lifecycle's default (image entrypoint).
    pub start_command: Option<String>,
    pub health_check: DesiredHealthCheck,
    pub lifecycle: DesiredLifecycle,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DesiredHealthCheck {
    #[serde(rename = "type")]
    pub kind: HealthCheckType,
    pub timeout_in_seconds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl From<&HealthCheck> for DesiredHealthCheck {
    fn from(check: &HealthCheck) -> Self {
        Self {
            kind: check.kind,
            timeout_in_seconds: check.data.timeout,
            endpoint: check.data.endpoint.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DesiredLifecycle {
    Buildpack {
        droplet_guid: String,
        droplet_hash: String,
        stack: Option<String>,
    },
    Docker {
        image: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        credentials: Option<RegistryCredentials>,
    },
}

#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistryCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for RegistryCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

// ── Staging ───────────────────────────────────────────────────────

/// Request to stage an app's package into something runnable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StagingRequest {
    pub app_guid: String,
    pub process_type: String,
    pub memory_mb: u32,
    pub disk_mb: u32,
    pub lifecycle: StagingLifecycle,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StagingLifecycle {
    Buildpack {
        stack: Option<String>,
        buildpacks: Vec<String>,
    },
    Docker {
        image: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        credentials: Option<RegistryCredentials>,
    },
}

// ── Actual state ──────────────────────────────────────────────────

/// One instance record as reported by the actual-state service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActualInstance {
    pub process_guid: String,
    #[serde(default)]
    pub instance_guid: String,
    pub index: u32,
    /// Scheduler vocabulary, e.g. "RUNNING" or "CLAIMED".
    pub state: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub uptime: u64,
    /// Epoch seconds of the last state change.
    #[serde(default)]
    pub since: i64,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub stats: Option<InstanceUsage>,
}

/// Point-in-time resource usage of an instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceUsage {
    pub time: DateTime<Utc>,
    pub cpu: f64,
    pub mem: u64,
    pub disk: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actual_instance_tolerates_sparse_records() {
        let json = r#"{"process_guid": "pg", "index": 2, "state": "CRASHED"}"#;
        let instance: ActualInstance = serde_json::from_str(json).unwrap();
        assert_eq!(instance.index, 2);
        assert_eq!(instance.host, "");
        assert!(instance.stats.is_none());
    }

    #[test]
    fn actual_instance_decodes_full_record() {
        let json = r#"{
            "process_guid": "pg",
            "instance_guid": "ig",
            "index": 0,
            "state": "RUNNING",
            "details": null,
            "uptime": 12,
            "since": 1700000000,
            "host": "10.0.0.4",
            "port": 61000,
            "stats": {"time": "2024-01-02T03:04:05Z", "cpu": 0.25, "mem": 1048576, "disk": 2097152}
        }"#;
        let instance: ActualInstance = serde_json::from_str(json).unwrap();
        let usage = instance.stats.unwrap();
        assert_eq!(usage.mem, 1048576);
        assert_eq!(instance.port, 61000);
    }

    #[test]
    fn lifecycle_is_tagged() {
        let lifecycle = DesiredLifecycle::Docker {
            image: "nginx:latest".to_string(),
            credentials: None,
        };
        assert_eq!(
            serde_json::to_value(&lifecycle).unwrap(),
            serde_json::json!({"type": "docker", "image": "nginx:latest"})
        );
    }

    #[test]
    fn credentials_debug_hides_password() {
        let creds = RegistryCredentials {
            username: "bob".to_string(),
            password: "hunter2".to_string(),
        };
        assert!(!format!("{creds:?}").contains("hunter2"));
    }
}
