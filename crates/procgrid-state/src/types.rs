//! Domain types for the procgrid system of record.
//!
//! These types represent the persisted desired state of apps and their
//! processes, the append-only audit log, and the convergence outbox. All
//! types are serialized to JSON for storage in redb tables.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque record identifier (a hyphenated UUID for records created here).
pub type Guid = String;

/// Default instance count for a newly materialized process.
pub const DEFAULT_INSTANCES: u32 = 1;
/// Default memory limit in MB.
pub const DEFAULT_MEMORY_MB: u32 = 1024;
/// Default disk limit in MB.
pub const DEFAULT_DISK_MB: u32 = 1024;
/// Port exposed by default on `web` processes.
pub const DEFAULT_WEB_PORT: u16 = 8080;

/// Mint a new random guid.
pub fn new_guid() -> Guid {
    Uuid::new_v4().to_string()
}

// ── App ───────────────────────────────────────────────────────────

/// The application that owns processes. Supplies the actee, space and
/// organization identities recorded on audit events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppRecord {
    pub guid: Guid,
    pub name: String,
    pub space_guid: Guid,
    pub organization_guid: Guid,
    pub created_at: DateTime<Utc>,
}

impl AppRecord {
    pub fn new(name: &str, space_guid: &str, organization_guid: &str) -> Self {
        Self {
            guid: new_guid(),
            name: name.to_string(),
            space_guid: space_guid.to_string(),
            organization_guid: organization_guid.to_string(),
            created_at: Utc::now(),
        }
    }
}

// ── Health check ──────────────────────────────────────────────────

/// How the scheduler decides an instance is healthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthCheckType {
    Port,
    Process,
    Http,
}

impl HealthCheckType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthCheckType::Port => "port",
            HealthCheckType::Process => "process",
            HealthCheckType::Http => "http",
        }
    }
}

impl fmt::Display for HealthCheckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HealthCheckType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "port" => Ok(HealthCheckType::Port),
            "process" => Ok(HealthCheckType::Process),
            "http" => Ok(HealthCheckType::Http),
            other => Err(format!("must be one of 'port, process, http', got '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthCheckData {
    /// Seconds the scheduler waits for the first healthy check.
    pub timeout: Option<u32>,
    /// HTTP path probed when the type is `http`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthCheck {
    #[serde(rename = "type")]
    pub kind: HealthCheckType,
    pub data: HealthCheckData,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            kind: HealthCheckType::Port,
            data: HealthCheckData::default(),
        }
    }
}

// ── Lifecycle ─────────────────────────────────────────────────────

/// Lifecycle type names as persisted on process records.
pub const LIFECYCLE_BUILDPACK: &str = "buildpack";
pub const LIFECYCLE_DOCKER: &str = "docker";

/// The droplet produced by buildpack staging.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DropletRef {
    pub guid: Guid,
    pub hash: String,
    /// Start command detected by the buildpack, used when the process has none.
    pub detected_start_command: Option<String>,
}

/// A container image and optional registry credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DockerImage {
    pub reference: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Lifecycle-specific metadata needed to stage and run a process.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LifecycleData {
    pub stack: Option<String>,
    #[serde(default)]
    pub buildpacks: Vec<String>,
    pub droplet: Option<DropletRef>,
    pub image: Option<DockerImage>,
}

// ── Process ───────────────────────────────────────────────────────

/// Desired state of one process type of an app.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessRecord {
    pub guid: Guid,
    pub app_guid: Guid,
    pub space_guid: Guid,
    #[serde(rename = "type")]
    pub process_type: String,
    /// `None` runs the lifecycle's default start command.
    pub command: Option<String>,
    pub instances: u32,
    pub memory_in_mb: u32,
    pub disk_in_mb: u32,
    pub ports: Vec<u16>,
    pub health_check: HealthCheck,
    /// Kept as text so that a corrupt value is detectable at dispatch time.
    pub lifecycle_type: String,
    #[serde(default)]
    pub lifecycle: LifecycleData,
    /// Changes whenever scheduler-visible desired state changes.
    pub version: String,
    /// Whether the external scheduler runs this process at all.
    pub diego: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProcessRecord {
    /// Materialize a process type for an app with stock defaults.
    pub fn new(app: &AppRecord, process_type: &str, lifecycle_type: &str) -> Self {
        let ports = if process_type == "web" {
            vec![DEFAULT_WEB_PORT]
        } else {
            Vec::new()
        };
        Self {
            guid: new_guid(),
            app_guid: app.guid.clone(),
            space_guid: app.space_guid.clone(),
            process_type: process_type.to_string(),
            command: None,
            instances: DEFAULT_INSTANCES,
            memory_in_mb: DEFAULT_MEMORY_MB,
            disk_in_mb: DEFAULT_DISK_MB,
            ports,
            health_check: HealthCheck::default(),
            lifecycle_type: lifecycle_type.to_string(),
            lifecycle: LifecycleData::default(),
            version: new_guid(),
            diego: true,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    /// Replace the version token, invalidating scheduler entries keyed by the old one.
    pub fn bump_version(&mut self) {
        self.version = new_guid();
    }

    /// Check the record-level invariants enforced on every write.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.memory_in_mb == 0 {
            return Err("memory_in_mb must be greater than 0".to_string());
        }
        if self.disk_in_mb == 0 {
            return Err("disk_in_mb must be greater than 0".to_string());
        }
        if self.ports.contains(&0) {
            return Err("ports must be positive".to_string());
        }
        let unique: HashSet<u16> = self.ports.iter().copied().collect();
        if unique.len() != self.ports.len() {
            return Err("ports must be unique".to_string());
        }
        if self.health_check.kind == HealthCheckType::Http
            && self
                .health_check
                .data
                .endpoint
                .as_deref()
                .is_none_or(str::is_empty)
        {
            return Err("http health checks require an endpoint".to_string());
        }
        if self.version.is_empty() {
            return Err("version must not be empty".to_string());
        }
        Ok(())
    }
}

// ── Audit ─────────────────────────────────────────────────────────

/// An append-only record of one mutating operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEvent {
    pub guid: Guid,
    #[serde(rename = "type")]
    pub event_type: String,
    pub actor: String,
    pub actor_type: String,
    pub actor_name: Option<String>,
    pub actee: String,
    pub actee_type: String,
    pub actee_name: String,
    pub space_guid: Guid,
    pub organization_guid: Guid,
    pub timestamp: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

impl AuditEvent {
    /// Build the composite key for the events table (time-ordered).
    pub fn table_key(&self) -> String {
        let micros = self.timestamp.timestamp_micros().max(0);
        format!("{micros:020}:{}", self.guid)
    }
}

// ── Convergence outbox ────────────────────────────────────────────

/// A desired-state update that has been committed but not yet accepted
/// by the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingSync {
    pub process_guid: Guid,
    /// Process version at the time of the commit.
    pub version: String,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default)]
    pub attempts: u32,
    /// Reason the last attempt failed permanently. Parked entries are not
    /// retried until the process is queued again.
    #[serde(default)]
    pub parked: Option<String>,
}

/// Side effects committed together with a process mutation.
#[derive(Debug, Clone)]
pub struct Effects {
    pub event: AuditEvent,
    /// Queue a desired-state update for the scheduler.
    pub enqueue_sync: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> AppRecord {
        AppRecord::new("my_app", "space-1", "org-1")
    }

    #[test]
    fn web_process_defaults() {
        let process = ProcessRecord::new(&app(), "web", LIFECYCLE_BUILDPACK);
        assert_eq!(process.instances, 1);
        assert_eq!(process.memory_in_mb, 1024);
        assert_eq!(process.disk_in_mb, 1024);
        assert_eq!(process.ports, vec![8080]);
        assert_eq!(process.health_check.kind, HealthCheckType::Port);
        assert_eq!(process.health_check.data.timeout, None);
        assert!(process.diego);
        assert!(process.updated_at.is_none());
        assert!(process.check_invariants().is_ok());
    }

    #[test]
    fn worker_process_has_no_ports() {
        let process = ProcessRecord::new(&app(), "worker", LIFECYCLE_DOCKER);
        assert!(process.ports.is_empty());
    }

    #[test]
    fn bump_version_changes_token() {
        let mut process = ProcessRecord::new(&app(), "web", LIFECYCLE_BUILDPACK);
        let before = process.version.clone();
        process.bump_version();
        assert_ne!(process.version, before);
    }

    #[test]
    fn invariants_reject_bad_records() {
        let base = ProcessRecord::new(&app(), "web", LIFECYCLE_BUILDPACK);

        let mut p = base.clone();
        p.memory_in_mb = 0;
        assert!(p.check_invariants().is_err());

        let mut p = base.clone();
        p.disk_in_mb = 0;
        assert!(p.check_invariants().is_err());

        let mut p = base.clone();
        p.ports = vec![8080, 8080];
        assert!(p.check_invariants().is_err());

        let mut p = base.clone();
        p.ports = vec![0];
        assert!(p.check_invariants().is_err());

        let mut p = base;
        p.health_check = HealthCheck {
            kind: HealthCheckType::Http,
            data: HealthCheckData {
                timeout: None,
                endpoint: Some(String::new()),
            },
        };
        assert!(p.check_invariants().is_err());
    }

    #[test]
    fn health_check_serializes_like_the_api() {
        let check = HealthCheck {
            kind: HealthCheckType::Process,
            data: HealthCheckData {
                timeout: Some(20),
                endpoint: None,
            },
        };
        let json = serde_json::to_value(&check).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "process", "data": {"timeout": 20}})
        );
    }

    #[test]
    fn health_check_type_parsing() {
        assert_eq!("http".parse::<HealthCheckType>(), Ok(HealthCheckType::Http));
        assert!("tcp".parse::<HealthCheckType>().is_err());
    }

    #[test]
    fn event_keys_sort_by_time() {
        let mut first = AuditEvent {
            guid: "b".to_string(),
            event_type: "audit.app.process.scale".to_string(),
            actor: "user-1".to_string(),
            actor_type: "user".to_string(),
            actor_name: None,
            actee: "app-1".to_string(),
            actee_type: "v3-app".to_string(),
            actee_name: "my_app".to_string(),
            space_guid: "space-1".to_string(),
            organization_guid: "org-1".to_string(),
            timestamp: Utc::now(),
            metadata: serde_json::Value::Null,
        };
        let mut second = first.clone();
        second.guid = "a".to_string();
        second.timestamp = first.timestamp + chrono::Duration::milliseconds(1);
        assert!(first.table_key() < second.table_key());

        first.timestamp = second.timestamp;
        assert!(second.table_key() < first.table_key());
    }
}
