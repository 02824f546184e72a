//! Instance report aggregation.
//!
//! Turns whatever the scheduler reports for a process into exactly
//! `instances` reports ordered by index. Missing indices become DOWN
//! placeholders; quotas always come from the process's own limits.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use procgrid_scheduler::ActualInstance;
use procgrid_state::ProcessRecord;
use serde::{Deserialize, Serialize};

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InstanceState {
    Running,
    Starting,
    Crashed,
    Down,
    Unknown,
}

impl InstanceState {
    /// Map the scheduler's state vocabulary onto ours.
    pub fn from_scheduler(state: &str) -> Self {
        match state.to_ascii_uppercase().as_str() {
            "RUNNING" => InstanceState::Running,
            "STARTING" | "CLAIMED" | "UNCLAIMED" => InstanceState::Starting,
            "CRASHED" => InstanceState::Crashed,
            "DOWN" => InstanceState::Down,
            _ => InstanceState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceState::Running => "RUNNING",
            InstanceState::Starting => "STARTING",
            InstanceState::Crashed => "CRASHED",
            InstanceState::Down => "DOWN",
            InstanceState::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Usage {
    pub time: DateTime<Utc>,
    pub cpu: f64,
    pub mem: u64,
    pub disk: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceReport {
    #[serde(rename = "type")]
    pub process_type: String,
    pub index: u32,
    pub state: InstanceState,
    pub usage: Option<Usage>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub uptime: Option<u64>,
    /// Epoch seconds of the last state change.
    pub since: Option<i64>,
    pub mem_quota: u64,
    pub disk_quota: u64,
    pub fds_quota: u64,
}

impl InstanceReport {
    fn down(process: &ProcessRecord, index: u32, fds_quota: u64) -> Self {
        Self {
            process_type: process.process_type.clone(),
            index,
            state: InstanceState::Down,
            usage: None,
            host: None,
            port: None,
            uptime: None,
            since: None,
            mem_quota: u64::from(process.memory_in_mb) * MIB,
            disk_quota: u64::from(process.disk_in_mb) * MIB,
            fds_quota,
        }
    }

    fn reported(process: &ProcessRecord, actual: ActualInstance, fds_quota: u64) -> Self {
        Self {
            state: InstanceState::from_scheduler(&actual.state),
            usage: actual.stats.map(|s| Usage {
                time: s.time,
                cpu: s.cpu,
                mem: s.mem,
                disk: s.disk,
            }),
            host: Some(actual.host),
            port: Some(actual.port),
            uptime: Some(actual.uptime),
            since: Some(actual.since),
            ..Self::down(process, actual.index, fds_quota)
        }
    }
}

/// Reports for a process the scheduler does not run.
pub fn placeholders(process: &ProcessRecord, fds_quota: u64) -> Vec<InstanceReport> {
    (0..process.instances)
        .map(|index| InstanceReport::down(process, index, fds_quota))
        .collect()
}

/// Merge scheduler records into one report per desired index.
///
/// Records outside `[0, instances)` are dropped; for a repeated index the
/// first record wins.
pub fn aggregate(
    process: &ProcessRecord,
    actual: Vec<ActualInstance>,
    fds_quota: u64,
) -> Vec<InstanceReport> {
    let mut by_index = BTreeMap::new();
    for instance in actual {
        if instance.index < process.instances {
            by_index.entry(instance.index).or_insert(instance);
        }
    }
    (0..process.instances)
        .map(|index| match by_index.remove(&index) {
            Some(instance) => InstanceReport::reported(process, instance, fds_quota),
            None => InstanceReport::down(process, index, fds_quota),
        })
        .collect()
}
