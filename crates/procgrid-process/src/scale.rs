//! Scale requests: instance count, memory and disk.

use procgrid_state::ProcessRecord;
use serde::{Deserialize, Serialize};

use crate::audit::AuditedRequest;
use crate::error::{ProcessError, ProcessResult};

/// Requested capacity changes. Only supplied fields change.
///
/// Values are signed so that out-of-range input reaches validation instead
/// of failing to parse.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScaleRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instances: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_in_mb: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_in_mb: Option<i64>,
}

impl AuditedRequest for ScaleRequest {
    const CLEARTEXT: &'static [&'static str] = &["instances", "memory_in_mb", "disk_in_mb"];

    /// Scale values are recorded as strings.
    fn audit_request(&self) -> ProcessResult<serde_json::Value> {
        let mut request = serde_json::Map::new();
        let fields = [
            ("instances", self.instances),
            ("memory_in_mb", self.memory_in_mb),
            ("disk_in_mb", self.disk_in_mb),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                request.insert(key.to_string(), serde_json::Value::String(value.to_string()));
            }
        }
        Ok(serde_json::Value::Object(request))
    }
}

/// A scale request that passed validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidScale {
    pub instances: Option<u32>,
    pub memory_in_mb: Option<u32>,
    pub disk_in_mb: Option<u32>,
}

fn bounded(field: &str, value: i64, min: i64) -> ProcessResult<u32> {
    if value < min {
        return Err(ProcessError::validation(
            field,
            format!("must be greater than or equal to {min}"),
        ));
    }
    u32::try_from(value).map_err(|_| {
        ProcessError::validation(field, format!("must be less than or equal to {}", u32::MAX))
    })
}

impl ScaleRequest {
    pub fn validate(&self) -> ProcessResult<ValidScale> {
        Ok(ValidScale {
            instances: self
                .instances
                .map(|v| bounded("instances", v, 0))
                .transpose()?,
            memory_in_mb: self
                .memory_in_mb
                .map(|v| bounded("memory_in_mb", v, 1))
                .transpose()?,
            disk_in_mb: self
                .disk_in_mb
                .map(|v| bounded("disk_in_mb", v, 1))
                .transpose()?,
        })
    }
}

impl ValidScale {
    /// Apply to a process. Returns true if the version was bumped.
    ///
    /// Resource limits are part of the scheduler's identity for a process
    /// version; the instance count is not.
    pub(crate) fn apply(&self, process: &mut ProcessRecord) -> bool {
        if let Some(instances) = self.instances {
            process.instances = instances;
        }
        let mut resized = false;
        if let Some(memory) = self.memory_in_mb {
            resized |= process.memory_in_mb != memory;
            process.memory_in_mb = memory;
        }
        if let Some(disk) = self.disk_in_mb {
            resized |= process.disk_in_mb != disk;
            process.disk_in_mb = disk;
        }
        if resized {
            process.bump_version();
        }
        resized
    }
}
