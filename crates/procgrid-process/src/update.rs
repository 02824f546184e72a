//! Configuration updates: start command, ports and health check.

use std::collections::HashSet;

use procgrid_state::{HealthCheck, HealthCheckData, HealthCheckType, ProcessRecord};
use serde::{Deserialize, Serialize};

use crate::audit::AuditedRequest;
use crate::error::{ProcessError, ProcessResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UpdateRequest {
    /// Start command. Never recorded in cleartext.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheckRequest>,
}

impl AuditedRequest for UpdateRequest {
    const CLEARTEXT: &'static [&'static str] = &["ports", "health_check"];
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HealthCheckRequest {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<HealthCheckDataRequest>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HealthCheckDataRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// An update request that passed validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidUpdate {
    pub command: Option<String>,
    pub ports: Option<Vec<u16>>,
    pub health_check: Option<HealthCheck>,
}

impl UpdateRequest {
    pub fn validate(&self) -> ProcessResult<ValidUpdate> {
        let ports = self.ports.as_deref().map(validate_ports).transpose()?;
        let health_check = self
            .health_check
            .as_ref()
            .map(HealthCheckRequest::validate)
            .transpose()?;
        Ok(ValidUpdate {
            command: self.command.clone(),
            ports,
            health_check,
        })
    }
}

fn validate_ports(ports: &[i64]) -> ProcessResult<Vec<u16>> {
    let mut seen = HashSet::new();
    let mut valid = Vec::with_capacity(ports.len());
    for &port in ports {
        let port = u16::try_from(port)
            .ok()
            .filter(|p| *p > 0)
            .ok_or_else(|| {
                ProcessError::validation("ports", format!("{port} is not a valid port number"))
            })?;
        if !seen.insert(port) {
            return Err(ProcessError::validation(
                "ports",
                format!("{port} is listed more than once"),
            ));
        }
        valid.push(port);
    }
    Ok(valid)
}

impl HealthCheckRequest {
    fn validate(&self) -> ProcessResult<HealthCheck> {
        let kind = self
            .kind
            .as_deref()
            .ok_or_else(|| ProcessError::validation("health_check.type", "must be provided"))?
            .parse::<HealthCheckType>()
            .map_err(|message| ProcessError::validation("health_check.type", message))?;

        let data = self.data.clone().unwrap_or_default();
        let timeout = data
            .timeout
            .map(|t| {
                u32::try_from(t).map_err(|_| {
                    ProcessError::validation(
                        "health_check.data.timeout",
                        "must be greater than or equal to 0",
                    )
                })
            })
            .transpose()?;

        let endpoint = match (kind, data.endpoint) {
            (HealthCheckType::Http, Some(endpoint)) if !endpoint.is_empty() => Some(endpoint),
            (HealthCheckType::Http, _) => {
                return Err(ProcessError::validation(
                    "health_check.data.endpoint",
                    "is required for http health checks",
                ));
            }
            (_, Some(_)) => {
                return Err(ProcessError::validation(
                    "health_check.data.endpoint",
                    "is only valid for http health checks",
                ));
            }
            (_, None) => None,
        };

        Ok(HealthCheck {
            kind,
            data: HealthCheckData { timeout, endpoint },
        })
    }
}

impl ValidUpdate {
    /// Apply to a process. Returns true if anything changed, in which case
    /// the version was bumped.
    pub(crate) fn apply(&self, process: &mut ProcessRecord) -> bool {
        let mut changed = false;
        if let Some(command) = &self.command {
            changed |= process.command.as_ref() != Some(command);
            process.command = Some(command.clone());
        }
        if let Some(ports) = &self.ports {
            changed |= &process.ports != ports;
            process.ports = ports.clone();
        }
        if let Some(health_check) = &self.health_check {
            changed |= &process.health_check != health_check;
            process.health_check = health_check.clone();
        }
        if changed {
            process.bump_version();
        }
        changed
    }
}
