//! Lifecycle protocol registry.
//!
//! Every process is either staged by buildpacks and run as a droplet, or
//! run straight from a container image. The lifecycle type stored on the
//! record is resolved to a [`LifecycleProtocol`] exactly once, here; each
//! variant's payload construction lives in its own module.

use std::fmt;

use procgrid_state::{LIFECYCLE_BUILDPACK, LIFECYCLE_DOCKER, ProcessRecord};
use tracing::debug;

use crate::error::{SchedulerError, SchedulerResult};
use crate::guid::ProcessGuid;
use crate::payload::{DesiredHealthCheck, DesiredLifecycle};
use crate::{DesiredLrp, StagingRequest, buildpack, docker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleProtocol {
    Buildpack,
    Docker,
}

/// Resolve a persisted lifecycle type to its protocol.
pub fn protocol_for_type(lifecycle_type: &str) -> SchedulerResult<LifecycleProtocol> {
    match lifecycle_type {
        LIFECYCLE_BUILDPACK => Ok(LifecycleProtocol::Buildpack),
        LIFECYCLE_DOCKER => Ok(LifecycleProtocol::Docker),
        other => Err(SchedulerError::UnknownLifecycleType(other.to_string())),
    }
}

impl LifecycleProtocol {
    pub fn for_process(process: &ProcessRecord) -> SchedulerResult<Self> {
        protocol_for_type(&process.lifecycle_type)
    }

    pub fn lifecycle_type(&self) -> &'static str {
        match self {
            LifecycleProtocol::Buildpack => LIFECYCLE_BUILDPACK,
            LifecycleProtocol::Docker => LIFECYCLE_DOCKER,
        }
    }

    /// Desired-state document for the process at its current version.
    pub fn build_desired_state_payload(&self, process: &ProcessRecord) -> SchedulerResult<DesiredLrp> {
        let desired = match self {
            LifecycleProtocol::Buildpack => buildpack::desired_state(process)?,
            LifecycleProtocol::Docker => docker::desired_state(process)?,
        };
        debug!(
            process_guid = %desired.process_guid,
            protocol = %self,
            instances = desired.instances,
            "built desired state"
        );
        Ok(desired)
    }

    pub fn build_staging_payload(&self, process: &ProcessRecord) -> SchedulerResult<StagingRequest> {
        match self {
            LifecycleProtocol::Buildpack => buildpack::staging_request(process),
            LifecycleProtocol::Docker => docker::staging_request(process),
        }
    }
}

impl fmt::Display for LifecycleProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.lifecycle_type())
    }
}

/// Fields shared by both dialects.
pub(crate) fn desired_lrp(
    process: &ProcessRecord,
    process_guid: &ProcessGuid,
    start_command: Option<String>,
    lifecycle: DesiredLifecycle,
) -> DesiredLrp {
    DesiredLrp {
        process_guid: process_guid.to_string(),
        instances: process.instances,
        memory_mb: process.memory_in_mb,
        disk_mb: process.disk_in_mb,
        ports: process.ports.clone(),
        start_command,
        health_check: DesiredHealthCheck::from(&process.health_check),
        lifecycle,
    }
}
