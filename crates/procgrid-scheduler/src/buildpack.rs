//! Buildpack dialect: run a droplet produced by buildpack staging.

use procgrid_state::ProcessRecord;

use crate::error::{SchedulerError, SchedulerResult};
use crate::guid::ProcessGuid;
use crate::payload::{DesiredLifecycle, StagingLifecycle};
use crate::protocol::desired_lrp;
use crate::{DesiredLrp, StagingRequest};

pub(crate) fn desired_state(process: &ProcessRecord) -> SchedulerResult<DesiredLrp> {
    let process_guid = ProcessGuid::for_process(process)?;
    let Some(droplet) = &process.lifecycle.droplet else {
        return Err(SchedulerError::IncompleteLifecycle {
            process_guid: process.guid.clone(),
            reason: "buildpack process has no staged droplet".to_string(),
        });
    };

    // An explicit command wins over whatever the buildpack detected.
    let start_command = process
        .command
        .clone()
        .or_else(|| droplet.detected_start_command.clone());

    let lifecycle = DesiredLifecycle::Buildpack {
        droplet_guid: droplet.guid.clone(),
        droplet_hash: droplet.hash.clone(),
        stack: process.lifecycle.stack.clone(),
    };
    Ok(desired_lrp(process, &process_guid, start_command, lifecycle))
}

pub(crate) fn staging_request(process: &ProcessRecord) -> SchedulerResult<StagingRequest> {
    if process.lifecycle.image.is_some() {
        return Err(SchedulerError::InvalidStaging(format!(
            "process {} is a buildpack process but carries image data",
            process.guid
        )));
    }
    Ok(StagingRequest {
        app_guid: process.app_guid.clone(),
        process_type: process.process_type.clone(),
        memory_mb: process.memory_in_mb,
        disk_mb: process.disk_in_mb,
        lifecycle: StagingLifecycle::Buildpack {
            stack: process.lifecycle.stack.clone(),
            buildpacks: process.lifecycle.buildpacks.clone(),
        },
    })
}
