//! Docker dialect: run a container image directly.

use procgrid_state::{DockerImage, ProcessRecord};

use crate::error::{SchedulerError, SchedulerResult};
use crate::guid::ProcessGuid;
use crate::payload::{DesiredLifecycle, RegistryCredentials, StagingLifecycle};
use crate::protocol::desired_lrp;
use crate::{DesiredLrp, StagingRequest};

fn image(process: &ProcessRecord) -> SchedulerResult<&DockerImage> {
    process
        .lifecycle
        .image
        .as_ref()
        .filter(|image| !image.reference.is_empty())
        .ok_or_else(|| SchedulerError::IncompleteLifecycle {
            process_guid: process.guid.clone(),
            reason: "docker process has no image".to_string(),
        })
}

/// Credentials are only sent when both halves are present.
fn credentials(image: &DockerImage) -> Option<RegistryCredentials> {
    match (&image.username, &image.password) {
        (Some(username), Some(password)) => Some(RegistryCredentials {
            username: username.clone(),
            password: password.clone(),
        }),
        _ => None,
    }
}

pub(crate) fn desired_state(process: &ProcessRecord) -> SchedulerResult<DesiredLrp> {
    let process_guid = ProcessGuid::for_process(process)?;
    let image = image(process)?;
    let lifecycle = DesiredLifecycle::Docker {
        image: image.reference.clone(),
        credentials: credentials(image),
    };
    Ok(desired_lrp(
        process,
        &process_guid,
        process.command.clone(),
        lifecycle,
    ))
}

pub(crate) fn staging_request(process: &ProcessRecord) -> SchedulerResult<StagingRequest> {
    let image = image(process)?;
    Ok(StagingRequest {
        app_guid: process.app_guid.clone(),
        process_type: process.process_type.clone(),
        memory_mb: process.memory_in_mb,
        disk_mb: process.disk_in_mb,
        lifecycle: StagingLifecycle::Docker {
            image: image.reference.clone(),
            credentials: credentials(image),
        },
    })
}
