use procgrid_process::NewProcess;
use procgrid_state::{DockerImage, DropletRef, LifecycleData};

use super::{Context, print_process};

/// Assemble lifecycle data from CLI flags.
pub fn lifecycle_data(
    stack: Option<String>,
    buildpacks: Vec<String>,
    droplet: Option<(String, String, Option<String>)>,
    image: Option<(String, Option<String>, Option<String>)>,
) -> LifecycleData {
    LifecycleData {
        stack,
        buildpacks,
        droplet: droplet.map(|(guid, hash, detected_start_command)| DropletRef {
            guid,
            hash,
            detected_start_command,
        }),
        image: image.map(|(reference, username, password)| DockerImage {
            reference,
            username,
            password,
        }),
    }
}

pub fn create(ctx: &Context, app_guid: &str, spec: NewProcess) -> anyhow::Result<()> {
    let process = ctx.service.create_process(app_guid, spec)?;
    print_process(&process)
}

pub fn list(ctx: &Context, app_guid: Option<&str>) -> anyhow::Result<()> {
    let processes = match app_guid {
        Some(app_guid) => ctx.service.list_for_app(app_guid)?,
        None => ctx.service.list()?,
    };
    if processes.is_empty() {
        println!("No processes.");
        return Ok(());
    }
    println!(
        "{:<38} {:<10} {:<10} {:>9} {:>7} {:>7}",
        "GUID", "TYPE", "LIFECYCLE", "INSTANCES", "MEM", "DISK"
    );
    for p in processes {
        println!(
            "{:<38} {:<10} {:<10} {:>9} {:>7} {:>7}",
            p.guid, p.process_type, p.lifecycle_type, p.instances, p.memory_in_mb, p.disk_in_mb
        );
    }
    Ok(())
}

pub fn show(ctx: &Context, process_guid: &str) -> anyhow::Result<()> {
    let process = ctx.service.get(process_guid)?;
    print_process(&process)
}
