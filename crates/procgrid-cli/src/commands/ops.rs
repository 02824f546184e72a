use procgrid_process::notifier::{self, Delivery};
use procgrid_process::{Actor, InstanceReport, Outcome, ScaleRequest, UpdateRequest};
use tracing::warn;

use super::{Context, print_json, print_process};

pub async fn scale(
    ctx: &Context,
    actor: &Actor,
    process_guid: &str,
    request: &ScaleRequest,
) -> anyhow::Result<()> {
    let outcome = ctx.service.scale(process_guid, actor, request)?;
    print_process(outcome.process())?;

    // No notifier runs inside a one-shot command; hand the queued change
    // over once before exiting. `procgrid sync` retries whatever is left.
    if let Outcome::Accepted(process) = &outcome {
        if process.diego {
            let store = ctx.service.store();
            let scheduler = ctx.service.scheduler().as_ref();
            match notifier::deliver(store, scheduler, process_guid).await {
                Ok(Delivery::Failed(reason)) => {
                    warn!(%process_guid, %reason, "scale accepted, convergence pending");
                    eprintln!("Scale accepted; delivery to the scheduler is queued ({reason}).");
                }
                Ok(Delivery::Parked(reason)) => {
                    eprintln!("Scale accepted; the scheduler cannot run this process yet ({reason}).");
                }
                Ok(_) => eprintln!("Scale accepted."),
                Err(e) => warn!(%process_guid, error = %e, "could not attempt delivery"),
            }
        }
    }
    Ok(())
}

pub async fn update(
    ctx: &Context,
    actor: &Actor,
    process_guid: &str,
    request: &UpdateRequest,
) -> anyhow::Result<()> {
    let outcome = ctx.service.update(process_guid, actor, request).await?;
    print_process(outcome.process())
}

pub async fn stats(ctx: &Context, process_guid: &str, format: &str) -> anyhow::Result<()> {
    let reports = ctx.service.stats(process_guid).await?;
    match format {
        "json" => print_json(&reports),
        _ => {
            print_reports(&reports);
            Ok(())
        }
    }
}

fn print_reports(reports: &[InstanceReport]) {
    if reports.is_empty() {
        println!("No instances desired.");
        return;
    }
    println!(
        "{:>5} {:<9} {:<22} {:>7} {:>12} {:>12}",
        "INDEX", "STATE", "ADDRESS", "CPU", "MEM", "DISK"
    );
    for r in reports {
        let address = match (&r.host, r.port) {
            (Some(host), Some(port)) if !host.is_empty() => format!("{host}:{port}"),
            _ => "-".to_string(),
        };
        let (cpu, mem, disk) = match &r.usage {
            Some(u) => (
                format!("{:.1}%", u.cpu * 100.0),
                format!("{}/{}", u.mem, r.mem_quota),
                format!("{}/{}", u.disk, r.disk_quota),
            ),
            None => ("-".to_string(), "-".to_string(), "-".to_string()),
        };
        println!(
            "{:>5} {:<9} {:<22} {:>7} {:>12} {:>12}",
            r.index, r.state, address, cpu, mem, disk
        );
    }
}

pub async fn terminate(
    ctx: &Context,
    actor: &Actor,
    process_guid: &str,
    index: i64,
) -> anyhow::Result<()> {
    ctx.service
        .terminate_instance(process_guid, actor, index)
        .await?;
    println!("Terminated instance {index} of {process_guid}.");
    Ok(())
}

pub fn events(ctx: &Context, actor_guid: Option<&str>) -> anyhow::Result<()> {
    let events = match actor_guid {
        Some(actor_guid) => ctx.service.events_for_actor(actor_guid)?,
        None => ctx.service.list_events()?,
    };
    print_json(&events)
}
