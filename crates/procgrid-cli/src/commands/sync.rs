use procgrid_process::ConvergenceNotifier;
use tokio::sync::watch;
use tracing::info;

use super::Context;

pub async fn run(ctx: Context, once: bool, requeue: &[String]) -> anyhow::Result<()> {
    let Context { config, service } = ctx;

    if once {
        for process_guid in requeue {
            service.requeue(process_guid)?;
        }
        let summary = service.sync_now().await?;
        println!(
            "delivered: {}, failed: {}, dropped: {}, parked: {}",
            summary.delivered, summary.failed, summary.dropped, summary.parked
        );
        return Ok(());
    }

    let retry_interval = config.convergence.retry_interval()?;
    let notifier = ConvergenceNotifier::new(
        service.store().clone(),
        service.scheduler().clone(),
        retry_interval,
    );
    let service = service.with_notifier(notifier.handle());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(notifier.run(shutdown_rx));

    // Requeued entries are picked up by the running notifier right away.
    for process_guid in requeue {
        service.requeue(process_guid)?;
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    handle.await?;

    info!("procgrid sync stopped");
    Ok(())
}
