//! Convergence notifier.
//!
//! Mutations that change scheduler-visible state leave a row in the store's
//! outbox, committed with the mutation itself. The notifier delivers those
//! rows to the scheduler's desired-state service and removes a row only
//! when the version it delivered is still the queued one, so a newer change
//! committed mid-delivery is never lost. Delivery is at-least-once; the
//! scheduler treats repeated documents idempotently.
//!
//! ```text
//! StateStore.pending_sync ──► ConvergenceNotifier::run
//!                               ├── wake (NotifierHandle)
//!                               ├── retry interval tick
//!                               └── shutdown (watch)
//! ```

use std::sync::Arc;
use std::time::Duration;

use procgrid_scheduler::{LifecycleProtocol, SchedulerClient};
use procgrid_state::{PendingSync, StateStore};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::error::ProcessResult;

/// Result of one delivery attempt for one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The scheduler accepted the desired state and the row was removed.
    Delivered,
    /// Accepted, but a newer version was queued meanwhile and stays queued.
    Superseded,
    /// Nothing to deliver: the process is gone or no longer scheduled.
    Dropped,
    NothingPending,
    /// The attempt failed; the row stays queued for the next retry.
    Failed(String),
    /// The attempt failed for a reason retrying cannot fix. The row is kept
    /// but skipped until the process is queued again.
    Parked(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub delivered: usize,
    pub failed: usize,
    pub dropped: usize,
    pub parked: usize,
}

/// Attempt to deliver the queued desired state of one process.
pub async fn deliver<C: SchedulerClient>(
    store: &StateStore,
    scheduler: &C,
    process_guid: &str,
) -> ProcessResult<Delivery> {
    match store.get_pending_sync(process_guid)? {
        Some(PendingSync {
            parked: Some(reason),
            ..
        }) => Ok(Delivery::Parked(reason)),
        Some(pending) => deliver_pending(store, scheduler, &pending).await,
        None => Ok(Delivery::NothingPending),
    }
}

async fn deliver_pending<C: SchedulerClient>(
    store: &StateStore,
    scheduler: &C,
    pending: &PendingSync,
) -> ProcessResult<Delivery> {
    let process_guid = pending.process_guid.as_str();
    let process = match store.get_process(process_guid)? {
        Some(process) if process.diego => process,
        _ => {
            store.discard_sync(process_guid)?;
            debug!(%process_guid, "dropped outbox entry for unscheduled process");
            return Ok(Delivery::Dropped);
        }
    };

    // No store transaction is open past this point.
    let desired = LifecycleProtocol::for_process(&process)
        .and_then(|protocol| protocol.build_desired_state_payload(&process));
    let result = match desired {
        Ok(desired) => scheduler.desire_app(&desired).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => {
            if store.ack_sync(process_guid, &pending.version)? {
                info!(%process_guid, version = %pending.version, "desired state delivered");
                Ok(Delivery::Delivered)
            } else {
                debug!(%process_guid, "delivered version superseded while in flight");
                Ok(Delivery::Superseded)
            }
        }
        Err(e) if e.is_transient() => {
            store.record_sync_attempt(process_guid, &pending.version)?;
            warn!(
                %process_guid,
                attempts = pending.attempts + 1,
                error = %e,
                "desired state delivery failed"
            );
            Ok(Delivery::Failed(e.to_string()))
        }
        Err(e) => {
            let reason = e.to_string();
            store.park_sync(process_guid, &pending.version, &reason)?;
            error!(
                %process_guid,
                version = %pending.version,
                error = %e,
                "desired state cannot be delivered, parked until requeued"
            );
            Ok(Delivery::Parked(reason))
        }
    }
}

/// Attempt every queued delivery once, oldest first. Parked entries are
/// skipped.
pub async fn sync_pending<C: SchedulerClient>(
    store: &StateStore,
    scheduler: &C,
) -> ProcessResult<SyncSummary> {
    let mut summary = SyncSummary::default();
    for pending in store.list_pending_sync()? {
        if pending.parked.is_some() {
            continue;
        }
        match deliver_pending(store, scheduler, &pending).await? {
            Delivery::Delivered | Delivery::Superseded => summary.delivered += 1,
            Delivery::Failed(_) => summary.failed += 1,
            Delivery::Dropped => summary.dropped += 1,
            Delivery::Parked(_) => summary.parked += 1,
            Delivery::NothingPending => {}
        }
    }
    if summary != SyncSummary::default() {
        debug!(
            delivered = summary.delivered,
            failed = summary.failed,
            dropped = summary.dropped,
            parked = summary.parked,
            "outbox pass complete"
        );
    }
    Ok(summary)
}

/// Wakes a running [`ConvergenceNotifier`].
#[derive(Debug, Clone)]
pub struct NotifierHandle {
    wake: mpsc::Sender<()>,
}

impl NotifierHandle {
    /// Request an outbox pass. Coalesces with a pass already requested.
    pub fn wake(&self) {
        let _ = self.wake.try_send(());
    }
}

/// Background task draining the convergence outbox.
pub struct ConvergenceNotifier<C> {
    store: StateStore,
    scheduler: Arc<C>,
    retry_interval: Duration,
    wake_tx: mpsc::Sender<()>,
    wake_rx: mpsc::Receiver<()>,
}

impl<C: SchedulerClient> ConvergenceNotifier<C> {
    pub fn new(store: StateStore, scheduler: Arc<C>, retry_interval: Duration) -> Self {
        let (wake_tx, wake_rx) = mpsc::channel(1);
        Self {
            store,
            scheduler,
            retry_interval,
            wake_tx,
            wake_rx,
        }
    }

    pub fn handle(&self) -> NotifierHandle {
        NotifierHandle {
            wake: self.wake_tx.clone(),
        }
    }

    async fn pass(&self) {
        if let Err(e) = sync_pending(&self.store, self.scheduler.as_ref()).await {
            error!(error = %e, "convergence pass failed");
        }
    }

    /// Run until `shutdown` changes.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            retry_interval_ms = self.retry_interval.as_millis() as u64,
            "convergence notifier started"
        );

        self.pass().await;
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.retry_interval) => {}
                _ = self.wake_rx.recv() => {}
                _ = shutdown.changed() => {
                    info!("convergence notifier shutting down");
                    break;
                }
            }
            self.pass().await;
        }
    }
}
