//! procgrid-process: desired-state operations on processes.
//!
//! [`ProcessService`] is the entry point for scale, update, stats and
//! instance termination. Each mutation is validated first, then committed to
//! the [`StateStore`] together with its audit event and, for scheduled
//! processes, an outbox row for the [`ConvergenceNotifier`].
//!
//! # Architecture
//!
//! ```text
//! ProcessService
//!   ├── scale()      validate → commit (process + event + outbox) → Accepted
//!   ├── update()     validate → commit → one delivery attempt → Completed
//!   ├── stats()      scheduler actual state → InstanceReport × instances
//!   ├── terminate_instance()  scheduler stop index → event
//!   └── ConvergenceNotifier   drains the outbox into the scheduler
//! ```
//!
//! Scale only waits for the change to be durably queued. Update waits for
//! one delivery attempt, since a configuration change needs a redeploy
//! anyway; a failed attempt stays queued and does not fail the update.

pub mod audit;
pub mod error;
pub mod notifier;
pub mod scale;
pub mod stats;
pub mod update;

use std::sync::Arc;

use procgrid_core::StatsConfig;
use procgrid_scheduler::{
    LifecycleProtocol, ProcessGuid, SchedulerClient, StopOutcome, protocol_for_type,
};
use procgrid_state::{
    AppRecord, AuditEvent, Effects, LifecycleData, PendingSync, ProcessRecord, StateError,
    StateStore,
};
use tracing::{debug, error, info, warn};

use crate::audit::AuditedRequest;

pub use audit::{Actor, REDACTION_MARKER, redact_process};
pub use error::{ErrorKind, ProcessError, ProcessResult};
pub use notifier::{ConvergenceNotifier, Delivery, NotifierHandle, SyncSummary};
pub use scale::ScaleRequest;
pub use stats::{InstanceReport, InstanceState, Usage};
pub use update::{HealthCheckDataRequest, HealthCheckRequest, UpdateRequest};

/// How far a mutation got before the call returned.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Committed and queued for the scheduler; convergence pending.
    Accepted(ProcessRecord),
    /// Committed and handed to the scheduler (or nothing to hand over).
    Completed(ProcessRecord),
}

impl Outcome {
    pub fn process(&self) -> &ProcessRecord {
        match self {
            Outcome::Accepted(p) | Outcome::Completed(p) => p,
        }
    }

    pub fn into_process(self) -> ProcessRecord {
        match self {
            Outcome::Accepted(p) | Outcome::Completed(p) => p,
        }
    }
}

/// Fields needed to materialize a process for an app.
#[derive(Debug, Clone, Default)]
pub struct NewProcess {
    pub process_type: String,
    pub lifecycle_type: String,
    pub lifecycle: LifecycleData,
    pub command: Option<String>,
    /// Defaults to scheduled.
    pub diego: Option<bool>,
}

pub struct ProcessService<C> {
    store: StateStore,
    scheduler: Arc<C>,
    fds_quota: u64,
    notifier: Option<NotifierHandle>,
}

fn process_not_found(process_guid: &str) -> impl FnOnce(StateError) -> ProcessError + '_ {
    move |e| match e {
        StateError::NotFound(_) => ProcessError::ProcessNotFound(process_guid.to_string()),
        other => ProcessError::State(other),
    }
}

impl<C: SchedulerClient> ProcessService<C> {
    pub fn new(store: StateStore, scheduler: Arc<C>, stats: &StatsConfig) -> Self {
        Self {
            store,
            scheduler,
            fds_quota: stats.fds_quota,
            notifier: None,
        }
    }

    /// Wake this notifier after every enqueued change.
    pub fn with_notifier(mut self, handle: NotifierHandle) -> Self {
        self.notifier = Some(handle);
        self
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn scheduler(&self) -> &Arc<C> {
        &self.scheduler
    }

    // ── Lookup ─────────────────────────────────────────────────────

    pub fn get(&self, process_guid: &str) -> ProcessResult<ProcessRecord> {
        self.store
            .get_process(process_guid)?
            .ok_or_else(|| ProcessError::ProcessNotFound(process_guid.to_string()))
    }

    /// Load a process that is about to change and make sure its lifecycle
    /// type is one procgrid can run. A corrupt record is refused before
    /// anything is committed.
    fn checked(&self, process_guid: &str) -> ProcessResult<ProcessRecord> {
        let process = self.get(process_guid)?;
        if let Err(e) = LifecycleProtocol::for_process(&process) {
            error!(
                %process_guid,
                lifecycle_type = %process.lifecycle_type,
                "refusing to change process with unknown lifecycle type"
            );
            return Err(e.into());
        }
        Ok(process)
    }

    pub fn find_for_app(&self, app_guid: &str, process_type: &str) -> ProcessResult<ProcessRecord> {
        self.app(app_guid)?;
        self.store
            .find_process(app_guid, process_type)?
            .ok_or_else(|| ProcessError::ProcessNotFound(format!("{app_guid}/{process_type}")))
    }

    pub fn list(&self) -> ProcessResult<Vec<ProcessRecord>> {
        Ok(self.store.list_processes()?)
    }

    pub fn list_for_app(&self, app_guid: &str) -> ProcessResult<Vec<ProcessRecord>> {
        self.app(app_guid)?;
        Ok(self.store.list_processes_for_app(app_guid)?)
    }

    pub fn app(&self, app_guid: &str) -> ProcessResult<AppRecord> {
        self.store
            .get_app(app_guid)?
            .ok_or_else(|| ProcessError::AppNotFound(app_guid.to_string()))
    }

    pub fn list_apps(&self) -> ProcessResult<Vec<AppRecord>> {
        Ok(self.store.list_apps()?)
    }

    // ── Materialization ────────────────────────────────────────────

    pub fn create_app(
        &self,
        name: &str,
        space_guid: &str,
        organization_guid: &str,
    ) -> ProcessResult<AppRecord> {
        if name.is_empty() {
            return Err(ProcessError::validation("name", "must not be empty"));
        }
        let app = AppRecord::new(name, space_guid, organization_guid);
        self.store.put_app(&app)?;
        info!(app_guid = %app.guid, name, "app created");
        Ok(app)
    }

    pub fn create_process(&self, app_guid: &str, spec: NewProcess) -> ProcessResult<ProcessRecord> {
        if spec.process_type.is_empty() {
            return Err(ProcessError::validation("type", "must not be empty"));
        }
        // The lifecycle type is fixed for the life of the process.
        let protocol = protocol_for_type(&spec.lifecycle_type).map_err(|_| {
            ProcessError::validation(
                "lifecycle_type",
                format!(
                    "must be one of 'buildpack, docker', got '{}'",
                    spec.lifecycle_type
                ),
            )
        })?;
        let app = self.app(app_guid)?;

        let mut process = ProcessRecord::new(&app, &spec.process_type, protocol.lifecycle_type());
        process.lifecycle = spec.lifecycle;
        process.command = spec.command;
        if let Some(diego) = spec.diego {
            process.diego = diego;
        }

        self.store.create_process(&process).map_err(|e| match e {
            StateError::Conflict(message) => ProcessError::validation("type", message),
            StateError::NotFound(_) => ProcessError::AppNotFound(app_guid.to_string()),
            other => ProcessError::State(other),
        })?;
        info!(
            process_guid = %process.guid,
            %app_guid,
            process_type = %process.process_type,
            lifecycle = %protocol,
            "process created"
        );
        Ok(process)
    }

    /// Delete an app together with all of its processes.
    pub fn delete_app(&self, app_guid: &str) -> ProcessResult<()> {
        if !self.store.delete_app(app_guid)? {
            return Err(ProcessError::AppNotFound(app_guid.to_string()));
        }
        info!(%app_guid, "app deleted");
        Ok(())
    }

    // ── Scale ──────────────────────────────────────────────────────

    /// Change instance count, memory or disk.
    ///
    /// Returns once the change and its audit event are committed and, for a
    /// scheduled process, the new desired state is queued.
    pub fn scale(
        &self,
        process_guid: &str,
        actor: &Actor,
        request: &ScaleRequest,
    ) -> ProcessResult<Outcome> {
        let valid = request.validate()?;
        let recorded = request.audit_request()?;
        let process = self.checked(process_guid)?;
        let app = self.app(&process.app_guid)?;

        let updated = self
            .store
            .modify_process(process_guid, |p| {
                valid.apply(p);
                Effects {
                    event: audit::request_event(audit::EVENT_SCALE, actor, &app, p, recorded),
                    enqueue_sync: p.diego,
                }
            })
            .map_err(process_not_found(process_guid))?;

        info!(
            %process_guid,
            instances = updated.instances,
            memory_in_mb = updated.memory_in_mb,
            disk_in_mb = updated.disk_in_mb,
            "process scaled"
        );
        if updated.diego {
            if let Some(notifier) = &self.notifier {
                notifier.wake();
            }
        }
        Ok(Outcome::Accepted(updated))
    }

    // ── Update ─────────────────────────────────────────────────────

    /// Change start command, ports or health check.
    pub async fn update(
        &self,
        process_guid: &str,
        actor: &Actor,
        request: &UpdateRequest,
    ) -> ProcessResult<Outcome> {
        let valid = request.validate()?;
        let recorded = request.audit_request()?;
        let process = self.checked(process_guid)?;
        let app = self.app(&process.app_guid)?;

        let updated = self
            .store
            .modify_process(process_guid, |p| {
                valid.apply(p);
                Effects {
                    event: audit::request_event(audit::EVENT_UPDATE, actor, &app, p, recorded),
                    enqueue_sync: p.diego,
                }
            })
            .map_err(process_not_found(process_guid))?;
        info!(%process_guid, version = %updated.version, "process updated");

        if updated.diego {
            match notifier::deliver(&self.store, self.scheduler.as_ref(), process_guid).await? {
                Delivery::Failed(reason) => {
                    warn!(%process_guid, %reason, "update committed, delivery left queued");
                }
                Delivery::Parked(reason) => {
                    warn!(%process_guid, %reason, "update committed, delivery parked");
                }
                delivery => debug!(%process_guid, ?delivery, "update delivered"),
            }
        }
        Ok(Outcome::Completed(updated))
    }

    // ── Stats ──────────────────────────────────────────────────────

    /// One report per desired instance, ordered by index.
    pub async fn stats(&self, process_guid: &str) -> ProcessResult<Vec<InstanceReport>> {
        let process = self.get(process_guid)?;
        if !process.diego {
            return Ok(stats::placeholders(&process, self.fds_quota));
        }

        let scheduler_guid = ProcessGuid::for_process(&process)?;
        let actual = self
            .scheduler
            .actual_instances(&scheduler_guid)
            .await
            .map_err(|e| {
                warn!(%process_guid, error = %e, "actual state unavailable");
                ProcessError::StatsUnavailable {
                    process_guid: process_guid.to_string(),
                    reason: e.to_string(),
                }
            })?;
        debug!(%process_guid, reported = actual.len(), "actual state fetched");
        Ok(stats::aggregate(&process, actual, self.fds_quota))
    }

    // ── Terminate ──────────────────────────────────────────────────

    /// Stop one instance. An instance the scheduler no longer knows counts
    /// as stopped.
    pub async fn terminate_instance(
        &self,
        process_guid: &str,
        actor: &Actor,
        index: i64,
    ) -> ProcessResult<()> {
        let index = u32::try_from(index).map_err(|_| {
            ProcessError::validation("index", "must be a non-negative integer")
        })?;
        let process = self.get(process_guid)?;
        let app = self.app(&process.app_guid)?;

        if process.diego {
            let scheduler_guid = ProcessGuid::for_process(&process)?;
            match self.scheduler.stop_index(&scheduler_guid, index).await {
                Ok(StopOutcome::Stopped) => {
                    info!(%process_guid, index, "instance stopped");
                }
                Ok(StopOutcome::AlreadyGone) => {
                    debug!(%process_guid, index, "instance already gone");
                }
                Err(e) => {
                    warn!(%process_guid, index, error = %e, "instance stop failed");
                    return Err(ProcessError::TerminationFailed {
                        process_guid: process_guid.to_string(),
                        index,
                        reason: e.to_string(),
                    });
                }
            }
        } else {
            debug!(%process_guid, index, "process not scheduled, nothing to stop");
        }

        let event = audit::terminate_instance_event(actor, &app, &process, index);
        self.store.append_event(&event)?;
        Ok(())
    }

    // ── Events & convergence ───────────────────────────────────────

    pub fn list_events(&self) -> ProcessResult<Vec<AuditEvent>> {
        Ok(self.store.list_events()?)
    }

    pub fn events_for_actor(&self, actor_guid: &str) -> ProcessResult<Vec<AuditEvent>> {
        Ok(self.store.list_events_for_actor(actor_guid)?)
    }

    /// The lifecycle protocol governing a process.
    pub fn protocol(&self, process_guid: &str) -> ProcessResult<LifecycleProtocol> {
        let process = self.get(process_guid)?;
        Ok(LifecycleProtocol::for_process(&process)?)
    }

    /// Attempt every queued delivery once, right now.
    pub async fn sync_now(&self) -> ProcessResult<SyncSummary> {
        notifier::sync_pending(&self.store, self.scheduler.as_ref()).await
    }

    /// Queue the current desired state of a process again, clearing a
    /// parked delivery once its record has been repaired.
    pub fn requeue(&self, process_guid: &str) -> ProcessResult<PendingSync> {
        let process = self.checked(process_guid)?;
        if !process.diego {
            return Err(ProcessError::validation(
                "process_guid",
                "process is not run by the scheduler",
            ));
        }
        let pending = self
            .store
            .enqueue_sync(process_guid)
            .map_err(process_not_found(process_guid))?;
        info!(%process_guid, version = %pending.version, "desired state requeued");
        if let Some(notifier) = &self.notifier {
            notifier.wake();
        }
        Ok(pending)
    }
}
