//! Shared fixtures: an in-memory scheduler and seeded services.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use procgrid_core::StatsConfig;
use procgrid_process::{Actor, NewProcess, ProcessService};
use procgrid_scheduler::*;
use procgrid_state::*;

#[derive(Default)]
pub struct FakeState {
    pub desired: Vec<DesiredLrp>,
    /// Actual instances keyed by encoded process guid.
    pub actual: HashMap<String, Vec<ActualInstance>>,
    pub stopped: HashSet<(String, u32)>,
    pub stop_calls: usize,
    pub stats_calls: usize,
    pub fail_desire: bool,
    pub fail_stats: bool,
    pub fail_stop: bool,
}

/// Scheduler double that records every call.
#[derive(Clone, Default)]
pub struct FakeScheduler {
    pub state: Arc<Mutex<FakeState>>,
}

impl FakeScheduler {
    pub fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn desired(&self) -> Vec<DesiredLrp> {
        self.with(|s| s.desired.clone())
    }
}

fn unavailable(path: &str) -> SchedulerError {
    SchedulerError::Status {
        url: format!("http://fake{path}"),
        status: 503,
    }
}

impl SchedulerClient for FakeScheduler {
    async fn desire_app(&self, desired: &DesiredLrp) -> SchedulerResult<()> {
        self.with(|s| {
            if s.fail_desire {
                return Err(unavailable("/v1/apps"));
            }
            s.desired.push(desired.clone());
            Ok(())
        })
    }

    async fn actual_instances(&self, process_guid: &ProcessGuid) -> SchedulerResult<Vec<ActualInstance>> {
        self.with(|s| {
            s.stats_calls += 1;
            if s.fail_stats {
                return Err(unavailable("/v1/actual_lrps"));
            }
            Ok(s.actual.get(&process_guid.to_string()).cloned().unwrap_or_default())
        })
    }

    async fn stop_index(&self, process_guid: &ProcessGuid, index: u32) -> SchedulerResult<StopOutcome> {
        self.with(|s| {
            s.stop_calls += 1;
            if s.fail_stop {
                return Err(SchedulerError::Status {
                    url: "http://fake/v1/apps".to_string(),
                    status: 500,
                });
            }
            if s.stopped.insert((process_guid.to_string(), index)) {
                Ok(StopOutcome::Stopped)
            } else {
                Ok(StopOutcome::AlreadyGone)
            }
        })
    }
}

pub fn actor() -> Actor {
    Actor::user("user-guid-1", Some("alice"))
}

pub fn service() -> (ProcessService<FakeScheduler>, FakeScheduler) {
    let store = StateStore::open_in_memory().unwrap();
    let fake = FakeScheduler::default();
    let service = ProcessService::new(store, Arc::new(fake.clone()), &StatsConfig::default());
    (service, fake)
}

pub fn buildpack_lifecycle() -> LifecycleData {
    LifecycleData {
        stack: Some("cflinuxfs4".to_string()),
        buildpacks: vec!["ruby_buildpack".to_string()],
        droplet: Some(DropletRef {
            guid: "droplet-guid".to_string(),
            hash: "droplet-hash".to_string(),
            detected_start_command: Some("bundle exec rackup".to_string()),
        }),
        image: None,
    }
}

pub fn docker_lifecycle() -> LifecycleData {
    LifecycleData {
        image: Some(DockerImage {
            reference: "cloudfoundry/diego-docker-app:latest".to_string(),
            username: None,
            password: None,
        }),
        ..Default::default()
    }
}

/// An app with one buildpack `web` process.
pub fn seed(service: &ProcessService<FakeScheduler>) -> (AppRecord, ProcessRecord) {
    let app = service.create_app("my_app", "space-guid", "org-guid").unwrap();
    let process = service
        .create_process(
            &app.guid,
            NewProcess {
                process_type: "web".to_string(),
                lifecycle_type: LIFECYCLE_BUILDPACK.to_string(),
                lifecycle: buildpack_lifecycle(),
                ..Default::default()
            },
        )
        .unwrap();
    (app, process)
}

/// Overwrite a process record directly, without events or outbox rows.
pub fn overwrite(
    service: &ProcessService<FakeScheduler>,
    process_guid: &str,
    change: impl FnOnce(&mut ProcessRecord),
) -> ProcessRecord {
    let mut process = service.get(process_guid).unwrap();
    change(&mut process);
    service.store().put_process(&process).unwrap();
    process
}

pub fn running(process: &ProcessRecord, index: u32) -> ActualInstance {
    ActualInstance {
        process_guid: format!("{}-{}", process.guid, process.version),
        instance_guid: format!("instance-{index}"),
        index,
        state: "RUNNING".to_string(),
        details: None,
        uptime: 42,
        since: 1_700_000_000,
        host: "10.0.16.4".to_string(),
        port: 61000,
        stats: Some(InstanceUsage {
            time: Utc::now(),
            cpu: 0.08,
            mem: 128 * 1024 * 1024,
            disk: 64 * 1024 * 1024,
        }),
    }
}
