pub mod apps;
pub mod ops;
pub mod processes;
pub mod sync;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use procgrid_core::ProcgridConfig;
use procgrid_process::{ProcessService, redact_process};
use procgrid_scheduler::HttpSchedulerClient;
use procgrid_state::{ProcessRecord, StateStore};
use tracing::debug;

const DEFAULT_CONFIG: &str = "procgrid.toml";

/// Everything a command needs: configuration, store and service.
pub struct Context {
    pub config: ProcgridConfig,
    pub service: ProcessService<HttpSchedulerClient>,
}

impl Context {
    pub fn load(config_path: Option<&Path>, store_path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match config_path {
            Some(path) => ProcgridConfig::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG).exists() => {
                ProcgridConfig::from_file(Path::new(DEFAULT_CONFIG))?
            }
            None => ProcgridConfig::default(),
        };
        if let Some(path) = store_path {
            config.store.path = path.to_path_buf();
        }

        if let Some(parent) = config.store.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        let store = StateStore::open(&config.store.path)
            .with_context(|| format!("opening state store {}", config.store.path.display()))?;

        let scheduler = HttpSchedulerClient::new(
            &config.scheduler.desired_state_url,
            &config.scheduler.actual_state_url,
            config.scheduler.request_timeout()?,
        );
        debug!(
            desired_state_url = %config.scheduler.desired_state_url,
            actual_state_url = %config.scheduler.actual_state_url,
            "scheduler client configured"
        );

        let service = ProcessService::new(store, Arc::new(scheduler), &config.stats);
        Ok(Self { config, service })
    }
}

/// Print any serializable value as pretty JSON.
pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_process(process: &ProcessRecord) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(&redact_process(process))?)
}

/// Print a process with its registry credentials masked.
pub fn print_process(process: &ProcessRecord) -> anyhow::Result<()> {
    println!("{}", render_process(process)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use procgrid_process::REDACTION_MARKER;
    use procgrid_state::{AppRecord, DockerImage, LIFECYCLE_DOCKER};

    use super::*;

    #[test]
    fn printed_process_hides_registry_password() {
        let app = AppRecord::new("my_app", "space-1", "org-1");
        let mut process = ProcessRecord::new(&app, "web", LIFECYCLE_DOCKER);
        process.lifecycle.image = Some(DockerImage {
            reference: "registry.example.com/app:1".to_string(),
            username: Some("deployer".to_string()),
            password: Some("hunter2".to_string()),
        });

        let output = render_process(&process).unwrap();
        assert!(!output.contains("hunter2"));
        assert!(output.contains(REDACTION_MARKER));
        assert!(output.contains("registry.example.com/app:1"));
    }
}
