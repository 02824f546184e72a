//! procgrid: operator CLI for process desired state.
//!
//! # Usage
//!
//! ```text
//! procgrid apps create --name my_app --space SPACE --org ORG
//! procgrid processes create --app APP --type web --lifecycle docker --image nginx
//! procgrid scale PROCESS --instances 5 --memory 512
//! procgrid stats PROCESS
//! procgrid sync
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "procgrid",
    about = "procgrid: process desired state and scheduler convergence",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to procgrid.toml (default: ./procgrid.toml if present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the state store path from the config file.
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Guid of the user performing the operation.
    #[arg(long, global = true, default_value = "procgrid-cli")]
    actor: String,

    /// Display name of the acting user.
    #[arg(long, global = true)]
    actor_name: Option<String>,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage apps
    Apps {
        #[command(subcommand)]
        action: AppsAction,
    },
    /// Manage processes
    Processes {
        #[command(subcommand)]
        action: ProcessesAction,
    },
    /// Change instance count, memory or disk of a process
    Scale {
        process_guid: String,
        #[arg(short, long, allow_negative_numbers = true)]
        instances: Option<i64>,
        /// Memory limit in MB.
        #[arg(short, long, allow_negative_numbers = true)]
        memory: Option<i64>,
        /// Disk limit in MB.
        #[arg(short, long, allow_negative_numbers = true)]
        disk: Option<i64>,
    },
    /// Change start command, ports or health check of a process
    Update {
        process_guid: String,
        #[arg(long)]
        command: Option<String>,
        /// Replace the port list (repeatable).
        #[arg(long = "port", allow_negative_numbers = true)]
        ports: Vec<i64>,
        /// Clear all ports.
        #[arg(long, conflicts_with = "ports")]
        no_ports: bool,
        /// port, process or http
        #[arg(long)]
        health_check_type: Option<String>,
        #[arg(long, allow_negative_numbers = true, requires = "health_check_type")]
        health_check_timeout: Option<i64>,
        #[arg(long, requires = "health_check_type")]
        health_check_endpoint: Option<String>,
    },
    /// Show one report per desired instance
    Stats {
        process_guid: String,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Stop one instance of a process
    Terminate {
        process_guid: String,
        #[arg(allow_negative_numbers = true)]
        index: i64,
    },
    /// List audit events
    Events {
        /// Only events recorded for this actor guid.
        #[arg(long = "by")]
        by_actor: Option<String>,
    },
    /// Deliver queued desired state to the scheduler until Ctrl-C
    Sync {
        /// Make a single pass and exit.
        #[arg(long)]
        once: bool,
        /// Queue a process again, clearing a parked delivery (repeatable).
        #[arg(long = "requeue", value_name = "PROCESS_GUID")]
        requeue: Vec<String>,
    },
}

#[derive(Subcommand)]
enum AppsAction {
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        space: String,
        #[arg(long)]
        org: String,
    },
    List,
    /// Delete an app and all of its processes
    Delete { app_guid: String },
}

#[derive(Subcommand)]
enum ProcessesAction {
    Create {
        #[arg(long)]
        app: String,
        #[arg(long = "type", default_value = "web")]
        process_type: String,
        /// buildpack or docker
        #[arg(long, default_value = "buildpack")]
        lifecycle: String,
        #[arg(long)]
        command: Option<String>,
        #[arg(long)]
        stack: Option<String>,
        #[arg(long = "buildpack")]
        buildpacks: Vec<String>,
        #[arg(long)]
        droplet_guid: Option<String>,
        #[arg(long, requires = "droplet_guid")]
        droplet_hash: Option<String>,
        #[arg(long, requires = "droplet_guid")]
        detected_command: Option<String>,
        #[arg(long)]
        image: Option<String>,
        #[arg(long, requires = "image")]
        registry_username: Option<String>,
        #[arg(long, requires = "registry_username")]
        registry_password: Option<String>,
        /// Do not hand this process to the scheduler.
        #[arg(long)]
        no_diego: bool,
    },
    List {
        #[arg(long)]
        app: Option<String>,
    },
    Show { process_guid: String },
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let ctx = commands::Context::load(cli.config.as_deref(), cli.store.as_deref())?;
    let actor = procgrid_process::Actor::user(&cli.actor, cli.actor_name.as_deref());

    match cli.command {
        Commands::Apps { action } => match action {
            AppsAction::Create { name, space, org } => {
                commands::apps::create(&ctx, &name, &space, &org)
            }
            AppsAction::List => commands::apps::list(&ctx),
            AppsAction::Delete { app_guid } => commands::apps::delete(&ctx, &app_guid),
        },
        Commands::Processes { action } => match action {
            ProcessesAction::Create {
                app,
                process_type,
                lifecycle,
                command,
                stack,
                buildpacks,
                droplet_guid,
                droplet_hash,
                detected_command,
                image,
                registry_username,
                registry_password,
                no_diego,
            } => {
                let lifecycle_data = commands::processes::lifecycle_data(
                    stack,
                    buildpacks,
                    droplet_guid.map(|guid| (guid, droplet_hash.unwrap_or_default(), detected_command)),
                    image.map(|reference| (reference, registry_username, registry_password)),
                );
                commands::processes::create(
                    &ctx,
                    &app,
                    procgrid_process::NewProcess {
                        process_type,
                        lifecycle_type: lifecycle,
                        lifecycle: lifecycle_data,
                        command,
                        diego: Some(!no_diego),
                    },
                )
            }
            ProcessesAction::List { app } => commands::processes::list(&ctx, app.as_deref()),
            ProcessesAction::Show { process_guid } => commands::processes::show(&ctx, &process_guid),
        },
        Commands::Scale {
            process_guid,
            instances,
            memory,
            disk,
        } => {
            let request = procgrid_process::ScaleRequest {
                instances,
                memory_in_mb: memory,
                disk_in_mb: disk,
            };
            commands::ops::scale(&ctx, &actor, &process_guid, &request).await
        }
        Commands::Update {
            process_guid,
            command,
            ports,
            no_ports,
            health_check_type,
            health_check_timeout,
            health_check_endpoint,
        } => {
            let ports = if no_ports {
                Some(Vec::new())
            } else if ports.is_empty() {
                None
            } else {
                Some(ports)
            };
            let health_check = health_check_type.map(|kind| procgrid_process::HealthCheckRequest {
                kind: Some(kind),
                data: Some(procgrid_process::HealthCheckDataRequest {
                    timeout: health_check_timeout,
                    endpoint: health_check_endpoint,
                }),
            });
            let request = procgrid_process::UpdateRequest {
                command,
                ports,
                health_check,
            };
            commands::ops::update(&ctx, &actor, &process_guid, &request).await
        }
        Commands::Stats {
            process_guid,
            format,
        } => commands::ops::stats(&ctx, &process_guid, &format).await,
        Commands::Terminate {
            process_guid,
            index,
        } => commands::ops::terminate(&ctx, &actor, &process_guid, index).await,
        Commands::Events { by_actor } => commands::ops::events(&ctx, by_actor.as_deref()),
        Commands::Sync { once, requeue } => commands::sync::run(ctx, once, &requeue).await,
    }
}
