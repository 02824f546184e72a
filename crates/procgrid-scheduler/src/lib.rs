//! procgrid-scheduler: the boundary to the external scheduler.
//!
//! The scheduler knows nothing about procgrid's records. It is addressed by
//! an opaque process guid derived from a process's identity and version,
//! and speaks one of two dialects depending on how the process is run.
//!
//! # Architecture
//!
//! ```text
//! ProcessRecord
//!   ├── guid::ProcessGuid          "{guid}-{version}" scheduler key
//!   ├── protocol_for_type()        buildpack | docker
//!   │   ├── build_desired_state_payload() → DesiredLrp
//!   │   └── build_staging_payload()       → StagingRequest
//!   └── SchedulerClient
//!       └── HttpSchedulerClient    desire / actual instances / stop index
//! ```

mod buildpack;
mod docker;

pub mod client;
pub mod error;
pub mod guid;
pub mod http_client;
pub mod payload;
pub mod protocol;

pub use client::{SchedulerClient, StopOutcome};
pub use error::{SchedulerError, SchedulerResult};
pub use guid::ProcessGuid;
pub use http_client::HttpSchedulerClient;
pub use payload::{ActualInstance, DesiredLrp, InstanceUsage, StagingRequest};
pub use protocol::{LifecycleProtocol, protocol_for_type};
