//! procgrid-core: configuration shared by every procgrid crate.
//!
//! The `procgrid.toml` file is parsed into [`ProcgridConfig`]. Every
//! section is optional; missing keys fall back to the defaults used by a
//! stock deployment next to the scheduler.

pub mod config;
pub mod duration;

pub use config::{ConfigError, ConvergenceConfig, ProcgridConfig, SchedulerConfig, StatsConfig, StoreConfig};
pub use duration::parse_duration;
