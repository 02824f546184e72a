//! procgrid-state: system of record for process desired state.
//!
//! Backed by [redb](https://docs.rs/redb). Apps, processes, audit events
//! and the convergence outbox live in one database so that a process
//! mutation, its audit event and its pending scheduler update commit in a
//! single write transaction.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Audit events are keyed by `{timestamp_micros}:{guid}` so a table scan
//! yields them in commit order.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
