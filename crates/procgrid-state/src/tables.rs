//! redb table definitions for the procgrid state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// Apps keyed by `{app_guid}`.
pub const APPS: TableDefinition<&str, &[u8]> = TableDefinition::new("apps");

/// Process records keyed by `{process_guid}`.
pub const PROCESSES: TableDefinition<&str, &[u8]> = TableDefinition::new("processes");

/// Audit events keyed by `{timestamp_micros:020}:{event_guid}`.
pub const EVENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("events");

/// Undelivered desired-state updates keyed by `{process_guid}`.
pub const PENDING_SYNC: TableDefinition<&str, &[u8]> = TableDefinition::new("pending_sync");
