//! Audit event construction.
//!
//! Request payloads are recorded through an allow-list: keys a request type
//! declares as cleartext are kept, every other supplied key is replaced with
//! [`REDACTION_MARKER`]. A field added to a request later is hidden until it
//! is explicitly allowed.

use chrono::Utc;
use procgrid_state::{AppRecord, AuditEvent, ProcessRecord, new_guid};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{ProcessError, ProcessResult};

pub const REDACTION_MARKER: &str = "PRIVATE DATA HIDDEN";

pub const EVENT_SCALE: &str = "audit.app.process.scale";
pub const EVENT_UPDATE: &str = "audit.app.process.update";
pub const EVENT_TERMINATE_INSTANCE: &str = "audit.app.process.terminate_instance";

const ACTEE_TYPE: &str = "v3-app";

fn default_actor_kind() -> String {
    "user".to_string()
}

/// Who performed an operation. Resolved by the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Actor {
    pub guid: String,
    #[serde(default = "default_actor_kind")]
    pub kind: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl Actor {
    pub fn user(guid: &str, name: Option<&str>) -> Self {
        Self {
            guid: guid.to_string(),
            kind: default_actor_kind(),
            name: name.map(str::to_string),
        }
    }
}

/// A request type whose payload is recorded on audit events.
pub trait AuditedRequest: Serialize {
    /// Keys recorded verbatim.
    const CLEARTEXT: &'static [&'static str];

    /// The redacted request representation stored under `metadata.request`.
    fn audit_request(&self) -> ProcessResult<Value> {
        let request = serde_json::to_value(self).map_err(ProcessError::Audit)?;
        Ok(redact(request, Self::CLEARTEXT))
    }
}

/// Keep allowed keys, mask the rest, drop keys that were not supplied.
pub fn redact(request: Value, cleartext: &[&str]) -> Value {
    let Value::Object(fields) = request else {
        return Value::Object(Map::new());
    };
    let redacted = fields
        .into_iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| {
            if cleartext.contains(&key.as_str()) {
                (key, value)
            } else {
                (key, Value::String(REDACTION_MARKER.to_string()))
            }
        })
        .collect();
    Value::Object(redacted)
}

/// A copy of `process` safe to show to an operator: registry credentials
/// are masked. The stored record keeps them.
pub fn redact_process(process: &ProcessRecord) -> ProcessRecord {
    let mut shown = process.clone();
    if let Some(image) = shown.lifecycle.image.as_mut() {
        if image.password.is_some() {
            image.password = Some(REDACTION_MARKER.to_string());
        }
    }
    shown
}

fn process_event(
    event_type: &str,
    actor: &Actor,
    app: &AppRecord,
    process: &ProcessRecord,
    metadata: Value,
) -> AuditEvent {
    AuditEvent {
        guid: new_guid(),
        event_type: event_type.to_string(),
        actor: actor.guid.clone(),
        actor_type: actor.kind.clone(),
        actor_name: actor.name.clone(),
        actee: app.guid.clone(),
        actee_type: ACTEE_TYPE.to_string(),
        actee_name: app.name.clone(),
        space_guid: process.space_guid.clone(),
        organization_guid: app.organization_guid.clone(),
        timestamp: Utc::now(),
        metadata,
    }
}

/// Event for a scale or update request. `request` is the already redacted
/// representation from [`AuditedRequest::audit_request`].
pub fn request_event(
    event_type: &str,
    actor: &Actor,
    app: &AppRecord,
    process: &ProcessRecord,
    request: Value,
) -> AuditEvent {
    let metadata = json!({
        "process_guid": process.guid,
        "process_type": process.process_type,
        "request": request,
    });
    process_event(event_type, actor, app, process, metadata)
}

pub fn terminate_instance_event(
    actor: &Actor,
    app: &AppRecord,
    process: &ProcessRecord,
    index: u32,
) -> AuditEvent {
    let metadata = json!({
        "process_guid": process.guid,
        "process_type": process.process_type,
        "process_index": index,
    });
    process_event(EVENT_TERMINATE_INSTANCE, actor, app, process, metadata)
}
