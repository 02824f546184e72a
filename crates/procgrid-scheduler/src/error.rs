//! Error types for the scheduler boundary.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("malformed process guid: {0}")]
    MalformedGuid(String),

    #[error("unknown lifecycle type: {0:?}")]
    UnknownLifecycleType(String),

    #[error("process {process_guid} has incomplete lifecycle data: {reason}")]
    IncompleteLifecycle { process_guid: String, reason: String },

    #[error("invalid staging request: {0}")]
    InvalidStaging(String),

    #[error("invalid request for {url}: {reason}")]
    InvalidRequest { url: String, reason: String },

    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("{url} responded with status {status}")]
    Status { url: String, status: u16 },

    #[error("failed to decode response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

impl SchedulerError {
    /// Whether retrying the same call later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SchedulerError::Transport { .. } | SchedulerError::Timeout { .. } => true,
            SchedulerError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
