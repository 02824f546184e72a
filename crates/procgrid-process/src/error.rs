//! Error taxonomy for process operations.
//!
//! Every variant maps to a stable [`ErrorKind`], so a boundary layer can pick
//! an external status without matching on messages.

use procgrid_scheduler::SchedulerError;
use procgrid_state::StateError;
use thiserror::Error;

pub type ProcessResult<T> = Result<T, ProcessError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller input was rejected; nothing was changed.
    Validation,
    NotFound,
    /// Safe to retry later.
    Unavailable,
    TerminationFailed,
    /// A persisted record or scheduler key is corrupt.
    Integrity,
    Internal,
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("{field}: {message}")]
    Validation { field: String, message: String },

    #[error("process not found: {0}")]
    ProcessNotFound(String),

    #[error("app not found: {0}")]
    AppNotFound(String),

    #[error("unknown lifecycle type: {0:?}")]
    UnknownLifecycleType(String),

    #[error("malformed process guid: {0}")]
    MalformedGuid(String),

    #[error("stats unavailable for process {process_guid}: {reason}")]
    StatsUnavailable { process_guid: String, reason: String },

    #[error("failed to terminate instance {index} of process {process_guid}: {reason}")]
    TerminationFailed {
        process_guid: String,
        index: u32,
        reason: String,
    },

    #[error("failed to record request on audit event: {0}")]
    Audit(serde_json::Error),

    #[error(transparent)]
    State(StateError),

    #[error(transparent)]
    Scheduler(SchedulerError),
}

impl ProcessError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        ProcessError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ProcessError::Validation { .. } => ErrorKind::Validation,
            ProcessError::ProcessNotFound(_) | ProcessError::AppNotFound(_) => ErrorKind::NotFound,
            ProcessError::StatsUnavailable { .. } => ErrorKind::Unavailable,
            ProcessError::TerminationFailed { .. } => ErrorKind::TerminationFailed,
            ProcessError::UnknownLifecycleType(_) | ProcessError::MalformedGuid(_) => {
                ErrorKind::Integrity
            }
            ProcessError::State(StateError::NotFound(_)) => ErrorKind::NotFound,
            ProcessError::State(StateError::Conflict(_) | StateError::Invalid { .. }) => {
                ErrorKind::Validation
            }
            ProcessError::Audit(_) | ProcessError::State(_) => ErrorKind::Internal,
            ProcessError::Scheduler(e) if e.is_transient() => ErrorKind::Unavailable,
            ProcessError::Scheduler(_) => ErrorKind::Internal,
        }
    }
}

impl From<StateError> for ProcessError {
    fn from(e: StateError) -> Self {
        ProcessError::State(e)
    }
}

impl From<SchedulerError> for ProcessError {
    fn from(e: SchedulerError) -> Self {
        match e {
            SchedulerError::MalformedGuid(reason) => ProcessError::MalformedGuid(reason),
            SchedulerError::UnknownLifecycleType(t) => ProcessError::UnknownLifecycleType(t),
            other => ProcessError::Scheduler(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_integrity_errors_are_lifted() {
        let err = ProcessError::from(SchedulerError::UnknownLifecycleType("kpack".to_string()));
        assert!(matches!(err, ProcessError::UnknownLifecycleType(ref t) if t == "kpack"));
        assert_eq!(err.kind(), ErrorKind::Integrity);

        let err = ProcessError::from(SchedulerError::MalformedGuid("x".to_string()));
        assert_eq!(err.kind(), ErrorKind::Integrity);
    }

    #[test]
    fn validation_names_field() {
        let err = ProcessError::validation("instances", "must be greater than or equal to 0");
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(
            err.to_string(),
            "instances: must be greater than or equal to 0"
        );
    }

    #[test]
    fn transient_scheduler_errors_are_unavailable() {
        let err = ProcessError::from(SchedulerError::Status {
            url: "http://nsync/v1/apps/x".to_string(),
            status: 503,
        });
        assert_eq!(err.kind(), ErrorKind::Unavailable);
    }
}
