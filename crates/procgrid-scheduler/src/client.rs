//! The seam between procgrid and the external scheduler.

use std::future::Future;

use crate::error::SchedulerResult;
use crate::guid::ProcessGuid;
use crate::payload::{ActualInstance, DesiredLrp};

/// Result of a targeted instance stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    /// The scheduler did not know the instance; it is already gone.
    AlreadyGone,
}

/// Operations procgrid needs from the scheduler.
///
/// Implementations must bound every call with a timeout; callers never
/// retry internally.
pub trait SchedulerClient: Send + Sync + 'static {
    /// Submit the desired state for one process version.
    fn desire_app(&self, desired: &DesiredLrp) -> impl Future<Output = SchedulerResult<()>> + Send;

    /// Currently known instances under a process guid.
    fn actual_instances(
        &self,
        process_guid: &ProcessGuid,
    ) -> impl Future<Output = SchedulerResult<Vec<ActualInstance>>> + Send;

    /// Stop the instance at `index`.
    fn stop_index(
        &self,
        process_guid: &ProcessGuid,
        index: u32,
    ) -> impl Future<Output = SchedulerResult<StopOutcome>> + Send;
}
