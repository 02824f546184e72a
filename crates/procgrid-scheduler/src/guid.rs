//! ProcessGuid codec.
//!
//! The scheduler addresses a process by a single string built from the
//! process identity and its version: `"{guid}-{version}"`. The identity is
//! always a hyphenated UUID, so it occupies exactly the first
//! [`IDENTITY_LEN`] bytes and the version is everything after the separator.
//! Bumping the version yields a new scheduler-visible key while the old
//! one drains.

use std::fmt;
use std::str::FromStr;

use procgrid_state::ProcessRecord;
use uuid::Uuid;

use crate::error::{SchedulerError, SchedulerResult};

/// Length of a hyphenated UUID.
pub const IDENTITY_LEN: usize = 36;

/// A decoded scheduler key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProcessGuid {
    guid: String,
    version: String,
}

impl ProcessGuid {
    /// Validate an (identity, version) pair.
    pub fn new(guid: &str, version: &str) -> SchedulerResult<Self> {
        if guid.len() != IDENTITY_LEN || Uuid::parse_str(guid).is_err() {
            return Err(SchedulerError::MalformedGuid(format!(
                "process identity {guid:?} is not a hyphenated uuid"
            )));
        }
        if version.is_empty() {
            return Err(SchedulerError::MalformedGuid(format!(
                "process {guid} has an empty version"
            )));
        }
        Ok(Self {
            guid: guid.to_string(),
            version: version.to_string(),
        })
    }

    pub fn for_process(process: &ProcessRecord) -> SchedulerResult<Self> {
        Self::new(&process.guid, &process.version)
    }

    pub fn guid(&self) -> &str {
        &self.guid
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn into_parts(self) -> (String, String) {
        (self.guid, self.version)
    }
}

impl fmt::Display for ProcessGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.guid, self.version)
    }
}

impl FromStr for ProcessGuid {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode(s)
    }
}

/// Encode an (identity, version) pair into the scheduler key.
pub fn encode(guid: &str, version: &str) -> SchedulerResult<String> {
    Ok(ProcessGuid::new(guid, version)?.to_string())
}

/// Split a scheduler key back into identity and version.
pub fn decode(encoded: &str) -> SchedulerResult<ProcessGuid> {
    if encoded.len() < IDENTITY_LEN + 2 {
        return Err(SchedulerError::MalformedGuid(format!(
            "{encoded:?} is too short"
        )));
    }
    // Byte 36 is ASCII in any valid key; a non-boundary here means garbage.
    if !encoded.is_char_boundary(IDENTITY_LEN) || !encoded.is_char_boundary(IDENTITY_LEN + 1) {
        return Err(SchedulerError::MalformedGuid(format!(
            "{encoded:?} has no identity separator"
        )));
    }
    let (guid, rest) = encoded.split_at(IDENTITY_LEN);
    let Some(version) = rest.strip_prefix('-') else {
        return Err(SchedulerError::MalformedGuid(format!(
            "{encoded:?} has no identity separator"
        )));
    };
    ProcessGuid::new(guid, version)
}
