//! Trigger identifiers.
//!
//! A trigger id is a ULID, so ids sort by creation time. It renders with a
//! `trg_` prefix and stores as the bare ULID; parsing accepts either form.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

const TRIGGER_PREFIX: &str = "trg_";

/// Error returned when a string is not a trigger id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The text that failed to parse.
    pub input: String,
    /// Why the ULID part was rejected.
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid trigger id '{}': {}", self.input, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

/// Unique identifier for a trigger managed through the trigger API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriggerId(Ulid);

impl TriggerId {
    /// Generates a fresh id.
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for TriggerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TriggerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{TRIGGER_PREFIX}{}", self.0)
    }
}

impl FromStr for TriggerId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bare = s.strip_prefix(TRIGGER_PREFIX).unwrap_or(s);
        Ulid::from_str(bare).map(Self).map_err(|e| ParseIdError {
            input: s.to_string(),
            reason: e.to_string(),
        })
    }
}
