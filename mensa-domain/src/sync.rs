use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::UnknownStatus;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncOutcome {
    Succeeded,
    Failed,
}

impl SyncOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOutcome::Succeeded => "SUCCEEDED",
            SyncOutcome::Failed => "FAILED",
        }
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncOutcome {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCEEDED" => Ok(SyncOutcome::Succeeded),
            "FAILED" => Ok(SyncOutcome::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Process-wide record of the last catalog synchronization run. A single
/// row, overwritten on every run; consulted at startup to decide whether a
/// sync is already overdue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncCursor {
    pub finished_at: DateTime<Utc>,
    pub slot_count: u32,
    pub outcome: SyncOutcome,
    pub detail: Option<String>,
}

impl SyncCursor {
    pub fn succeeded(slot_count: u32) -> Self {
        Self {
            finished_at: Utc::now(),
            slot_count,
            outcome: SyncOutcome::Succeeded,
            detail: None,
        }
    }

    pub fn failed(detail: String) -> Self {
        Self {
            finished_at: Utc::now(),
            slot_count: 0,
            outcome: SyncOutcome::Failed,
            detail: Some(detail),
        }
    }
}
