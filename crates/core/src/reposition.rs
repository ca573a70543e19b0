//! Reposition task status and queue policy.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// How far ahead the matcher searches for a replacement slot.
pub const MATCH_HORIZON_DAYS: i64 = 14;

/// Fixed delay between attempts for a task that found nothing.
///
/// Deliberately not exponential: the search space changes over time as
/// other bookings are released, so the queue keeps trying at a steady
/// cadence until the task resolves or the source slot elapses.
pub const RETRY_DELAY_MINUTES: i64 = 30;

/// Status of a reposition task. One task exists per source appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositionTaskStatus {
    Pending,
    /// Terminal: a replacement proposal was created (or already existed).
    Matched,
    /// Terminal: the source's start elapsed before a match was found.
    Cancelled,
}

impl RepositionTaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepositionTaskStatus::Pending => "pending",
            RepositionTaskStatus::Matched => "matched",
            RepositionTaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RepositionTaskStatus::Pending)
    }
}

impl std::fmt::Display for RepositionTaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for RepositionTaskStatus {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "pending" => Ok(RepositionTaskStatus::Pending),
            "matched" => Ok(RepositionTaskStatus::Matched),
            "cancelled" => Ok(RepositionTaskStatus::Cancelled),
            other => Err(CoreError::Validation(format!(
                "unknown reposition task status: {other}"
            ))),
        }
    }
}
