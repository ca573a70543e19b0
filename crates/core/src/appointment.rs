//! Appointment status and its transition rules.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Timestamp;

/// Lifecycle status of a lesson appointment.
///
/// `Proposal` is the status of a replacement created by the reposition queue
/// until the student accepts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Proposal,
    CheckedIn,
    Completed,
    NoShow,
    Cancelled,
}

impl AppointmentStatus {
    /// String representation for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Proposal => "proposal",
            AppointmentStatus::CheckedIn => "checked_in",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::NoShow => "no_show",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    /// No further transitions are allowed out of a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::NoShow | AppointmentStatus::Cancelled
        )
    }

    /// Whether an operational cancellation may still act on this status.
    pub fn is_repositionable(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Scheduled
                | AppointmentStatus::Confirmed
                | AppointmentStatus::Proposal
                | AppointmentStatus::CheckedIn
        )
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for AppointmentStatus {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "scheduled" => Ok(AppointmentStatus::Scheduled),
            "confirmed" => Ok(AppointmentStatus::Confirmed),
            "proposal" => Ok(AppointmentStatus::Proposal),
            "checked_in" => Ok(AppointmentStatus::CheckedIn),
            "completed" => Ok(AppointmentStatus::Completed),
            "no_show" => Ok(AppointmentStatus::NoShow),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            other => Err(CoreError::Validation(format!(
                "unknown appointment status: {other}"
            ))),
        }
    }
}

/// Returns the set of valid target statuses reachable from `from`.
///
/// Terminal statuses return an empty slice.
pub fn valid_transitions(from: AppointmentStatus) -> &'static [AppointmentStatus] {
    use AppointmentStatus::*;
    match from {
        Proposal => &[Scheduled, Confirmed, Cancelled],
        Scheduled => &[Confirmed, CheckedIn, Completed, NoShow, Cancelled],
        Confirmed => &[CheckedIn, Completed, NoShow, Cancelled],
        CheckedIn => &[Completed, NoShow, Cancelled],
        Completed | NoShow | Cancelled => &[],
    }
}

/// Check whether a transition from `from` to `to` is valid.
pub fn can_transition(from: AppointmentStatus, to: AppointmentStatus) -> bool {
    valid_transitions(from).contains(&to)
}

/// Validate a status transition, with a descriptive error for invalid ones.
pub fn validate_transition(
    from: AppointmentStatus,
    to: AppointmentStatus,
) -> Result<(), CoreError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "invalid appointment transition: {from} -> {to}"
        )))
    }
}

/// An appointment is finalizable once its outcome is known: it reached a
/// terminal status, or its scheduled end has passed.
pub fn is_finalizable(status: AppointmentStatus, ends_at: Timestamp, now: Timestamp) -> bool {
    status.is_terminal() || ends_at <= now
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn proposal_can_be_accepted_or_cancelled() {
        assert!(can_transition(AppointmentStatus::Proposal, AppointmentStatus::Scheduled));
        assert!(can_transition(AppointmentStatus::Proposal, AppointmentStatus::Confirmed));
        assert!(can_transition(AppointmentStatus::Proposal, AppointmentStatus::Cancelled));
        assert!(!can_transition(AppointmentStatus::Proposal, AppointmentStatus::Completed));
    }

    #[test]
    fn scheduled_flows_forward() {
        assert!(can_transition(AppointmentStatus::Scheduled, AppointmentStatus::Confirmed));
        assert!(can_transition(AppointmentStatus::Scheduled, AppointmentStatus::CheckedIn));
        assert!(can_transition(AppointmentStatus::Scheduled, AppointmentStatus::NoShow));
        assert!(can_transition(AppointmentStatus::Confirmed, AppointmentStatus::Completed));
        assert!(can_transition(AppointmentStatus::CheckedIn, AppointmentStatus::Completed));
    }

    #[test]
    fn terminal_statuses_have_no_transitions() {
        assert!(valid_transitions(AppointmentStatus::Completed).is_empty());
        assert!(valid_transitions(AppointmentStatus::NoShow).is_empty());
        assert!(valid_transitions(AppointmentStatus::Cancelled).is_empty());
    }

    #[test]
    fn validate_transition_error_names_both_statuses() {
        let err = validate_transition(AppointmentStatus::Completed, AppointmentStatus::Scheduled)
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("completed"));
        assert!(msg.contains("scheduled"));
    }

    #[test]
    fn repositionable_statuses() {
        assert!(AppointmentStatus::Scheduled.is_repositionable());
        assert!(AppointmentStatus::Proposal.is_repositionable());
        assert!(AppointmentStatus::CheckedIn.is_repositionable());
        assert!(!AppointmentStatus::Completed.is_repositionable());
        assert!(!AppointmentStatus::Cancelled.is_repositionable());
    }

    #[test]
    fn finalizable_by_status_or_elapsed_end() {
        let now = Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap();
        let future = now + Duration::hours(2);
        let past = now - Duration::hours(2);

        assert!(is_finalizable(AppointmentStatus::NoShow, future, now));
        assert!(is_finalizable(AppointmentStatus::Cancelled, future, now));
        assert!(is_finalizable(AppointmentStatus::Scheduled, past, now));
        assert!(!is_finalizable(AppointmentStatus::Scheduled, future, now));
    }

    #[test]
    fn status_string_roundtrip() {
        for status in [
            AppointmentStatus::Scheduled,
            AppointmentStatus::Confirmed,
            AppointmentStatus::Proposal,
            AppointmentStatus::CheckedIn,
            AppointmentStatus::Completed,
            AppointmentStatus::NoShow,
            AppointmentStatus::Cancelled,
        ] {
            let parsed = AppointmentStatus::try_from(status.as_str().to_string()).unwrap();
            assert_eq!(parsed, status);
        }
        assert!(AppointmentStatus::try_from("rescheduled".to_string()).is_err());
    }
}
