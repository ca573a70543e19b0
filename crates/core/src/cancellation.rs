//! Cancellation kinds.
//!
//! Cancellation reasons are a closed enum at the request boundary, so the
//! reposition matcher's exclusion logic is a total function over a finite
//! set of cases instead of free-text matching.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Why an appointment was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationKind {
    /// The student asked to cancel; penalty rules apply, no reposition.
    StudentRequest,
    /// The instructor is unavailable for this slot.
    InstructorUnavailable,
    /// The vehicle is unavailable for this slot.
    VehicleUnavailable,
    /// The instructor was deactivated in the directory.
    InstructorInactive,
    /// The vehicle was deactivated in the directory.
    VehicleInactive,
    /// The company closed this slot (holiday, maintenance, ...).
    CompanyClosed,
    Other,
}

/// Which resource the matcher must not re-offer when searching for a
/// replacement slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceExclusion {
    None,
    Instructor,
    Vehicle,
}

impl CancellationKind {
    /// String representation for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            CancellationKind::StudentRequest => "student_request",
            CancellationKind::InstructorUnavailable => "instructor_unavailable",
            CancellationKind::VehicleUnavailable => "vehicle_unavailable",
            CancellationKind::InstructorInactive => "instructor_inactive",
            CancellationKind::VehicleInactive => "vehicle_inactive",
            CancellationKind::CompanyClosed => "company_closed",
            CancellationKind::Other => "other",
        }
    }

    /// An operational cancellation is the company's fault, waives the
    /// student's ledger, and enqueues a reposition task. Everything except
    /// an explicit student request counts.
    pub fn is_operational(&self) -> bool {
        !matches!(self, CancellationKind::StudentRequest)
    }

    /// The resource at fault, to be excluded from the replacement search.
    pub fn excluded_resource(&self) -> ResourceExclusion {
        match self {
            CancellationKind::InstructorUnavailable | CancellationKind::InstructorInactive => {
                ResourceExclusion::Instructor
            }
            CancellationKind::VehicleUnavailable | CancellationKind::VehicleInactive => {
                ResourceExclusion::Vehicle
            }
            CancellationKind::StudentRequest
            | CancellationKind::CompanyClosed
            | CancellationKind::Other => ResourceExclusion::None,
        }
    }
}

impl std::fmt::Display for CancellationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for CancellationKind {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "student_request" => Ok(CancellationKind::StudentRequest),
            "instructor_unavailable" => Ok(CancellationKind::InstructorUnavailable),
            "vehicle_unavailable" => Ok(CancellationKind::VehicleUnavailable),
            "instructor_inactive" => Ok(CancellationKind::InstructorInactive),
            "vehicle_inactive" => Ok(CancellationKind::VehicleInactive),
            "company_closed" => Ok(CancellationKind::CompanyClosed),
            "other" => Ok(CancellationKind::Other),
            other => Err(CoreError::Validation(format!(
                "unknown cancellation kind: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn student_request_is_not_operational() {
        assert!(!CancellationKind::StudentRequest.is_operational());
        assert!(CancellationKind::VehicleInactive.is_operational());
        assert!(CancellationKind::CompanyClosed.is_operational());
        assert!(CancellationKind::Other.is_operational());
    }

    #[test]
    fn exclusion_targets_the_faulty_resource() {
        assert_eq!(
            CancellationKind::InstructorInactive.excluded_resource(),
            ResourceExclusion::Instructor
        );
        assert_eq!(
            CancellationKind::InstructorUnavailable.excluded_resource(),
            ResourceExclusion::Instructor
        );
        assert_eq!(
            CancellationKind::VehicleInactive.excluded_resource(),
            ResourceExclusion::Vehicle
        );
        assert_eq!(
            CancellationKind::CompanyClosed.excluded_resource(),
            ResourceExclusion::None
        );
    }
}
