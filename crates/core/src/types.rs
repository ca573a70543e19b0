use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// The three resource dimensions an appointment books simultaneously.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerType {
    Student,
    Instructor,
    Vehicle,
}

impl OwnerType {
    /// String representation for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerType::Student => "student",
            OwnerType::Instructor => "instructor",
            OwnerType::Vehicle => "vehicle",
        }
    }
}

impl std::fmt::Display for OwnerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for OwnerType {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "student" => Ok(OwnerType::Student),
            "instructor" => Ok(OwnerType::Instructor),
            "vehicle" => Ok(OwnerType::Vehicle),
            other => Err(CoreError::Validation(format!(
                "unknown owner type: {other}"
            ))),
        }
    }
}
