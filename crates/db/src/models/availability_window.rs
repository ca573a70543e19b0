//! Weekly availability rule entity and upsert DTO.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use autoscuola_core::time::{TimeOfDayWindow, WeekdaySet};
use autoscuola_core::types::{DbId, OwnerType, Timestamp};

/// A row from the `availability_windows` table. At most one per
/// (company, owner type, owner).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AvailabilityWindow {
    pub id: DbId,
    pub company_id: DbId,
    #[sqlx(try_from = "String")]
    pub owner_type: OwnerType,
    pub owner_id: DbId,
    pub weekdays: i16,
    pub start_minute: i32,
    pub end_minute: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl AvailabilityWindow {
    pub fn weekday_set(&self) -> WeekdaySet {
        WeekdaySet::from_bits(self.weekdays)
    }

    pub fn time_window(&self) -> TimeOfDayWindow {
        TimeOfDayWindow {
            start_minute: self.start_minute,
            end_minute: self.end_minute,
        }
    }
}

/// Upsert DTO for an owner's weekly rule (configuration surface).
#[derive(Debug, Clone, Deserialize)]
pub struct UpsertAvailabilityWindow {
    pub owner_type: OwnerType,
    pub owner_id: DbId,
    pub weekdays: i16,
    pub start_minute: i32,
    pub end_minute: i32,
}
