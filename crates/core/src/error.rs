use crate::types::{DbId, OwnerType};

/// Domain error taxonomy.
///
/// Caller errors (`SlotConflict`, `InvalidResource`, `NotRepositionable`,
/// `BookingBlocked`) surface immediately and are never retried. "No candidate
/// found" is intentionally not represented here: the matcher returns
/// `Ok(None)` for that outcome and the reposition queue backs off.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Slot conflict: {owner_type} {owner_id} is already booked in the requested window")]
    SlotConflict { owner_type: OwnerType, owner_id: DbId },

    #[error("Invalid resource: {owner_type} {owner_id} is inactive or not part of this company")]
    InvalidResource { owner_type: OwnerType, owner_id: DbId },

    #[error("Appointment is not repositionable: {0}")]
    NotRepositionable(String),

    #[error("Student {student_id} has an unpaid balance (insoluto) and cannot book")]
    BookingBlocked { student_id: DbId },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
