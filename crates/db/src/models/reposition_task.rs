//! Reposition task entity.

use serde::Serialize;
use sqlx::FromRow;

use autoscuola_core::cancellation::CancellationKind;
use autoscuola_core::reposition::RepositionTaskStatus;
use autoscuola_core::types::{DbId, Timestamp};

/// A row from the `reposition_tasks` table. At most one per source
/// appointment, enforced by `uq_reposition_tasks_source`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RepositionTask {
    pub id: DbId,
    pub company_id: DbId,
    pub source_appointment_id: DbId,
    pub student_id: DbId,
    #[sqlx(try_from = "String")]
    pub status: RepositionTaskStatus,
    pub reason: String,
    pub attempt_count: i32,
    pub last_attempt_at: Option<Timestamp>,
    pub next_attempt_at: Timestamp,
    pub matched_appointment_id: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl RepositionTask {
    /// The typed cancellation kind that created this task. Unknown legacy
    /// values fall back to `Other` so exclusion logic stays total.
    pub fn reason_kind(&self) -> CancellationKind {
        CancellationKind::try_from(self.reason.clone()).unwrap_or(CancellationKind::Other)
    }
}
