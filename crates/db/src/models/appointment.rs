//! Appointment entity and insert DTO.

use serde::Serialize;
use sqlx::FromRow;

use autoscuola_core::appointment::AppointmentStatus;
use autoscuola_core::cancellation::CancellationKind;
use autoscuola_core::lesson::LessonType;
use autoscuola_core::payment::{InvoiceStatus, LedgerSnapshot, PaymentStatus};
use autoscuola_core::time::Interval;
use autoscuola_core::types::{DbId, Timestamp};

/// A row from the `appointments` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Appointment {
    pub id: DbId,
    pub company_id: DbId,
    pub student_id: DbId,
    pub case_id: Option<DbId>,
    #[sqlx(try_from = "String")]
    pub lesson_type: LessonType,
    #[sqlx(try_from = "String")]
    pub status: AppointmentStatus,
    pub starts_at: Timestamp,
    pub ends_at: Timestamp,
    pub instructor_id: DbId,
    pub vehicle_id: DbId,

    pub cancelled_at: Option<Timestamp>,
    pub cancellation_kind: Option<String>,
    pub cancellation_reason: Option<String>,
    pub replaced_by_appointment_id: Option<DbId>,

    pub payment_required: bool,
    pub price_cents: i64,
    pub penalty_cents: i64,
    pub paid_cents: i64,
    pub currency: String,
    pub penalty_cutoff_at: Option<Timestamp>,
    #[sqlx(try_from = "String")]
    pub payment_status: PaymentStatus,
    pub payment_status_locked: bool,
    #[sqlx(try_from = "String")]
    pub invoice_status: InvoiceStatus,
    pub invoice_id: Option<String>,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Appointment {
    /// The booked `[starts_at, ends_at)` interval in epoch milliseconds.
    pub fn interval(&self) -> Interval {
        Interval::from_times(self.starts_at, self.ends_at)
    }

    /// Typed cancellation kind; `None` for never-cancelled rows and for
    /// legacy values that no longer parse.
    pub fn cancellation_kind(&self) -> Option<CancellationKind> {
        self.cancellation_kind
            .clone()
            .and_then(|raw| CancellationKind::try_from(raw).ok())
    }

    /// The ledger fields the payment status is derived from.
    pub fn ledger(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            payment_required: self.payment_required,
            status: self.status,
            price_cents: self.price_cents,
            penalty_cents: self.penalty_cents,
            paid_cents: self.paid_cents,
            penalty_cutoff_at: self.penalty_cutoff_at,
            cancelled_at: self.cancelled_at,
        }
    }

    pub fn duration_minutes(&self) -> i32 {
        ((self.ends_at - self.starts_at).num_minutes()) as i32
    }
}

/// Insert DTO for `appointments`. Built by the lifecycle manager (booking)
/// and the reposition queue (replacement proposals).
#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub company_id: DbId,
    pub student_id: DbId,
    pub case_id: Option<DbId>,
    pub lesson_type: LessonType,
    pub status: AppointmentStatus,
    pub starts_at: Timestamp,
    pub ends_at: Timestamp,
    pub instructor_id: DbId,
    pub vehicle_id: DbId,
    pub payment_required: bool,
    pub price_cents: i64,
    pub penalty_cents: i64,
    pub paid_cents: i64,
    pub currency: String,
    pub penalty_cutoff_at: Option<Timestamp>,
    pub payment_status: PaymentStatus,
    pub payment_status_locked: bool,
    pub invoice_status: InvoiceStatus,
}
