//! Charge attempt record entity and insert DTO.

use serde::Serialize;
use sqlx::FromRow;

use autoscuola_core::payment::{PaymentAttemptStatus, PaymentPhase};
use autoscuola_core::types::{DbId, Timestamp};

/// A row from the `appointment_payments` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AppointmentPayment {
    pub id: DbId,
    pub appointment_id: DbId,
    pub company_id: DbId,
    pub student_id: DbId,
    #[sqlx(try_from = "String")]
    pub phase: PaymentPhase,
    pub amount_cents: i64,
    pub currency: String,
    #[sqlx(try_from = "String")]
    pub status: PaymentAttemptStatus,
    pub attempt_count: i32,
    pub next_attempt_at: Option<Timestamp>,
    pub failure_code: Option<String>,
    pub failure_message: Option<String>,
    pub gateway_customer_id: Option<String>,
    pub gateway_charge_id: Option<String>,
    pub idempotency_key: Option<String>,
    pub paid_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Insert DTO for `appointment_payments`.
#[derive(Debug, Clone)]
pub struct NewAppointmentPayment {
    pub appointment_id: DbId,
    pub company_id: DbId,
    pub student_id: DbId,
    pub phase: PaymentPhase,
    pub amount_cents: i64,
    pub currency: String,
    pub next_attempt_at: Option<Timestamp>,
}
