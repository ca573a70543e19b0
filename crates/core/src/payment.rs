//! Payment settlement state machine: amounts, statuses, retry policy.
//!
//! `payment_status` on an appointment is derived state. It is recomputed
//! from the ledger fields after every mutation, inside the same transaction,
//! by [`computed_payment_status`]. The only exceptions are the two locked
//! overrides (`waived` by an operational/before-cutoff cancellation,
//! `insoluto` by retry exhaustion), which recomputation must not silently
//! replace; see [`effective_payment_status`].

use serde::{Deserialize, Serialize};

use crate::appointment::AppointmentStatus;
use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Maximum number of charge attempts per payment record. When reached the
/// record is abandoned and the appointment goes `insoluto`.
pub const MAX_CHARGE_ATTEMPTS: i32 = 3;

/// Delay before re-attempting after the given number of completed attempts:
/// 4 hours after the first failure, 8 hours after each later one.
pub fn charge_retry_delay(completed_attempts: i32) -> chrono::Duration {
    if completed_attempts <= 1 {
        chrono::Duration::hours(4)
    } else {
        chrono::Duration::hours(8)
    }
}

/// Deterministic gateway idempotency key, so a retried network call can
/// never double-charge: the same `(appointment, phase, attempt)` triple
/// always produces the same key.
pub fn idempotency_key(appointment_id: DbId, phase: PaymentPhase, attempt_number: i32) -> String {
    format!("pay-{appointment_id}-{}-{attempt_number}", phase.as_str())
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which stage of the ledger a charge attempt belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentPhase {
    /// Partial charge owed after a late student cancellation or no-show.
    Penalty,
    /// Final balancing charge once the appointment outcome is known.
    Settlement,
    /// One-off user-initiated charge to clear an insoluto balance.
    ManualRecovery,
}

impl PaymentPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentPhase::Penalty => "penalty",
            PaymentPhase::Settlement => "settlement",
            PaymentPhase::ManualRecovery => "manual_recovery",
        }
    }
}

impl std::fmt::Display for PaymentPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for PaymentPhase {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "penalty" => Ok(PaymentPhase::Penalty),
            "settlement" => Ok(PaymentPhase::Settlement),
            "manual_recovery" => Ok(PaymentPhase::ManualRecovery),
            other => Err(CoreError::Validation(format!(
                "unknown payment phase: {other}"
            ))),
        }
    }
}

/// Status of a single charge-attempt record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentAttemptStatus {
    Pending,
    Processing,
    Succeeded,
    Failed,
    Abandoned,
}

impl PaymentAttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentAttemptStatus::Pending => "pending",
            PaymentAttemptStatus::Processing => "processing",
            PaymentAttemptStatus::Succeeded => "succeeded",
            PaymentAttemptStatus::Failed => "failed",
            PaymentAttemptStatus::Abandoned => "abandoned",
        }
    }

    /// Once terminal, no further attempts happen on this record.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentAttemptStatus::Succeeded | PaymentAttemptStatus::Abandoned
        )
    }
}

impl std::fmt::Display for PaymentAttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for PaymentAttemptStatus {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "pending" => Ok(PaymentAttemptStatus::Pending),
            "processing" => Ok(PaymentAttemptStatus::Processing),
            "succeeded" => Ok(PaymentAttemptStatus::Succeeded),
            "failed" => Ok(PaymentAttemptStatus::Failed),
            "abandoned" => Ok(PaymentAttemptStatus::Abandoned),
            other => Err(CoreError::Validation(format!(
                "unknown payment attempt status: {other}"
            ))),
        }
    }
}

/// Overall payment status of an appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    NotRequired,
    PendingPenalty,
    PartialPaid,
    Paid,
    Waived,
    Insoluto,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::NotRequired => "not_required",
            PaymentStatus::PendingPenalty => "pending_penalty",
            PaymentStatus::PartialPaid => "partial_paid",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Waived => "waived",
            PaymentStatus::Insoluto => "insoluto",
        }
    }

    /// The two statuses that may be set as locked overrides.
    pub fn is_override(&self) -> bool {
        matches!(self, PaymentStatus::Waived | PaymentStatus::Insoluto)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for PaymentStatus {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "not_required" => Ok(PaymentStatus::NotRequired),
            "pending_penalty" => Ok(PaymentStatus::PendingPenalty),
            "partial_paid" => Ok(PaymentStatus::PartialPaid),
            "paid" => Ok(PaymentStatus::Paid),
            "waived" => Ok(PaymentStatus::Waived),
            "insoluto" => Ok(PaymentStatus::Insoluto),
            other => Err(CoreError::Validation(format!(
                "unknown payment status: {other}"
            ))),
        }
    }
}

/// Invoice issuance status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    NotRequired,
    Pending,
    /// Invoicing provider not configured for the company; retried once it is.
    PendingFic,
    Issued,
    Failed,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::NotRequired => "not_required",
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::PendingFic => "pending_fic",
            InvoiceStatus::Issued => "issued",
            InvoiceStatus::Failed => "failed",
        }
    }

    /// Statuses the finalizer sweep picks up again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, InvoiceStatus::Pending | InvoiceStatus::PendingFic)
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for InvoiceStatus {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "not_required" => Ok(InvoiceStatus::NotRequired),
            "pending" => Ok(InvoiceStatus::Pending),
            "pending_fic" => Ok(InvoiceStatus::PendingFic),
            "issued" => Ok(InvoiceStatus::Issued),
            "failed" => Ok(InvoiceStatus::Failed),
            other => Err(CoreError::Validation(format!(
                "unknown invoice status: {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Derived amounts and status
// ---------------------------------------------------------------------------

/// The ledger fields `payment_status` is a pure function of.
#[derive(Debug, Clone, Copy)]
pub struct LedgerSnapshot {
    pub payment_required: bool,
    pub status: AppointmentStatus,
    pub price_cents: i64,
    pub penalty_cents: i64,
    pub paid_cents: i64,
    pub penalty_cutoff_at: Option<Timestamp>,
    pub cancelled_at: Option<Timestamp>,
}

/// The amount ultimately owed for an appointment.
///
/// Zero if and only if it was cancelled before the penalty cutoff; the
/// penalty amount for a late cancellation or no-show; the full price
/// otherwise.
pub fn final_amount_cents(ledger: &LedgerSnapshot) -> i64 {
    match ledger.status {
        AppointmentStatus::Cancelled => {
            let before_cutoff = match (ledger.cancelled_at, ledger.penalty_cutoff_at) {
                (Some(cancelled_at), Some(cutoff)) => cancelled_at < cutoff,
                _ => false,
            };
            if before_cutoff {
                0
            } else {
                ledger.penalty_cents
            }
        }
        AppointmentStatus::NoShow => ledger.penalty_cents,
        _ => ledger.price_cents,
    }
}

/// Recompute the payment status from the ledger fields alone.
pub fn computed_payment_status(ledger: &LedgerSnapshot) -> PaymentStatus {
    if !ledger.payment_required {
        return PaymentStatus::NotRequired;
    }
    let due = final_amount_cents(ledger);
    if due == 0 {
        PaymentStatus::Waived
    } else if ledger.paid_cents >= due {
        PaymentStatus::Paid
    } else if ledger.paid_cents > 0 {
        PaymentStatus::PartialPaid
    } else {
        PaymentStatus::PendingPenalty
    }
}

/// Recompute the payment status, preserving a locked override.
pub fn effective_payment_status(
    ledger: &LedgerSnapshot,
    current: PaymentStatus,
    locked: bool,
) -> PaymentStatus {
    if locked && current.is_override() {
        current
    } else {
        computed_payment_status(ledger)
    }
}

/// Amount still outstanding toward the final amount.
pub fn outstanding_cents(ledger: &LedgerSnapshot) -> i64 {
    (final_amount_cents(ledger) - ledger.paid_cents).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn base_ledger() -> LedgerSnapshot {
        LedgerSnapshot {
            payment_required: true,
            status: AppointmentStatus::Scheduled,
            price_cents: 2500,
            penalty_cents: 1250,
            paid_cents: 0,
            penalty_cutoff_at: Some(Utc.with_ymd_and_hms(2025, 4, 1, 10, 0, 0).unwrap()),
            cancelled_at: None,
        }
    }

    #[test]
    fn final_amount_is_full_price_for_live_appointments() {
        assert_eq!(final_amount_cents(&base_ledger()), 2500);
    }

    #[test]
    fn cancel_before_cutoff_waives_everything() {
        let mut ledger = base_ledger();
        ledger.status = AppointmentStatus::Cancelled;
        ledger.cancelled_at = Some(Utc.with_ymd_and_hms(2025, 3, 30, 9, 0, 0).unwrap());
        assert_eq!(final_amount_cents(&ledger), 0);
        assert_eq!(computed_payment_status(&ledger), PaymentStatus::Waived);
    }

    #[test]
    fn cancel_after_cutoff_owes_the_penalty_not_the_price() {
        // Cancellation 2 hours after the cutoff: EUR 12.50 due, not EUR 25.
        let mut ledger = base_ledger();
        ledger.status = AppointmentStatus::Cancelled;
        ledger.cancelled_at = Some(ledger.penalty_cutoff_at.unwrap() + Duration::hours(2));
        assert_eq!(final_amount_cents(&ledger), 1250);
        assert_eq!(
            computed_payment_status(&ledger),
            PaymentStatus::PendingPenalty
        );
    }

    #[test]
    fn no_show_owes_the_penalty() {
        let mut ledger = base_ledger();
        ledger.status = AppointmentStatus::NoShow;
        assert_eq!(final_amount_cents(&ledger), 1250);
    }

    #[test]
    fn paid_and_partial_paid_thresholds() {
        let mut ledger = base_ledger();
        ledger.status = AppointmentStatus::Completed;

        ledger.paid_cents = 1000;
        assert_eq!(computed_payment_status(&ledger), PaymentStatus::PartialPaid);
        assert_eq!(outstanding_cents(&ledger), 1500);

        ledger.paid_cents = 2500;
        assert_eq!(computed_payment_status(&ledger), PaymentStatus::Paid);
        assert_eq!(outstanding_cents(&ledger), 0);
    }

    #[test]
    fn payment_not_required_wins_over_everything() {
        let mut ledger = base_ledger();
        ledger.payment_required = false;
        ledger.paid_cents = 99999;
        assert_eq!(computed_payment_status(&ledger), PaymentStatus::NotRequired);
    }

    #[test]
    fn locked_overrides_survive_recomputation() {
        let ledger = base_ledger();
        assert_eq!(
            effective_payment_status(&ledger, PaymentStatus::Insoluto, true),
            PaymentStatus::Insoluto
        );
        assert_eq!(
            effective_payment_status(&ledger, PaymentStatus::Waived, true),
            PaymentStatus::Waived
        );
        // Unlocked values are always recomputed.
        assert_eq!(
            effective_payment_status(&ledger, PaymentStatus::Paid, false),
            PaymentStatus::PendingPenalty
        );
    }

    #[test]
    fn retry_delays_escalate_then_hold() {
        assert_eq!(charge_retry_delay(1), chrono::Duration::hours(4));
        assert_eq!(charge_retry_delay(2), chrono::Duration::hours(8));
        assert_eq!(charge_retry_delay(3), chrono::Duration::hours(8));
    }

    #[test]
    fn idempotency_key_is_deterministic() {
        let a = idempotency_key(42, PaymentPhase::Penalty, 2);
        let b = idempotency_key(42, PaymentPhase::Penalty, 2);
        assert_eq!(a, b);
        assert_eq!(a, "pay-42-penalty-2");
        assert_ne!(a, idempotency_key(42, PaymentPhase::Settlement, 2));
        assert_ne!(a, idempotency_key(42, PaymentPhase::Penalty, 3));
    }
}
