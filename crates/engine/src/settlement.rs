//! Payment settlement state machine.
//!
//! Two sweeps feed the machine: the penalty sweep (cancel/no-show penalties
//! whose cutoff has passed) and the settlement sweep (final balancing charge
//! once the outcome is known). Both compute the due amount, queue or reuse a
//! single open attempt record for it, and trigger a charge. Charges are
//! idempotent against the gateway through a key derived from
//! `(appointment, phase, attempt)`, so a retried network call can never
//! double-charge.

use std::sync::Arc;

use autoscuola_core::error::CoreError;
use autoscuola_core::payment::{
    charge_retry_delay, computed_payment_status, effective_payment_status, idempotency_key,
    outstanding_cents, LedgerSnapshot, PaymentPhase, PaymentStatus, MAX_CHARGE_ATTEMPTS,
};
use autoscuola_core::ports::{ChargeRequest, Clock, DirectoryService, GatewayError, PaymentGateway};
use autoscuola_core::types::{DbId, Timestamp};
use autoscuola_db::models::{Appointment, AppointmentPayment, NewAppointmentPayment};
use autoscuola_db::repositories::{
    AppointmentPaymentRepo, AppointmentRepo, BillingProfileRepo, CompanySettingsRepo,
};
use autoscuola_db::DbPool;
use autoscuola_events::{bus, DomainEvent, EventBus};

use crate::error::{EngineError, EngineResult};

/// A record stuck in `processing` longer than this is considered orphaned
/// by a dead worker and re-run under its original attempt number.
const STALE_PROCESSING_MINUTES: i64 = 15;

/// Result of processing one attempt record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptResult {
    Succeeded,
    /// Failed but will be retried after the backoff delay.
    Failed,
    /// Retry cap reached: record abandoned, appointment forced `insoluto`.
    Abandoned,
    /// Nothing to do (claimed by another worker, or no longer due).
    Skipped,
}

impl AttemptResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptResult::Succeeded => "succeeded",
            AttemptResult::Failed => "failed",
            AttemptResult::Abandoned => "abandoned",
            AttemptResult::Skipped => "skipped",
        }
    }
}

/// The appointment's payment status after a successful charge.
///
/// A locked `insoluto` unlocks once the balance is fully covered (manual
/// recovery resolved it); any other locked override survives recomputation.
fn status_after_success(
    ledger: &LedgerSnapshot,
    current: PaymentStatus,
    locked: bool,
) -> (PaymentStatus, bool) {
    if locked && current == PaymentStatus::Insoluto && outstanding_cents(ledger) == 0 {
        (computed_payment_status(ledger), false)
    } else {
        (effective_payment_status(ledger, current, locked), locked)
    }
}

/// Drives the per-appointment financial ledger through charge attempts.
pub struct SettlementService {
    pool: DbPool,
    gateway: Arc<dyn PaymentGateway>,
    directory: Arc<dyn DirectoryService>,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
}

impl SettlementService {
    pub fn new(
        pool: DbPool,
        gateway: Arc<dyn PaymentGateway>,
        directory: Arc<dyn DirectoryService>,
        bus: Arc<EventBus>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            pool,
            gateway,
            directory,
            bus,
            clock,
        }
    }

    // -----------------------------------------------------------------------
    // Sweeps
    // -----------------------------------------------------------------------

    /// Queue penalty charges for cancelled/no-show appointments past their
    /// cutoff (or waive the ones cancelled in time). Returns the number of
    /// appointments examined.
    pub async fn run_penalty_sweep(&self, limit: i64) -> EngineResult<usize> {
        let candidates =
            AppointmentRepo::penalty_sweep_candidates(&self.pool, self.clock.now(), limit).await?;
        let count = candidates.len();
        for appointment in candidates {
            if let Err(e) = self.settle_one(&appointment, PaymentPhase::Penalty).await {
                tracing::error!(
                    appointment_id = appointment.id,
                    error = %e,
                    "Penalty sweep failed for appointment"
                );
            }
        }
        Ok(count)
    }

    /// Queue the final balancing charge for finalizable appointments.
    pub async fn run_settlement_sweep(&self, limit: i64) -> EngineResult<usize> {
        let candidates =
            AppointmentRepo::settlement_sweep_candidates(&self.pool, self.clock.now(), limit)
                .await?;
        let count = candidates.len();
        for appointment in candidates {
            if let Err(e) = self.settle_one(&appointment, PaymentPhase::Settlement).await {
                tracing::error!(
                    appointment_id = appointment.id,
                    error = %e,
                    "Settlement sweep failed for appointment"
                );
            }
        }
        Ok(count)
    }

    /// Retry charge attempts whose backoff has elapsed.
    pub async fn run_charge_sweep(&self, limit: i64) -> EngineResult<usize> {
        let now = self.clock.now();
        let stale_before = now - chrono::Duration::minutes(STALE_PROCESSING_MINUTES);
        let due = AppointmentPaymentRepo::due(&self.pool, now, stale_before, limit).await?;
        let count = due.len();
        for record in due {
            if let Err(e) = self.process_attempt(record.id).await {
                tracing::error!(payment_id = record.id, error = %e, "Charge attempt failed");
            }
        }
        Ok(count)
    }

    /// Queue-or-reuse an attempt record for the due amount, then charge.
    async fn settle_one(
        &self,
        appointment: &Appointment,
        phase: PaymentPhase,
    ) -> EngineResult<AttemptResult> {
        match self.queue_due_charge(appointment, phase).await? {
            Some(record) => self.process_attempt(record.id).await,
            None => Ok(AttemptResult::Skipped),
        }
    }

    /// Compute the due amount and make exactly one open attempt record
    /// carry it. Returns `None` when nothing is due (waive/paid handled
    /// in place).
    async fn queue_due_charge(
        &self,
        appointment: &Appointment,
        phase: PaymentPhase,
    ) -> EngineResult<Option<AppointmentPayment>> {
        let ledger = appointment.ledger();
        let due = outstanding_cents(&ledger);

        if due == 0 {
            // Cancelled before the cutoff: explicit waive override. A fully
            // covered balance just recomputes to paid.
            let computed = computed_payment_status(&ledger);
            let locked = computed == PaymentStatus::Waived;
            if computed != appointment.payment_status {
                AppointmentRepo::set_payment_status(&self.pool, appointment.id, computed, locked)
                    .await?;
            }
            return Ok(None);
        }

        if let Some(existing) =
            AppointmentPaymentRepo::find_open_for_phase(&self.pool, appointment.id, phase).await?
        {
            if existing.amount_cents != due {
                AppointmentPaymentRepo::update_amount(&self.pool, existing.id, due).await?;
            }
            return Ok(Some(existing));
        }

        let record = AppointmentPaymentRepo::insert(
            &self.pool,
            &NewAppointmentPayment {
                appointment_id: appointment.id,
                company_id: appointment.company_id,
                student_id: appointment.student_id,
                phase,
                amount_cents: due,
                currency: appointment.currency.clone(),
                next_attempt_at: Some(self.clock.now()),
            },
        )
        .await?;
        Ok(Some(record))
    }

    // -----------------------------------------------------------------------
    // Attempt processing
    // -----------------------------------------------------------------------

    /// Claim and execute one charge attempt.
    pub async fn process_attempt(&self, payment_id: DbId) -> EngineResult<AttemptResult> {
        let now = self.clock.now();

        // Atomic claim; a concurrent worker gets `None` and walks away.
        // A record orphaned in `processing` is reclaimed with its attempt
        // counter untouched so the original idempotency key is reused.
        let claimed = match AppointmentPaymentRepo::claim_processing(&self.pool, payment_id).await? {
            Some(record) => record,
            None => {
                let stale_before = now - chrono::Duration::minutes(STALE_PROCESSING_MINUTES);
                match AppointmentPaymentRepo::reclaim_stale_processing(
                    &self.pool,
                    payment_id,
                    stale_before,
                )
                .await?
                {
                    Some(record) => record,
                    None => return Ok(AttemptResult::Skipped),
                }
            }
        };

        let appointment =
            AppointmentRepo::find_by_id(&self.pool, claimed.company_id, claimed.appointment_id)
                .await?
                .ok_or(CoreError::NotFound {
                    entity: "Appointment",
                    id: claimed.appointment_id,
                })?;

        // The balance may have been cleared since the record was queued.
        if outstanding_cents(&appointment.ledger()) == 0 {
            AppointmentPaymentRepo::mark_abandoned(
                &self.pool,
                claimed.id,
                "obsolete",
                "amount no longer due",
            )
            .await?;
            return Ok(AttemptResult::Skipped);
        }

        let key = idempotency_key(claimed.appointment_id, claimed.phase, claimed.attempt_count);
        match self.execute_charge(&claimed, &key).await {
            Ok((customer_id, charge_id)) => {
                let mut tx = self.pool.begin().await?;
                AppointmentPaymentRepo::mark_succeeded(
                    &mut *tx,
                    claimed.id,
                    &customer_id,
                    &charge_id,
                    &key,
                    now,
                )
                .await?;
                let updated =
                    AppointmentRepo::add_paid(&mut *tx, claimed.appointment_id, claimed.amount_cents)
                        .await?;
                let (status, locked) = status_after_success(
                    &updated.ledger(),
                    updated.payment_status,
                    updated.payment_status_locked,
                );
                AppointmentRepo::set_payment_status(&mut *tx, updated.id, status, locked).await?;
                tx.commit().await?;

                tracing::info!(
                    payment_id = claimed.id,
                    appointment_id = claimed.appointment_id,
                    amount_cents = claimed.amount_cents,
                    "Charge succeeded"
                );
                self.bus.publish(
                    DomainEvent::new(bus::PAYMENT_SUCCEEDED, claimed.company_id)
                        .with_source("appointment_payment", claimed.id)
                        .with_student(claimed.student_id)
                        .with_payload(serde_json::json!({
                            "appointment_id": claimed.appointment_id,
                            "amount_cents": claimed.amount_cents,
                        })),
                );
                Ok(AttemptResult::Succeeded)
            }
            Err(gateway_err) => self.record_failure(&claimed, &gateway_err, now).await,
        }
    }

    /// Resolve the customer + payment method and call the gateway.
    async fn execute_charge(
        &self,
        record: &AppointmentPayment,
        key: &str,
    ) -> Result<(String, String), GatewayError> {
        let profile = BillingProfileRepo::find_for_student(
            &self.pool,
            record.company_id,
            record.student_id,
        )
        .await
        .map_err(|e| GatewayError::Transient {
            code: "profile_lookup".into(),
            message: e.to_string(),
        })?;

        let payment_method = profile
            .as_ref()
            .and_then(|p| p.payment_method_id.clone())
            .ok_or_else(|| GatewayError::Declined {
                code: "no_payment_method".into(),
                message: "student has no stored payment method".into(),
            })?;

        let customer_id = match profile.as_ref().and_then(|p| p.gateway_customer_id.clone()) {
            Some(id) => id,
            None => {
                let contact = self
                    .directory
                    .owner_contact(record.student_id)
                    .await
                    .map_err(|e| GatewayError::Transient {
                        code: "directory".into(),
                        message: e.to_string(),
                    })?;
                let customer_id = self
                    .gateway
                    .create_customer(record.company_id, &contact.email)
                    .await?;
                BillingProfileRepo::save_gateway_customer(
                    &self.pool,
                    record.company_id,
                    record.student_id,
                    &customer_id,
                )
                .await
                .map_err(|e| GatewayError::Transient {
                    code: "profile_save".into(),
                    message: e.to_string(),
                })?;
                customer_id
            }
        };

        let destination_account = CompanySettingsRepo::find(&self.pool, record.company_id)
            .await
            .map_err(|e| GatewayError::Transient {
                code: "settings_lookup".into(),
                message: e.to_string(),
            })?
            .and_then(|s| s.gateway_destination_account);

        let charge = self
            .gateway
            .charge_off_session(ChargeRequest {
                customer_id: customer_id.clone(),
                payment_method_id: payment_method,
                amount_cents: record.amount_cents,
                currency: record.currency.clone(),
                idempotency_key: key.to_string(),
                destination_account,
            })
            .await?;
        Ok((customer_id, charge.charge_id))
    }

    /// Record a failed attempt: schedule the retry, or abandon the record
    /// at the cap and force the appointment `insoluto`.
    async fn record_failure(
        &self,
        record: &AppointmentPayment,
        gateway_err: &GatewayError,
        now: Timestamp,
    ) -> EngineResult<AttemptResult> {
        if record.attempt_count >= MAX_CHARGE_ATTEMPTS {
            let mut tx = self.pool.begin().await?;
            AppointmentPaymentRepo::mark_abandoned(
                &mut *tx,
                record.id,
                gateway_err.code(),
                gateway_err.message(),
            )
            .await?;
            AppointmentRepo::set_payment_status(
                &mut *tx,
                record.appointment_id,
                PaymentStatus::Insoluto,
                true,
            )
            .await?;
            tx.commit().await?;

            tracing::warn!(
                payment_id = record.id,
                appointment_id = record.appointment_id,
                attempts = record.attempt_count,
                "Charge retries exhausted, appointment is insoluto"
            );
            self.bus.publish(
                DomainEvent::new(bus::PAYMENT_INSOLUTO, record.company_id)
                    .with_source("appointment", record.appointment_id)
                    .with_student(record.student_id)
                    .with_payload(serde_json::json!({
                        "failure_code": gateway_err.code(),
                    })),
            );
            return Ok(AttemptResult::Abandoned);
        }

        let next = now + charge_retry_delay(record.attempt_count);
        AppointmentPaymentRepo::mark_failed(
            &self.pool,
            record.id,
            gateway_err.code(),
            gateway_err.message(),
            next,
        )
        .await?;
        tracing::info!(
            payment_id = record.id,
            attempt = record.attempt_count,
            next_attempt_at = %next,
            "Charge failed, retry scheduled"
        );
        self.bus.publish(
            DomainEvent::new(bus::PAYMENT_FAILED, record.company_id)
                .with_source("appointment_payment", record.id)
                .with_student(record.student_id)
                .with_payload(serde_json::json!({
                    "failure_code": gateway_err.code(),
                })),
        );
        Ok(AttemptResult::Failed)
    }

    // -----------------------------------------------------------------------
    // Manual recovery
    // -----------------------------------------------------------------------

    /// One-off, user-initiated charge to clear an outstanding balance;
    /// the escape hatch out of `insoluto`.
    pub async fn manual_recovery(
        &self,
        company_id: DbId,
        appointment_id: DbId,
    ) -> EngineResult<AttemptResult> {
        let appointment = AppointmentRepo::find_by_id(&self.pool, company_id, appointment_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "Appointment",
                id: appointment_id,
            })?;

        let due = outstanding_cents(&appointment.ledger());
        if due == 0 {
            return Err(EngineError::Core(CoreError::Validation(
                "appointment has no outstanding balance".into(),
            )));
        }

        let record = match AppointmentPaymentRepo::find_open_for_phase(
            &self.pool,
            appointment_id,
            PaymentPhase::ManualRecovery,
        )
        .await?
        {
            Some(existing) => {
                if existing.amount_cents != due {
                    AppointmentPaymentRepo::update_amount(&self.pool, existing.id, due).await?;
                }
                existing
            }
            None => {
                AppointmentPaymentRepo::insert(
                    &self.pool,
                    &NewAppointmentPayment {
                        appointment_id,
                        company_id,
                        student_id: appointment.student_id,
                        phase: PaymentPhase::ManualRecovery,
                        amount_cents: due,
                        currency: appointment.currency.clone(),
                        next_attempt_at: Some(self.clock.now()),
                    },
                )
                .await?
            }
        };

        self.process_attempt(record.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoscuola_core::appointment::AppointmentStatus;
    use chrono::{TimeZone, Utc};

    fn ledger(paid: i64) -> LedgerSnapshot {
        LedgerSnapshot {
            payment_required: true,
            status: AppointmentStatus::NoShow,
            price_cents: 2500,
            penalty_cents: 1250,
            paid_cents: paid,
            penalty_cutoff_at: Some(Utc.with_ymd_and_hms(2025, 4, 1, 10, 0, 0).unwrap()),
            cancelled_at: None,
        }
    }

    #[test]
    fn insoluto_unlocks_once_the_balance_is_covered() {
        let (status, locked) = status_after_success(&ledger(1250), PaymentStatus::Insoluto, true);
        assert_eq!(status, PaymentStatus::Paid);
        assert!(!locked);
    }

    #[test]
    fn insoluto_stays_locked_while_a_balance_remains() {
        let (status, locked) = status_after_success(&ledger(500), PaymentStatus::Insoluto, true);
        assert_eq!(status, PaymentStatus::Insoluto);
        assert!(locked);
    }

    #[test]
    fn unlocked_status_is_recomputed() {
        let (status, locked) =
            status_after_success(&ledger(600), PaymentStatus::PendingPenalty, false);
        assert_eq!(status, PaymentStatus::PartialPaid);
        assert!(!locked);
    }
}
