//! Repository for the `appointment_payments` table.

use sqlx::PgPool;

use autoscuola_core::payment::PaymentPhase;
use autoscuola_core::types::{DbId, Timestamp};

use crate::models::appointment_payment::{AppointmentPayment, NewAppointmentPayment};

const COLUMNS: &str = "\
    id, appointment_id, company_id, student_id, phase, amount_cents, currency, status, \
    attempt_count, next_attempt_at, failure_code, failure_message, gateway_customer_id, \
    gateway_charge_id, idempotency_key, paid_at, created_at, updated_at";

/// Charge attempt record operations.
pub struct AppointmentPaymentRepo;

impl AppointmentPaymentRepo {
    /// Insert a fresh pending attempt record.
    pub async fn insert(
        executor: impl sqlx::PgExecutor<'_>,
        new: &NewAppointmentPayment,
    ) -> Result<AppointmentPayment, sqlx::Error> {
        let query = format!(
            "INSERT INTO appointment_payments \
                (appointment_id, company_id, student_id, phase, amount_cents, currency, \
                 status, next_attempt_at) \
             VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AppointmentPayment>(&query)
            .bind(new.appointment_id)
            .bind(new.company_id)
            .bind(new.student_id)
            .bind(new.phase.as_str())
            .bind(new.amount_cents)
            .bind(&new.currency)
            .bind(new.next_attempt_at)
            .fetch_one(executor)
            .await
    }

    pub async fn find_by_id(
        executor: impl sqlx::PgExecutor<'_>,
        id: DbId,
    ) -> Result<Option<AppointmentPayment>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM appointment_payments WHERE id = $1");
        sqlx::query_as::<_, AppointmentPayment>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// The open (non-terminal) record for a phase, if one exists. The sweeps
    /// reuse this record instead of queueing a duplicate.
    pub async fn find_open_for_phase(
        executor: impl sqlx::PgExecutor<'_>,
        appointment_id: DbId,
        phase: PaymentPhase,
    ) -> Result<Option<AppointmentPayment>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM appointment_payments \
             WHERE appointment_id = $1 AND phase = $2 \
               AND status IN ('pending', 'processing', 'failed') \
             ORDER BY id \
             LIMIT 1"
        );
        sqlx::query_as::<_, AppointmentPayment>(&query)
            .bind(appointment_id)
            .bind(phase.as_str())
            .fetch_optional(executor)
            .await
    }

    /// Re-target an open record at the currently due amount (e.g. after a
    /// partial payment shrank the balance).
    pub async fn update_amount(
        executor: impl sqlx::PgExecutor<'_>,
        id: DbId,
        amount_cents: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE appointment_payments \
             SET amount_cents = $2, updated_at = NOW() \
             WHERE id = $1 AND status IN ('pending', 'failed')",
        )
        .bind(id)
        .bind(amount_cents)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Attempt records due for a charge, oldest first. Includes records
    /// stuck in `processing` since before `stale_before` (a worker died
    /// mid-charge); those are re-run under their original attempt number
    /// so the gateway idempotency key is reused, not reissued.
    pub async fn due(
        pool: &PgPool,
        now: Timestamp,
        stale_before: Timestamp,
        limit: i64,
    ) -> Result<Vec<AppointmentPayment>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM appointment_payments \
             WHERE (status IN ('pending', 'failed') \
                    AND (next_attempt_at IS NULL OR next_attempt_at <= $1)) \
                OR (status = 'processing' AND updated_at < $2) \
             ORDER BY next_attempt_at NULLS FIRST \
             LIMIT $3"
        );
        sqlx::query_as::<_, AppointmentPayment>(&query)
            .bind(now)
            .bind(stale_before)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Atomically claim a record for processing, bumping the attempt
    /// counter. A concurrent worker claiming the same record gets `None`.
    pub async fn claim_processing(
        executor: impl sqlx::PgExecutor<'_>,
        id: DbId,
    ) -> Result<Option<AppointmentPayment>, sqlx::Error> {
        let query = format!(
            "UPDATE appointment_payments \
             SET status = 'processing', attempt_count = attempt_count + 1, updated_at = NOW() \
             WHERE id = $1 AND status IN ('pending', 'failed') \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AppointmentPayment>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Reclaim a record stuck in `processing` since before `stale_before`.
    /// Does NOT bump the attempt counter: the retried gateway call must
    /// reuse the original idempotency key, otherwise an unacknowledged
    /// first charge could be charged twice.
    pub async fn reclaim_stale_processing(
        executor: impl sqlx::PgExecutor<'_>,
        id: DbId,
        stale_before: Timestamp,
    ) -> Result<Option<AppointmentPayment>, sqlx::Error> {
        let query = format!(
            "UPDATE appointment_payments \
             SET updated_at = NOW() \
             WHERE id = $1 AND status = 'processing' AND updated_at < $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AppointmentPayment>(&query)
            .bind(id)
            .bind(stale_before)
            .fetch_optional(executor)
            .await
    }

    /// Record a successful gateway charge.
    pub async fn mark_succeeded(
        executor: impl sqlx::PgExecutor<'_>,
        id: DbId,
        gateway_customer_id: &str,
        gateway_charge_id: &str,
        idempotency_key: &str,
        paid_at: Timestamp,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE appointment_payments \
             SET status = 'succeeded', gateway_customer_id = $2, gateway_charge_id = $3, \
                 idempotency_key = $4, paid_at = $5, failure_code = NULL, \
                 failure_message = NULL, next_attempt_at = NULL, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(gateway_customer_id)
        .bind(gateway_charge_id)
        .bind(idempotency_key)
        .bind(paid_at)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Record a failed attempt and schedule the retry.
    pub async fn mark_failed(
        executor: impl sqlx::PgExecutor<'_>,
        id: DbId,
        failure_code: &str,
        failure_message: &str,
        next_attempt_at: Timestamp,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE appointment_payments \
             SET status = 'failed', failure_code = $2, failure_message = $3, \
                 next_attempt_at = $4, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(failure_code)
        .bind(failure_message)
        .bind(next_attempt_at)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Terminal failure: the retry cap was reached. No further attempts
    /// happen on this record.
    pub async fn mark_abandoned(
        executor: impl sqlx::PgExecutor<'_>,
        id: DbId,
        failure_code: &str,
        failure_message: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE appointment_payments \
             SET status = 'abandoned', failure_code = $2, failure_message = $3, \
                 next_attempt_at = NULL, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(failure_code)
        .bind(failure_message)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Move every attempt record from one appointment to another (ledger
    /// transfer on reposition). Returns the number of rows moved.
    pub async fn transfer_to_appointment(
        executor: impl sqlx::PgExecutor<'_>,
        from_appointment_id: DbId,
        to_appointment_id: DbId,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE appointment_payments \
             SET appointment_id = $2, updated_at = NOW() \
             WHERE appointment_id = $1",
        )
        .bind(from_appointment_id)
        .bind(to_appointment_id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }

    /// All attempt records for an appointment, oldest first.
    pub async fn list_for_appointment(
        executor: impl sqlx::PgExecutor<'_>,
        company_id: DbId,
        appointment_id: DbId,
    ) -> Result<Vec<AppointmentPayment>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM appointment_payments \
             WHERE company_id = $1 AND appointment_id = $2 \
             ORDER BY id"
        );
        sqlx::query_as::<_, AppointmentPayment>(&query)
            .bind(company_id)
            .bind(appointment_id)
            .fetch_all(executor)
            .await
    }

    /// Sum of succeeded amounts for an appointment.
    pub async fn sum_succeeded(
        executor: impl sqlx::PgExecutor<'_>,
        appointment_id: DbId,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount_cents), 0)::BIGINT FROM appointment_payments \
             WHERE appointment_id = $1 AND status = 'succeeded'",
        )
        .bind(appointment_id)
        .fetch_one(executor)
        .await
    }
}
