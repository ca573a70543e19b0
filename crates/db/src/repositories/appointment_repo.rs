//! Repository for the `appointments` table.

use sqlx::PgPool;

use autoscuola_core::appointment::AppointmentStatus;
use autoscuola_core::cancellation::CancellationKind;
use autoscuola_core::payment::{InvoiceStatus, PaymentStatus};
use autoscuola_core::types::{DbId, OwnerType, Timestamp};

use crate::models::appointment::{Appointment, NewAppointment};

const COLUMNS: &str = "\
    id, company_id, student_id, case_id, lesson_type, status, starts_at, ends_at, \
    instructor_id, vehicle_id, cancelled_at, cancellation_kind, cancellation_reason, \
    replaced_by_appointment_id, payment_required, price_cents, penalty_cents, paid_cents, \
    currency, penalty_cutoff_at, payment_status, payment_status_locked, invoice_status, \
    invoice_id, created_at, updated_at";

/// The column holding the given resource dimension's owner id.
fn owner_column(owner_type: OwnerType) -> &'static str {
    match owner_type {
        OwnerType::Student => "student_id",
        OwnerType::Instructor => "instructor_id",
        OwnerType::Vehicle => "vehicle_id",
    }
}

/// CRUD and scan queries for appointments.
pub struct AppointmentRepo;

impl AppointmentRepo {
    /// Insert a new appointment, returning the stored row.
    pub async fn insert(
        executor: impl sqlx::PgExecutor<'_>,
        new: &NewAppointment,
    ) -> Result<Appointment, sqlx::Error> {
        let query = format!(
            "INSERT INTO appointments (\
                company_id, student_id, case_id, lesson_type, status, starts_at, ends_at, \
                instructor_id, vehicle_id, payment_required, price_cents, penalty_cents, \
                paid_cents, currency, penalty_cutoff_at, payment_status, \
                payment_status_locked, invoice_status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Appointment>(&query)
            .bind(new.company_id)
            .bind(new.student_id)
            .bind(new.case_id)
            .bind(new.lesson_type.as_str())
            .bind(new.status.as_str())
            .bind(new.starts_at)
            .bind(new.ends_at)
            .bind(new.instructor_id)
            .bind(new.vehicle_id)
            .bind(new.payment_required)
            .bind(new.price_cents)
            .bind(new.penalty_cents)
            .bind(new.paid_cents)
            .bind(&new.currency)
            .bind(new.penalty_cutoff_at)
            .bind(new.payment_status.as_str())
            .bind(new.payment_status_locked)
            .bind(new.invoice_status.as_str())
            .fetch_one(executor)
            .await
    }

    /// Find an appointment by id within a company.
    pub async fn find_by_id(
        executor: impl sqlx::PgExecutor<'_>,
        company_id: DbId,
        id: DbId,
    ) -> Result<Option<Appointment>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM appointments WHERE company_id = $1 AND id = $2");
        sqlx::query_as::<_, Appointment>(&query)
            .bind(company_id)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Find an appointment by id and lock the row for the current
    /// transaction. Used by the reposition success path to serialize
    /// concurrent resolutions of the same source.
    pub async fn lock_by_id(
        executor: impl sqlx::PgExecutor<'_>,
        id: DbId,
    ) -> Result<Option<Appointment>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM appointments WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, Appointment>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Non-cancelled appointments of any of the three booked resources
    /// overlapping `[from, to)`. Drives the booking conflict check.
    pub async fn conflicts_for_booking(
        executor: impl sqlx::PgExecutor<'_>,
        company_id: DbId,
        student_id: DbId,
        instructor_id: DbId,
        vehicle_id: DbId,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<Appointment>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM appointments \
             WHERE company_id = $1 \
               AND status <> 'cancelled' \
               AND starts_at < $5 AND ends_at > $6 \
               AND (student_id = $2 OR instructor_id = $3 OR vehicle_id = $4) \
             ORDER BY starts_at"
        );
        sqlx::query_as::<_, Appointment>(&query)
            .bind(company_id)
            .bind(student_id)
            .bind(instructor_id)
            .bind(vehicle_id)
            .bind(to)
            .bind(from)
            .fetch_all(executor)
            .await
    }

    /// Non-cancelled appointments of one owner overlapping `[from, to)`.
    pub async fn busy_for_owner(
        executor: impl sqlx::PgExecutor<'_>,
        company_id: DbId,
        owner_type: OwnerType,
        owner_id: DbId,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<Appointment>, sqlx::Error> {
        let column = owner_column(owner_type);
        let query = format!(
            "SELECT {COLUMNS} FROM appointments \
             WHERE company_id = $1 \
               AND status <> 'cancelled' \
               AND {column} = $2 \
               AND starts_at < $3 AND ends_at > $4 \
             ORDER BY starts_at"
        );
        sqlx::query_as::<_, Appointment>(&query)
            .bind(company_id)
            .bind(owner_id)
            .bind(to)
            .bind(from)
            .fetch_all(executor)
            .await
    }

    /// Non-cancelled appointments of every owner of one dimension
    /// overlapping `[from, to)`. Feeds the availability index bulk load.
    pub async fn busy_for_owner_type(
        executor: impl sqlx::PgExecutor<'_>,
        company_id: DbId,
        owner_type: OwnerType,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<Appointment>, sqlx::Error> {
        let column = owner_column(owner_type);
        let query = format!(
            "SELECT {COLUMNS} FROM appointments \
             WHERE company_id = $1 \
               AND status <> 'cancelled' \
               AND starts_at < $2 AND ends_at > $3 \
             ORDER BY {column}, starts_at"
        );
        sqlx::query_as::<_, Appointment>(&query)
            .bind(company_id)
            .bind(to)
            .bind(from)
            .fetch_all(executor)
            .await
    }

    /// An unexpired replacement proposal still open for the student, if any.
    pub async fn open_proposal_for_student(
        executor: impl sqlx::PgExecutor<'_>,
        company_id: DbId,
        student_id: DbId,
        now: Timestamp,
        exclude_id: DbId,
    ) -> Result<Option<Appointment>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM appointments \
             WHERE company_id = $1 AND student_id = $2 \
               AND status = 'proposal' AND starts_at > $3 AND id <> $4 \
             ORDER BY starts_at \
             LIMIT 1"
        );
        sqlx::query_as::<_, Appointment>(&query)
            .bind(company_id)
            .bind(student_id)
            .bind(now)
            .bind(exclude_id)
            .fetch_optional(executor)
            .await
    }

    /// Whether the student has any appointment in `insoluto`, which blocks
    /// further paid bookings until manually resolved.
    pub async fn has_insoluto_balance(
        executor: impl sqlx::PgExecutor<'_>,
        company_id: DbId,
        student_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS (\
                SELECT 1 FROM appointments \
                WHERE company_id = $1 AND student_id = $2 AND payment_status = 'insoluto')",
        )
        .bind(company_id)
        .bind(student_id)
        .fetch_one(executor)
        .await
    }

    /// Update the lifecycle status.
    pub async fn set_status(
        executor: impl sqlx::PgExecutor<'_>,
        id: DbId,
        status: AppointmentStatus,
    ) -> Result<Appointment, sqlx::Error> {
        let query = format!(
            "UPDATE appointments SET status = $2, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Appointment>(&query)
            .bind(id)
            .bind(status.as_str())
            .fetch_one(executor)
            .await
    }

    /// Cancel an appointment, stamping the cancellation metadata.
    pub async fn mark_cancelled(
        executor: impl sqlx::PgExecutor<'_>,
        id: DbId,
        cancelled_at: Timestamp,
        kind: CancellationKind,
        reason: Option<&str>,
    ) -> Result<Appointment, sqlx::Error> {
        let query = format!(
            "UPDATE appointments \
             SET status = 'cancelled', cancelled_at = $2, cancellation_kind = $3, \
                 cancellation_reason = $4, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Appointment>(&query)
            .bind(id)
            .bind(cancelled_at)
            .bind(kind.as_str())
            .bind(reason)
            .fetch_one(executor)
            .await
    }

    /// Set the forward replacement link, exactly once. Returns `false` when
    /// the link was already set (the existing value wins).
    pub async fn set_replaced_by(
        executor: impl sqlx::PgExecutor<'_>,
        source_id: DbId,
        replacement_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE appointments \
             SET replaced_by_appointment_id = $2, updated_at = NOW() \
             WHERE id = $1 AND replaced_by_appointment_id IS NULL",
        )
        .bind(source_id)
        .bind(replacement_id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Overwrite the derived payment status (and its override lock).
    pub async fn set_payment_status(
        executor: impl sqlx::PgExecutor<'_>,
        id: DbId,
        status: PaymentStatus,
        locked: bool,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE appointments \
             SET payment_status = $2, payment_status_locked = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(locked)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Add a succeeded charge amount to the running paid total.
    pub async fn add_paid(
        executor: impl sqlx::PgExecutor<'_>,
        id: DbId,
        delta_cents: i64,
    ) -> Result<Appointment, sqlx::Error> {
        let query = format!(
            "UPDATE appointments \
             SET paid_cents = paid_cents + $2, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Appointment>(&query)
            .bind(id)
            .bind(delta_cents)
            .fetch_one(executor)
            .await
    }

    /// Overwrite the paid total (ledger transfer between source and
    /// replacement).
    pub async fn set_paid(
        executor: impl sqlx::PgExecutor<'_>,
        id: DbId,
        paid_cents: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE appointments SET paid_cents = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(paid_cents)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Appointments owing a penalty: cancelled or no-show, payment still
    /// outstanding, and past their cutoff (or cancelled with none).
    pub async fn penalty_sweep_candidates(
        pool: &PgPool,
        now: Timestamp,
        limit: i64,
    ) -> Result<Vec<Appointment>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM appointments \
             WHERE payment_required \
               AND status IN ('cancelled', 'no_show') \
               AND payment_status IN ('pending_penalty', 'partial_paid') \
               AND (penalty_cutoff_at IS NULL OR penalty_cutoff_at <= $1) \
             ORDER BY penalty_cutoff_at NULLS FIRST \
             LIMIT $2"
        );
        sqlx::query_as::<_, Appointment>(&query)
            .bind(now)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Appointments ready for the final balancing charge: outcome known
    /// (terminal status) or scheduled end elapsed, with an open balance.
    pub async fn settlement_sweep_candidates(
        pool: &PgPool,
        now: Timestamp,
        limit: i64,
    ) -> Result<Vec<Appointment>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM appointments \
             WHERE payment_required \
               AND payment_status IN ('pending_penalty', 'partial_paid') \
               AND (status IN ('completed', 'no_show', 'cancelled') OR ends_at <= $1) \
             ORDER BY ends_at \
             LIMIT $2"
        );
        sqlx::query_as::<_, Appointment>(&query)
            .bind(now)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Appointments eligible for invoice issuance: payment required, no
    /// invoice yet, in a retryable invoice status, and finalizable.
    pub async fn invoice_sweep_candidates(
        pool: &PgPool,
        now: Timestamp,
        limit: i64,
    ) -> Result<Vec<Appointment>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM appointments \
             WHERE payment_required \
               AND invoice_id IS NULL \
               AND invoice_status IN ('pending', 'pending_fic') \
               AND (status IN ('completed', 'no_show', 'cancelled') OR ends_at <= $1) \
             ORDER BY ends_at \
             LIMIT $2"
        );
        sqlx::query_as::<_, Appointment>(&query)
            .bind(now)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Update the invoice issuance status.
    pub async fn set_invoice_status(
        executor: impl sqlx::PgExecutor<'_>,
        id: DbId,
        status: InvoiceStatus,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE appointments SET invoice_status = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Store the provider invoice id. Guarded on `invoice_id IS NULL` so an
    /// invoice can never be recorded twice; returns `false` if one existed.
    pub async fn set_invoice_issued(
        executor: impl sqlx::PgExecutor<'_>,
        id: DbId,
        invoice_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE appointments \
             SET invoice_id = $2, invoice_status = 'issued', updated_at = NOW() \
             WHERE id = $1 AND invoice_id IS NULL",
        )
        .bind(id)
        .bind(invoice_id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Admin-only hard delete. Payments and tasks cascade.
    pub async fn purge(
        executor: impl sqlx::PgExecutor<'_>,
        company_id: DbId,
        id: DbId,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM appointments WHERE company_id = $1 AND id = $2")
            .bind(company_id)
            .bind(id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }
}
