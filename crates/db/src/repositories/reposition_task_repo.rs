//! Repository for the `reposition_tasks` table.

use sqlx::PgPool;

use autoscuola_core::cancellation::CancellationKind;
use autoscuola_core::types::{DbId, Timestamp};

use crate::models::reposition_task::RepositionTask;

const COLUMNS: &str = "\
    id, company_id, source_appointment_id, student_id, status, reason, attempt_count, \
    last_attempt_at, next_attempt_at, matched_appointment_id, created_at, updated_at";

/// Queue operations for reposition tasks.
pub struct RepositionTaskRepo;

impl RepositionTaskRepo {
    /// Idempotent enqueue keyed on the source appointment.
    ///
    /// A fresh cancellation inserts a pending task; re-cancelling an
    /// already-queued appointment only resets its `next_attempt_at`. A task
    /// that already reached a terminal status is left untouched, in which
    /// case `None` is returned and the caller reads the existing row.
    pub async fn upsert_pending(
        executor: impl sqlx::PgExecutor<'_>,
        company_id: DbId,
        source_appointment_id: DbId,
        student_id: DbId,
        reason: CancellationKind,
        next_attempt_at: Timestamp,
    ) -> Result<Option<RepositionTask>, sqlx::Error> {
        let query = format!(
            "INSERT INTO reposition_tasks \
                (company_id, source_appointment_id, student_id, status, reason, next_attempt_at) \
             VALUES ($1, $2, $3, 'pending', $4, $5) \
             ON CONFLICT (source_appointment_id) DO UPDATE \
                SET next_attempt_at = EXCLUDED.next_attempt_at, updated_at = NOW() \
                WHERE reposition_tasks.status = 'pending' \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RepositionTask>(&query)
            .bind(company_id)
            .bind(source_appointment_id)
            .bind(student_id)
            .bind(reason.as_str())
            .bind(next_attempt_at)
            .fetch_optional(executor)
            .await
    }

    pub async fn find_by_id(
        executor: impl sqlx::PgExecutor<'_>,
        id: DbId,
    ) -> Result<Option<RepositionTask>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM reposition_tasks WHERE id = $1");
        sqlx::query_as::<_, RepositionTask>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    pub async fn find_by_source(
        executor: impl sqlx::PgExecutor<'_>,
        source_appointment_id: DbId,
    ) -> Result<Option<RepositionTask>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM reposition_tasks WHERE source_appointment_id = $1");
        sqlx::query_as::<_, RepositionTask>(&query)
            .bind(source_appointment_id)
            .fetch_optional(executor)
            .await
    }

    /// Pending tasks whose next attempt is due, oldest first.
    pub async fn due(
        pool: &PgPool,
        now: Timestamp,
        limit: i64,
    ) -> Result<Vec<RepositionTask>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM reposition_tasks \
             WHERE status = 'pending' AND next_attempt_at <= $1 \
             ORDER BY next_attempt_at \
             LIMIT $2"
        );
        sqlx::query_as::<_, RepositionTask>(&query)
            .bind(now)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Record a fruitless attempt: bump the counter and schedule the next
    /// try. Only applies while the task is still pending.
    pub async fn record_deferred_attempt(
        executor: impl sqlx::PgExecutor<'_>,
        id: DbId,
        attempted_at: Timestamp,
        next_attempt_at: Timestamp,
    ) -> Result<Option<RepositionTask>, sqlx::Error> {
        let query = format!(
            "UPDATE reposition_tasks \
             SET attempt_count = attempt_count + 1, last_attempt_at = $2, \
                 next_attempt_at = $3, updated_at = NOW() \
             WHERE id = $1 AND status = 'pending' \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RepositionTask>(&query)
            .bind(id)
            .bind(attempted_at)
            .bind(next_attempt_at)
            .fetch_optional(executor)
            .await
    }

    /// Terminal success: a replacement proposal exists for the source.
    pub async fn mark_matched(
        executor: impl sqlx::PgExecutor<'_>,
        id: DbId,
        matched_appointment_id: DbId,
        attempted_at: Timestamp,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE reposition_tasks \
             SET status = 'matched', matched_appointment_id = $2, \
                 attempt_count = attempt_count + 1, last_attempt_at = $3, updated_at = NOW() \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(matched_appointment_id)
        .bind(attempted_at)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Terminal expiry: the source's start elapsed with no match.
    pub async fn mark_cancelled(
        executor: impl sqlx::PgExecutor<'_>,
        id: DbId,
        attempted_at: Timestamp,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE reposition_tasks \
             SET status = 'cancelled', last_attempt_at = $2, updated_at = NOW() \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(attempted_at)
        .execute(executor)
        .await?;
        Ok(())
    }
}
