//! Repository for the `events` table.

use sqlx::PgPool;

use autoscuola_core::types::{DbId, Timestamp};

use crate::models::event::StoredEvent;

const COLUMNS: &str = "\
    id, company_id, event_type, source_entity_type, source_entity_id, payload, created_at";

/// Append-only domain event log.
pub struct EventRepo;

impl EventRepo {
    /// Append one event, returning the generated id.
    pub async fn insert(
        executor: impl sqlx::PgExecutor<'_>,
        company_id: Option<DbId>,
        event_type: &str,
        source_entity_type: Option<&str>,
        source_entity_id: Option<DbId>,
        payload: &serde_json::Value,
        created_at: Timestamp,
    ) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO events \
                (company_id, event_type, source_entity_type, source_entity_id, payload, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id",
        )
        .bind(company_id)
        .bind(event_type)
        .bind(source_entity_type)
        .bind(source_entity_id)
        .bind(payload)
        .bind(created_at)
        .fetch_one(executor)
        .await
    }

    /// Most recent events for a company, newest first.
    pub async fn recent_for_company(
        pool: &PgPool,
        company_id: DbId,
        limit: i64,
    ) -> Result<Vec<StoredEvent>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM events \
             WHERE company_id = $1 \
             ORDER BY created_at DESC \
             LIMIT $2"
        );
        sqlx::query_as::<_, StoredEvent>(&query)
            .bind(company_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }
}
