//! Repository for the `availability_windows` table.
//!
//! Windows are written by the configuration surface and read-only to the
//! engine.

use autoscuola_core::types::{DbId, OwnerType};

use crate::models::availability_window::{AvailabilityWindow, UpsertAvailabilityWindow};

const COLUMNS: &str = "\
    id, company_id, owner_type, owner_id, weekdays, start_minute, end_minute, \
    created_at, updated_at";

/// CRUD for weekly availability rules.
pub struct AvailabilityWindowRepo;

impl AvailabilityWindowRepo {
    /// The single window for one owner, if configured.
    pub async fn find_for_owner(
        executor: impl sqlx::PgExecutor<'_>,
        company_id: DbId,
        owner_type: OwnerType,
        owner_id: DbId,
    ) -> Result<Option<AvailabilityWindow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM availability_windows \
             WHERE company_id = $1 AND owner_type = $2 AND owner_id = $3"
        );
        sqlx::query_as::<_, AvailabilityWindow>(&query)
            .bind(company_id)
            .bind(owner_type.as_str())
            .bind(owner_id)
            .fetch_optional(executor)
            .await
    }

    /// Every configured window of one owner dimension in a company. The
    /// matcher uses this as the roster of candidate instructors/vehicles.
    pub async fn list_for_owner_type(
        executor: impl sqlx::PgExecutor<'_>,
        company_id: DbId,
        owner_type: OwnerType,
    ) -> Result<Vec<AvailabilityWindow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM availability_windows \
             WHERE company_id = $1 AND owner_type = $2 \
             ORDER BY owner_id"
        );
        sqlx::query_as::<_, AvailabilityWindow>(&query)
            .bind(company_id)
            .bind(owner_type.as_str())
            .fetch_all(executor)
            .await
    }

    /// Create or replace an owner's weekly rule.
    pub async fn upsert(
        executor: impl sqlx::PgExecutor<'_>,
        company_id: DbId,
        input: &UpsertAvailabilityWindow,
    ) -> Result<AvailabilityWindow, sqlx::Error> {
        let query = format!(
            "INSERT INTO availability_windows \
                (company_id, owner_type, owner_id, weekdays, start_minute, end_minute) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (company_id, owner_type, owner_id) DO UPDATE \
                SET weekdays = EXCLUDED.weekdays, start_minute = EXCLUDED.start_minute, \
                    end_minute = EXCLUDED.end_minute, updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AvailabilityWindow>(&query)
            .bind(company_id)
            .bind(input.owner_type.as_str())
            .bind(input.owner_id)
            .bind(input.weekdays)
            .bind(input.start_minute)
            .bind(input.end_minute)
            .fetch_one(executor)
            .await
    }
}
