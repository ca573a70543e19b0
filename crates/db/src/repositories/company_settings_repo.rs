//! Repository for the `company_settings` table.

use autoscuola_core::types::DbId;

use crate::models::company_settings::{CompanySettings, UpsertCompanySettings};

const COLUMNS: &str = "\
    company_id, time_zone, currency, price_per_slot_cents, penalty_percent, \
    penalty_cutoff_hours, payment_required_default, gateway_destination_account, \
    invoicing_vat_rule_ref, invoicing_payment_method_ref, created_at, updated_at";

/// CRUD for per-company engine configuration.
pub struct CompanySettingsRepo;

impl CompanySettingsRepo {
    pub async fn find(
        executor: impl sqlx::PgExecutor<'_>,
        company_id: DbId,
    ) -> Result<Option<CompanySettings>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM company_settings WHERE company_id = $1");
        sqlx::query_as::<_, CompanySettings>(&query)
            .bind(company_id)
            .fetch_optional(executor)
            .await
    }

    /// Create or replace a company's settings.
    pub async fn upsert(
        executor: impl sqlx::PgExecutor<'_>,
        company_id: DbId,
        input: &UpsertCompanySettings,
    ) -> Result<CompanySettings, sqlx::Error> {
        let query = format!(
            "INSERT INTO company_settings \
                (company_id, time_zone, currency, price_per_slot_cents, penalty_percent, \
                 penalty_cutoff_hours, payment_required_default, gateway_destination_account, \
                 invoicing_vat_rule_ref, invoicing_payment_method_ref) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (company_id) DO UPDATE \
                SET time_zone = EXCLUDED.time_zone, currency = EXCLUDED.currency, \
                    price_per_slot_cents = EXCLUDED.price_per_slot_cents, \
                    penalty_percent = EXCLUDED.penalty_percent, \
                    penalty_cutoff_hours = EXCLUDED.penalty_cutoff_hours, \
                    payment_required_default = EXCLUDED.payment_required_default, \
                    gateway_destination_account = EXCLUDED.gateway_destination_account, \
                    invoicing_vat_rule_ref = EXCLUDED.invoicing_vat_rule_ref, \
                    invoicing_payment_method_ref = EXCLUDED.invoicing_payment_method_ref, \
                    updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, CompanySettings>(&query)
            .bind(company_id)
            .bind(&input.time_zone)
            .bind(&input.currency)
            .bind(input.price_per_slot_cents)
            .bind(input.penalty_percent)
            .bind(input.penalty_cutoff_hours)
            .bind(input.payment_required_default)
            .bind(&input.gateway_destination_account)
            .bind(&input.invoicing_vat_rule_ref)
            .bind(&input.invoicing_payment_method_ref)
            .fetch_one(executor)
            .await
    }
}
