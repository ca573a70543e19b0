//! Per-company engine configuration.

use chrono::Duration;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use autoscuola_core::error::CoreError;
use autoscuola_core::time::parse_time_zone;
use autoscuola_core::types::{DbId, Timestamp};

/// A row from the `company_settings` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CompanySettings {
    pub company_id: DbId,
    pub time_zone: String,
    pub currency: String,
    pub price_per_slot_cents: i64,
    pub penalty_percent: i32,
    pub penalty_cutoff_hours: i32,
    pub payment_required_default: bool,
    pub gateway_destination_account: Option<String>,
    pub invoicing_vat_rule_ref: Option<String>,
    pub invoicing_payment_method_ref: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl CompanySettings {
    /// The company's IANA time zone, used for all wall-clock computation.
    pub fn tz(&self) -> Result<Tz, CoreError> {
        parse_time_zone(&self.time_zone)
    }

    /// The instant before which a cancellation is fully waived.
    pub fn penalty_cutoff_for(&self, starts_at: Timestamp) -> Timestamp {
        starts_at - Duration::hours(i64::from(self.penalty_cutoff_hours))
    }
}

/// Upsert DTO for company settings (configuration surface).
#[derive(Debug, Clone, Deserialize)]
pub struct UpsertCompanySettings {
    pub time_zone: String,
    pub currency: String,
    pub price_per_slot_cents: i64,
    pub penalty_percent: i32,
    pub penalty_cutoff_hours: i32,
    pub payment_required_default: bool,
    pub gateway_destination_account: Option<String>,
    pub invoicing_vat_rule_ref: Option<String>,
    pub invoicing_payment_method_ref: Option<String>,
}
