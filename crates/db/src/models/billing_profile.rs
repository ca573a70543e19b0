//! Student billing profile entity.

use serde::Serialize;
use sqlx::FromRow;

use autoscuola_core::types::{DbId, Timestamp};

/// A row from the `billing_profiles` table: the student's gateway customer
/// and the stored payment method used for off-session charges.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BillingProfile {
    pub id: DbId,
    pub company_id: DbId,
    pub student_id: DbId,
    pub gateway_customer_id: Option<String>,
    pub payment_method_id: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
