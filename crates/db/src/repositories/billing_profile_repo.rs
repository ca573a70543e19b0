//! Repository for the `billing_profiles` table.

use autoscuola_core::types::DbId;

use crate::models::billing_profile::BillingProfile;

const COLUMNS: &str = "\
    id, company_id, student_id, gateway_customer_id, payment_method_id, \
    created_at, updated_at";

/// Student billing profile operations.
pub struct BillingProfileRepo;

impl BillingProfileRepo {
    pub async fn find_for_student(
        executor: impl sqlx::PgExecutor<'_>,
        company_id: DbId,
        student_id: DbId,
    ) -> Result<Option<BillingProfile>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM billing_profiles \
             WHERE company_id = $1 AND student_id = $2"
        );
        sqlx::query_as::<_, BillingProfile>(&query)
            .bind(company_id)
            .bind(student_id)
            .fetch_optional(executor)
            .await
    }

    /// Store the gateway customer created for a student, preserving any
    /// stored payment method.
    pub async fn save_gateway_customer(
        executor: impl sqlx::PgExecutor<'_>,
        company_id: DbId,
        student_id: DbId,
        gateway_customer_id: &str,
    ) -> Result<BillingProfile, sqlx::Error> {
        let query = format!(
            "INSERT INTO billing_profiles (company_id, student_id, gateway_customer_id) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (company_id, student_id) DO UPDATE \
                SET gateway_customer_id = EXCLUDED.gateway_customer_id, updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, BillingProfile>(&query)
            .bind(company_id)
            .bind(student_id)
            .bind(gateway_customer_id)
            .fetch_one(executor)
            .await
    }

    /// Store the payment method collected by the enrollment flow.
    pub async fn save_payment_method(
        executor: impl sqlx::PgExecutor<'_>,
        company_id: DbId,
        student_id: DbId,
        payment_method_id: &str,
    ) -> Result<BillingProfile, sqlx::Error> {
        let query = format!(
            "INSERT INTO billing_profiles (company_id, student_id, payment_method_id) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (company_id, student_id) DO UPDATE \
                SET payment_method_id = EXCLUDED.payment_method_id, updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, BillingProfile>(&query)
            .bind(company_id)
            .bind(student_id)
            .bind(payment_method_id)
            .fetch_one(executor)
            .await
    }
}
