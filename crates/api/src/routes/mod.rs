//! Route tree.

pub mod health;

use axum::routing::{get, patch, post};
use axum::Router;

use crate::handlers::appointments;
use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /companies/{company_id}/appointments                       create
/// /companies/{company_id}/appointments/{id}                  get, purge (admin)
/// /companies/{company_id}/appointments/{id}/status           transition
/// /companies/{company_id}/appointments/{id}/cancel-operational
/// /companies/{company_id}/appointments/{id}/payments         ledger
/// /companies/{company_id}/appointments/{id}/payments/recover manual recovery
/// /companies/{company_id}/appointments/{id}/reposition       task status
/// /companies/{company_id}/appointments/{id}/invoice/requeue  admin re-queue
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/companies/{company_id}/appointments",
            post(appointments::create_appointment),
        )
        .route(
            "/companies/{company_id}/appointments/{id}",
            get(appointments::get_appointment).delete(appointments::purge_appointment),
        )
        .route(
            "/companies/{company_id}/appointments/{id}/status",
            patch(appointments::update_status),
        )
        .route(
            "/companies/{company_id}/appointments/{id}/cancel-operational",
            post(appointments::cancel_operational),
        )
        .route(
            "/companies/{company_id}/appointments/{id}/payments",
            get(appointments::list_payments),
        )
        .route(
            "/companies/{company_id}/appointments/{id}/payments/recover",
            post(appointments::manual_recovery),
        )
        .route(
            "/companies/{company_id}/appointments/{id}/reposition",
            get(appointments::get_reposition_status),
        )
        .route(
            "/companies/{company_id}/appointments/{id}/invoice/requeue",
            post(appointments::requeue_invoice),
        )
}
