//! Handlers for the `/companies/{company_id}/appointments` resource.
//!
//! Role enforcement happens in the platform gateway; these handlers trust
//! the company scope in the path and apply only the engine's own rules.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use validator::Validate;

use autoscuola_core::appointment::AppointmentStatus;
use autoscuola_core::cancellation::CancellationKind;
use autoscuola_core::error::CoreError;
use autoscuola_core::lesson::LessonType;
use autoscuola_core::types::{DbId, Timestamp};
use autoscuola_db::repositories::{AppointmentPaymentRepo, RepositionTaskRepo};
use autoscuola_engine::lifecycle::CreateAppointment;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// Body for `POST /companies/{company_id}/appointments`.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateAppointmentBody {
    pub student_id: DbId,
    pub instructor_id: DbId,
    pub vehicle_id: DbId,
    pub case_id: Option<DbId>,
    pub lesson_type: LessonType,
    pub starts_at: Timestamp,
    /// Lesson length; the engine additionally requires the 30-minute grid.
    #[validate(range(min = 30, max = 240))]
    pub duration_minutes: i32,
    /// Overrides the company default when set.
    pub payment_required: Option<bool>,
}

/// Body for `POST .../cancel-operational`.
#[derive(Debug, Deserialize)]
pub struct CancelOperationalBody {
    pub kind: CancellationKind,
    pub reason: Option<String>,
}

/// Body for `PATCH .../status`.
#[derive(Debug, Deserialize)]
pub struct UpdateStatusBody {
    pub status: AppointmentStatus,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/companies/{company_id}/appointments
///
/// Create an appointment. Fails with `SLOT_CONFLICT` when any of the three
/// resources is busy, `INVALID_RESOURCE` for inactive/foreign ids, and
/// `BOOKING_BLOCKED` while the student has an unresolved insoluto.
pub async fn create_appointment(
    State(state): State<AppState>,
    Path(company_id): Path<DbId>,
    Json(body): Json<CreateAppointmentBody>,
) -> AppResult<impl IntoResponse> {
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let appointment = state
        .lifecycle
        .create_appointment(&CreateAppointment {
            company_id,
            student_id: body.student_id,
            case_id: body.case_id,
            instructor_id: body.instructor_id,
            vehicle_id: body.vehicle_id,
            lesson_type: body.lesson_type,
            starts_at: body.starts_at,
            duration_minutes: body.duration_minutes,
            payment_required: body.payment_required,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({ "data": appointment }))))
}

/// GET /api/v1/companies/{company_id}/appointments/{id}
pub async fn get_appointment(
    State(state): State<AppState>,
    Path((company_id, appointment_id)): Path<(DbId, DbId)>,
) -> AppResult<Json<serde_json::Value>> {
    let appointment = state.lifecycle.get(company_id, appointment_id).await?;
    Ok(Json(serde_json::json!({ "data": appointment })))
}

/// POST /api/v1/companies/{company_id}/appointments/{id}/cancel-operational
///
/// Cancel because a resource became unavailable, then attempt an immediate
/// reposition. The attempt outcome does not affect the response: the task
/// stays queued for the periodic sweep either way.
pub async fn cancel_operational(
    State(state): State<AppState>,
    Path((company_id, appointment_id)): Path<(DbId, DbId)>,
    Json(body): Json<CancelOperationalBody>,
) -> AppResult<Json<serde_json::Value>> {
    let (appointment, task) = state
        .lifecycle
        .cancel_operational(company_id, appointment_id, body.kind, body.reason)
        .await?;

    if let Err(e) = state.reposition.attempt_task(task.id).await {
        tracing::warn!(
            task_id = task.id,
            error = %e,
            "Immediate reposition attempt failed, sweep will retry"
        );
    }

    Ok(Json(serde_json::json!({
        "data": { "appointment": appointment, "reposition_task_id": task.id }
    })))
}

/// PATCH /api/v1/companies/{company_id}/appointments/{id}/status
///
/// Guarded status transition (confirm, check-in, complete, no-show,
/// student-requested cancel, proposal acceptance).
pub async fn update_status(
    State(state): State<AppState>,
    Path((company_id, appointment_id)): Path<(DbId, DbId)>,
    Json(body): Json<UpdateStatusBody>,
) -> AppResult<Json<serde_json::Value>> {
    let appointment = state
        .lifecycle
        .update_status(company_id, appointment_id, body.status)
        .await?;
    Ok(Json(serde_json::json!({ "data": appointment })))
}

/// GET /api/v1/companies/{company_id}/appointments/{id}/payments
///
/// The appointment's charge attempt ledger.
pub async fn list_payments(
    State(state): State<AppState>,
    Path((company_id, appointment_id)): Path<(DbId, DbId)>,
) -> AppResult<Json<serde_json::Value>> {
    // 404 for foreign appointments before exposing any ledger rows.
    let appointment = state.lifecycle.get(company_id, appointment_id).await?;
    let payments =
        AppointmentPaymentRepo::list_for_appointment(&state.pool, company_id, appointment_id)
            .await?;
    let succeeded_total =
        AppointmentPaymentRepo::sum_succeeded(&state.pool, appointment_id).await?;
    Ok(Json(serde_json::json!({
        "data": {
            "payment_status": appointment.payment_status,
            "paid_cents": appointment.paid_cents,
            "succeeded_total_cents": succeeded_total,
            "attempts": payments,
        }
    })))
}

/// GET /api/v1/companies/{company_id}/appointments/{id}/reposition
///
/// The reposition task tracking this appointment, if any.
pub async fn get_reposition_status(
    State(state): State<AppState>,
    Path((company_id, appointment_id)): Path<(DbId, DbId)>,
) -> AppResult<Json<serde_json::Value>> {
    let appointment = state.lifecycle.get(company_id, appointment_id).await?;
    let task = RepositionTaskRepo::find_by_source(&state.pool, appointment.id).await?;
    Ok(Json(serde_json::json!({
        "data": {
            "replaced_by_appointment_id": appointment.replaced_by_appointment_id,
            "task": task,
        }
    })))
}

/// POST /api/v1/companies/{company_id}/appointments/{id}/payments/recover
///
/// One-off, user-initiated charge clearing an outstanding balance; the
/// manual path out of `insoluto`.
pub async fn manual_recovery(
    State(state): State<AppState>,
    Path((company_id, appointment_id)): Path<(DbId, DbId)>,
) -> AppResult<Json<serde_json::Value>> {
    let result = state
        .settlement
        .manual_recovery(company_id, appointment_id)
        .await?;
    Ok(Json(serde_json::json!({ "data": { "result": result.as_str() } })))
}

/// POST /api/v1/companies/{company_id}/appointments/{id}/invoice/requeue
///
/// Admin action: put a failed invoice back into the retry pool.
pub async fn requeue_invoice(
    State(state): State<AppState>,
    Path((company_id, appointment_id)): Path<(DbId, DbId)>,
) -> AppResult<impl IntoResponse> {
    state
        .finalizer
        .requeue_failed(company_id, appointment_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/companies/{company_id}/appointments/{id}
///
/// Admin-only hard purge; the only path that physically deletes.
pub async fn purge_appointment(
    State(state): State<AppState>,
    Path((company_id, appointment_id)): Path<(DbId, DbId)>,
) -> AppResult<impl IntoResponse> {
    let deleted = state.lifecycle.purge(company_id, appointment_id).await?;
    if deleted == 0 {
        return Err(CoreError::NotFound {
            entity: "Appointment",
            id: appointment_id,
        }
        .into());
    }
    Ok(StatusCode::NO_CONTENT)
}
