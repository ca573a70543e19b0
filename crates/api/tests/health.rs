//! Health endpoint and request-validation behaviour that must hold even
//! with the database down.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use common::{build_test_app, unreachable_pool};

#[tokio::test]
async fn health_reports_degraded_when_database_is_down() {
    let app = build_test_app(unreachable_pool());

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["db_healthy"], false);
}

#[tokio::test]
async fn create_appointment_rejects_off_grid_duration_before_touching_the_db() {
    let app = build_test_app(unreachable_pool());

    let body = serde_json::json!({
        "student_id": 1,
        "instructor_id": 2,
        "vehicle_id": 3,
        "lesson_type": "standard",
        "starts_at": "2099-01-04T09:00:00Z",
        "duration_minutes": 20
    });
    let response = app
        .oneshot(
            Request::post("/api/v1/companies/1/appointments")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn unknown_routes_return_404() {
    let app = build_test_app(unreachable_pool());

    let response = app
        .oneshot(
            Request::get("/api/v1/companies/1/unknown")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
