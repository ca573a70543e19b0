use std::sync::Arc;
use std::time::Duration;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, StatusCode};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;

use autoscuola_api::config::ServerConfig;
use autoscuola_api::routes;
use autoscuola_api::state::AppState;
use autoscuola_core::ports::SystemClock;
use autoscuola_engine::stubs::{DefaultActiveDirectory, UnconfiguredGateway, UnconfiguredInvoicing};
use autoscuola_engine::{
    InvoiceFinalizer, LifecycleManager, RepositionService, ResourceMatcher, SettlementService,
};
use autoscuola_events::EventBus;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
    }
}

/// A lazily-connecting pool pointed at a port nothing listens on, for
/// tests that never reach the database (or expect it to be down).
pub fn unreachable_pool() -> PgPool {
    PgPoolOptions::new()
        .acquire_timeout(Duration::from_secs(2))
        .connect_lazy("postgres://localhost:1/autoscuola_test")
        .expect("lazy pool construction should not fail")
}

/// Build the full application router with all middleware layers, using the
/// given database pool.
///
/// This mirrors the router construction in `main.rs` so integration tests
/// exercise the same middleware stack (CORS, request ID, timeout, panic
/// recovery) that production uses.
pub fn build_test_app(pool: PgPool) -> Router {
    let config = test_config();
    let event_bus = Arc::new(EventBus::default());
    let directory = Arc::new(DefaultActiveDirectory);
    let clock = Arc::new(SystemClock);

    let lifecycle = Arc::new(LifecycleManager::new(
        pool.clone(),
        directory.clone(),
        Arc::clone(&event_bus),
        clock.clone(),
    ));
    let reposition = Arc::new(RepositionService::new(
        pool.clone(),
        ResourceMatcher::new(pool.clone(), directory.clone()),
        Arc::clone(&event_bus),
        clock.clone(),
    ));
    let settlement = Arc::new(SettlementService::new(
        pool.clone(),
        Arc::new(UnconfiguredGateway),
        directory,
        Arc::clone(&event_bus),
        clock.clone(),
    ));
    let finalizer = Arc::new(InvoiceFinalizer::new(
        pool.clone(),
        Arc::new(UnconfiguredInvoicing),
        Arc::clone(&event_bus),
        clock,
    ));

    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        event_bus,
        lifecycle,
        reposition,
        settlement,
        finalizer,
    };

    let request_id_header = HeaderName::from_static("x-request-id");

    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(
            CorsLayer::new()
                .allow_origin(["http://localhost:5173".parse().unwrap()])
                .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
                .allow_headers([CONTENT_TYPE, AUTHORIZATION]),
        )
        .with_state(state)
}
