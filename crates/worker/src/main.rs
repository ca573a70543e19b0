use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use autoscuola_core::ports::SystemClock;
use autoscuola_engine::stubs::{
    DefaultActiveDirectory, LoggingDispatcher, UnconfiguredGateway, UnconfiguredInvoicing,
};
use autoscuola_engine::{InvoiceFinalizer, RepositionService, ResourceMatcher, SettlementService};
use autoscuola_events::{EventBus, EventPersistence, NotificationForwarder};
use autoscuola_worker::config::WorkerConfig;
use autoscuola_worker::sweeps;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "autoscuola_worker=debug,autoscuola_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = WorkerConfig::from_env();
    tracing::info!(?config, "Loaded worker configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = autoscuola_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    autoscuola_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    autoscuola_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database ready");

    // --- Event bus + background event services ---
    let bus = Arc::new(EventBus::default());
    let persistence_handle = tokio::spawn(EventPersistence::run(pool.clone(), bus.subscribe()));
    let forwarder = NotificationForwarder::new(Arc::new(LoggingDispatcher));
    let forwarder_handle = tokio::spawn(forwarder.run(bus.subscribe()));

    // --- External collaborator ports (stand-ins until wired) ---
    let directory = Arc::new(DefaultActiveDirectory);
    let gateway = Arc::new(UnconfiguredGateway);
    let invoicing = Arc::new(UnconfiguredInvoicing);
    let clock = Arc::new(SystemClock);

    // --- Engine services ---
    let matcher = ResourceMatcher::new(pool.clone(), directory.clone());
    let reposition = Arc::new(RepositionService::new(
        pool.clone(),
        matcher,
        Arc::clone(&bus),
        clock.clone(),
    ));
    let settlement = Arc::new(SettlementService::new(
        pool.clone(),
        gateway,
        directory.clone(),
        Arc::clone(&bus),
        clock.clone(),
    ));
    let finalizer = Arc::new(InvoiceFinalizer::new(
        pool.clone(),
        invoicing,
        Arc::clone(&bus),
        clock,
    ));

    // --- Sweeps ---
    let cancel = CancellationToken::new();
    let handles = vec![
        tokio::spawn(sweeps::run_reposition(
            Arc::clone(&reposition),
            config.clone(),
            cancel.clone(),
        )),
        tokio::spawn(sweeps::run_penalty(
            Arc::clone(&settlement),
            config.clone(),
            cancel.clone(),
        )),
        tokio::spawn(sweeps::run_settlement(
            Arc::clone(&settlement),
            config.clone(),
            cancel.clone(),
        )),
        tokio::spawn(sweeps::run_charges(
            Arc::clone(&settlement),
            config.clone(),
            cancel.clone(),
        )),
        tokio::spawn(sweeps::run_invoicing(
            Arc::clone(&finalizer),
            config.clone(),
            cancel.clone(),
        )),
    ];
    tracing::info!("Worker started, all sweeps running");

    // --- Shutdown ---
    shutdown_signal().await;
    tracing::info!("Shutdown signal received, stopping sweeps");
    cancel.cancel();
    for handle in handles {
        let _ = tokio::time::timeout(Duration::from_secs(10), handle).await;
    }

    // Drop the bus sender to close the broadcast channel; the event
    // services exit when the channel closes.
    drop(bus);
    let _ = tokio::time::timeout(Duration::from_secs(5), persistence_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), forwarder_handle).await;

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the worker shuts
/// down cleanly whether stopped interactively or by a process manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
