//! Periodic sweep loops.
//!
//! Each sweep runs on a fixed `tokio::time::interval` until its
//! `CancellationToken` fires. Per-row failures are handled inside the
//! engine services; a failing tick only logs and waits for the next one.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use autoscuola_engine::{InvoiceFinalizer, RepositionService, SettlementService};

use crate::config::WorkerConfig;

/// Generic fixed-interval loop with graceful cancellation.
async fn run_every<F, Fut>(name: &'static str, period: Duration, cancel: CancellationToken, mut tick: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    tracing::info!(sweep = name, period_secs = period.as_secs(), "Sweep started");
    let mut interval = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(sweep = name, "Sweep stopping");
                break;
            }
            _ = interval.tick() => tick().await,
        }
    }
}

/// Attempt due reposition tasks.
pub async fn run_reposition(
    service: Arc<RepositionService>,
    config: WorkerConfig,
    cancel: CancellationToken,
) {
    run_every("reposition", config.reposition_interval, cancel, move || {
        let service = Arc::clone(&service);
        let limit = config.batch_limit;
        async move {
            match service.attempt_due(limit).await {
                Ok(0) => tracing::debug!("Reposition sweep: nothing due"),
                Ok(n) => tracing::info!(attempted = n, "Reposition sweep finished"),
                Err(e) => tracing::error!(error = %e, "Reposition sweep failed"),
            }
        }
    })
    .await;
}

/// Queue penalty charges for late cancellations and no-shows.
pub async fn run_penalty(
    service: Arc<SettlementService>,
    config: WorkerConfig,
    cancel: CancellationToken,
) {
    run_every("penalty", config.penalty_interval, cancel, move || {
        let service = Arc::clone(&service);
        let limit = config.batch_limit;
        async move {
            match service.run_penalty_sweep(limit).await {
                Ok(0) => tracing::debug!("Penalty sweep: nothing due"),
                Ok(n) => tracing::info!(examined = n, "Penalty sweep finished"),
                Err(e) => tracing::error!(error = %e, "Penalty sweep failed"),
            }
        }
    })
    .await;
}

/// Queue final balancing charges for finalizable appointments.
pub async fn run_settlement(
    service: Arc<SettlementService>,
    config: WorkerConfig,
    cancel: CancellationToken,
) {
    run_every("settlement", config.settlement_interval, cancel, move || {
        let service = Arc::clone(&service);
        let limit = config.batch_limit;
        async move {
            match service.run_settlement_sweep(limit).await {
                Ok(0) => tracing::debug!("Settlement sweep: nothing due"),
                Ok(n) => tracing::info!(examined = n, "Settlement sweep finished"),
                Err(e) => tracing::error!(error = %e, "Settlement sweep failed"),
            }
        }
    })
    .await;
}

/// Retry failed charge attempts whose backoff elapsed.
pub async fn run_charges(
    service: Arc<SettlementService>,
    config: WorkerConfig,
    cancel: CancellationToken,
) {
    run_every("charges", config.charge_interval, cancel, move || {
        let service = Arc::clone(&service);
        let limit = config.batch_limit;
        async move {
            match service.run_charge_sweep(limit).await {
                Ok(0) => tracing::debug!("Charge sweep: nothing due"),
                Ok(n) => tracing::info!(attempted = n, "Charge sweep finished"),
                Err(e) => tracing::error!(error = %e, "Charge sweep failed"),
            }
        }
    })
    .await;
}

/// Issue invoices for settled appointments.
pub async fn run_invoicing(
    service: Arc<InvoiceFinalizer>,
    config: WorkerConfig,
    cancel: CancellationToken,
) {
    run_every("invoicing", config.invoice_interval, cancel, move || {
        let service = Arc::clone(&service);
        let limit = config.batch_limit;
        async move {
            match service.run_sweep(limit).await {
                Ok(0) => tracing::debug!("Invoice sweep: nothing due"),
                Ok(n) => tracing::info!(examined = n, "Invoice sweep finished"),
                Err(e) => tracing::error!(error = %e, "Invoice sweep failed"),
            }
        }
    })
    .await;
}
