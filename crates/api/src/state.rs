use std::sync::Arc;

use autoscuola_engine::{
    InvoiceFinalizer, LifecycleManager, RepositionService, SettlementService,
};
use autoscuola_events::EventBus;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via
/// `State<AppState>`. Cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: autoscuola_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Centralized event bus for publishing domain events.
    pub event_bus: Arc<EventBus>,
    /// Appointment creation, cancellation and status transitions.
    pub lifecycle: Arc<LifecycleManager>,
    /// Reposition queue (immediate-attempt path).
    pub reposition: Arc<RepositionService>,
    /// Payment settlement machine (manual recovery path).
    pub settlement: Arc<SettlementService>,
    /// Invoice finalizer (admin re-queue path).
    pub finalizer: Arc<InvoiceFinalizer>,
}
