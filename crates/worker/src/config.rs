use std::time::Duration;

/// Worker configuration loaded from environment variables.
///
/// All intervals have defaults suitable for production; tests and local
/// runs can tighten them via the environment.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How often pending reposition tasks are attempted.
    pub reposition_interval: Duration,
    /// How often the penalty sweep runs.
    pub penalty_interval: Duration,
    /// How often the settlement sweep runs.
    pub settlement_interval: Duration,
    /// How often failed charge attempts are retried.
    pub charge_interval: Duration,
    /// How often the invoice finalizer runs.
    pub invoice_interval: Duration,
    /// Maximum rows pulled per sweep tick.
    pub batch_limit: i64,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                          | Default |
    /// |----------------------------------|---------|
    /// | `REPOSITION_INTERVAL_SECS`       | `60`    |
    /// | `PENALTY_SWEEP_INTERVAL_SECS`    | `300`   |
    /// | `SETTLEMENT_SWEEP_INTERVAL_SECS` | `300`   |
    /// | `CHARGE_SWEEP_INTERVAL_SECS`     | `300`   |
    /// | `INVOICE_SWEEP_INTERVAL_SECS`    | `600`   |
    /// | `SWEEP_BATCH_LIMIT`              | `100`   |
    pub fn from_env() -> Self {
        Self {
            reposition_interval: secs_var("REPOSITION_INTERVAL_SECS", 60),
            penalty_interval: secs_var("PENALTY_SWEEP_INTERVAL_SECS", 300),
            settlement_interval: secs_var("SETTLEMENT_SWEEP_INTERVAL_SECS", 300),
            charge_interval: secs_var("CHARGE_SWEEP_INTERVAL_SECS", 300),
            invoice_interval: secs_var("INVOICE_SWEEP_INTERVAL_SECS", 600),
            batch_limit: std::env::var("SWEEP_BATCH_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(100),
        }
    }
}

fn secs_var(name: &str, default: u64) -> Duration {
    Duration::from_secs(
        std::env::var(name)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default),
    )
}
