use autoscuola_core::error::CoreError;

/// Engine-level error: a domain error or a database failure.
///
/// Sweeps catch this per record and keep going; only the API surface maps
/// it onto response codes.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Convenience alias for engine results.
pub type EngineResult<T> = Result<T, EngineError>;
