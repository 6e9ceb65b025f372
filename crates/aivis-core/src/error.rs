//! Aivis error types.

/// All errors produced by Aivis crates.
#[derive(Debug, thiserror::Error)]
pub enum AivisError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Answer engine not found: {0}")]
    EngineNotFound(String),

    #[error("API key missing for engine: {0}")]
    ApiKeyMissing(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used across all Aivis crates.
pub type Result<T> = std::result::Result<T, AivisError>;
