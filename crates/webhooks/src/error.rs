use thiserror::Error;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failure reported by a non-database store implementation.
    #[error("store error: {0}")]
    Store(String),

    #[error("http client error: {0}")]
    Client(String),
}

pub type Result<T> = std::result::Result<T, WebhookError>;
