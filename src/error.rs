//! Top-level error types for Brulee.

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error enum wrapping domain-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("missing required config key: {0}")]
    MissingKey(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Authentication and token errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("missing bearer token")]
    MissingToken,

    #[error("token has expired")]
    TokenExpired,

    #[error("invalid token")]
    InvalidToken,

    #[error("invalid request signature")]
    InvalidSignature,
}

/// Fast-store backend errors (Redis or the process-local fallback).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redis operation failed: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("store backend unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Model provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("missing API key for provider: {0}")]
    MissingProviderKey(String),

    #[error("provider request failed: {0}")]
    RequestFailed(String),

    #[error("provider returned an unusable response: {0}")]
    BadResponse(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Request pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
}
