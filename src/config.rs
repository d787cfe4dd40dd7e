//! Configuration loading and validation.

use crate::error::{ConfigError, Result};
use anyhow::Context as _;
use std::net::SocketAddr;

/// Deployment environment. Controls how strict startup validation is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "development" => Some(Environment::Development),
            "production" => Some(Environment::Production),
            _ => None,
        }
    }
}

/// Brulee configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Data directory path (SQLite lives here).
    pub data_dir: std::path::PathBuf,

    /// Address the HTTP server binds to.
    pub bind: SocketAddr,

    /// Deployment environment.
    pub environment: Environment,

    /// Redis connection URL. Required in production; without it the
    /// process-local store is used, which is wrong for multi-instance
    /// deployments.
    pub redis_url: Option<String>,

    /// Model provider configuration.
    pub llm: LlmConfig,

    /// Shared secret for signing bearer tokens.
    pub jwt_secret: String,

    /// API key exchanged for bearer tokens at /auth/token.
    pub api_key: String,

    /// Discord application public key (hex). Interaction route is disabled
    /// without it.
    pub discord_public_key: Option<String>,

    /// Rate-limit window settings.
    pub rate_limit: RateLimitConfig,

    /// Response cache TTL in seconds.
    pub cache_ttl_secs: u64,

    /// Outbound webhook delivery timeout in seconds.
    pub webhook_timeout_secs: u64,
}

/// Model provider configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// OpenAI-compatible API key.
    pub openai_key: String,

    /// Base URL of the chat-completions endpoint.
    pub base_url: String,

    /// Model name to request.
    pub model: String,
}

/// Sliding-window rate-limit settings.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Window size in seconds.
    pub window_secs: u64,

    /// Maximum admitted requests per identity per window.
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { window_secs: 60, max_requests: 60 }
    }
}

impl Config {
    /// Load configuration from the environment.
    pub fn load() -> Result<Self> {
        let data_dir = match std::env::var("DATA_DIR") {
            Ok(dir) => std::path::PathBuf::from(dir),
            Err(_) => dirs::data_dir()
                .map(|d| d.join("brulee"))
                .unwrap_or_else(|| std::path::PathBuf::from("./data")),
        };

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

        let bind = std::env::var("BRULEE_BIND")
            .unwrap_or_else(|_| "127.0.0.1:8080".into())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid(format!("BRULEE_BIND: {e}")))?;

        let environment = std::env::var("ENVIRONMENT")
            .ok()
            .map(|v| {
                Environment::parse(&v)
                    .ok_or_else(|| ConfigError::Invalid(format!("unknown ENVIRONMENT: {v}")))
            })
            .transpose()?
            .unwrap_or(Environment::Development);

        let redis_url = std::env::var("REDIS_URL").ok();
        if environment == Environment::Production && redis_url.is_none() {
            // The process-local fallback silently breaks rate limiting and
            // caching across instances, so production refuses to start on it.
            return Err(ConfigError::MissingKey("REDIS_URL".into()).into());
        }

        let llm = LlmConfig {
            openai_key: require_env("OPENAI_API_KEY")?,
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".into()),
            model: std::env::var("BRULEE_MODEL").unwrap_or_else(|_| "gpt-4".into()),
        };

        let rate_limit = RateLimitConfig {
            window_secs: parse_env("RATE_LIMIT_WINDOW_SECS", 60)?,
            max_requests: parse_env("RATE_LIMIT_MAX_REQUESTS", 60)?,
        };

        Ok(Self {
            data_dir,
            bind,
            environment,
            redis_url,
            llm,
            jwt_secret: require_env("JWT_SECRET")?,
            api_key: require_env("API_KEY")?,
            discord_public_key: std::env::var("DISCORD_PUBLIC_KEY").ok(),
            rate_limit,
            cache_ttl_secs: parse_env("CACHE_TTL_SECS", 3600)?,
            webhook_timeout_secs: parse_env("WEBHOOK_TIMEOUT_SECS", 5)?,
        })
    }

    /// Get the SQLite database path.
    pub fn sqlite_path(&self) -> std::path::PathBuf {
        self.data_dir.join("brulee.db")
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| ConfigError::MissingKey(key.into()).into())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| ConfigError::Invalid(format!("{key}: {e}")).into()),
        Err(_) => Ok(default),
    }
}
