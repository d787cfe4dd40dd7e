//! Brulee CLI entry point.

use anyhow::Context as _;
use brulee::api::{AppState, start_http_server};
use brulee::auth::AuthService;
use brulee::cache::ResponseCache;
use brulee::chat::ChatService;
use brulee::discord::SignatureVerifier;
use brulee::limiter::RateLimiter;
use brulee::llm::{ModelClient, OpenAiClient};
use brulee::memory::ConversationMemory;
use brulee::persona::Persona;
use brulee::store::{FastStore, LocalStore, RedisStore};
use brulee::tasks::TaskQueue;
use brulee::webhook::WebhookNotifier;
use clap::Parser;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "brulee")]
#[command(about = "A persona-driven conversational-agent backend")]
struct Cli {
    /// Address to bind the HTTP server to (overrides BRULEE_BIND)
    #[arg(short, long)]
    bind: Option<std::net::SocketAddr>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Starting Brulee...");

    let config = brulee::config::Config::load()
        .with_context(|| "failed to load configuration from environment")?;
    let bind = cli.bind.unwrap_or(config.bind);

    tracing::info!(data_dir = %config.data_dir.display(), "Configuration loaded");

    let options = SqliteConnectOptions::new()
        .filename(config.sqlite_path())
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .connect_with(options)
        .await
        .with_context(|| "failed to connect to SQLite")?;

    let fast: Arc<dyn FastStore> = match &config.redis_url {
        Some(url) => Arc::new(
            RedisStore::connect(url)
                .await
                .with_context(|| "failed to connect to Redis")?,
        ),
        None => {
            tracing::warn!(
                "REDIS_URL not set, using the process-local store (development only)"
            );
            Arc::new(LocalStore::new())
        }
    };

    let tasks = TaskQueue::start(pool.clone(), reqwest::Client::new(), config.webhook_timeout_secs);

    let memory = ConversationMemory::new(pool.clone(), fast.clone(), tasks.clone());
    memory
        .initialize()
        .await
        .with_context(|| "failed to initialize conversation tables")?;

    let model: Arc<dyn ModelClient> = Arc::new(OpenAiClient::new(config.llm.clone())?);
    let notifier = Arc::new(WebhookNotifier::new(tasks));
    let chat = Arc::new(ChatService::new(
        RateLimiter::new(fast.clone(), config.rate_limit),
        ResponseCache::new(fast, config.cache_ttl_secs),
        memory,
        notifier.clone(),
        model,
        Persona::new(),
    ));

    let discord = config
        .discord_public_key
        .as_deref()
        .map(SignatureVerifier::from_hex)
        .transpose()?;

    let state = Arc::new(AppState {
        chat,
        auth: AuthService::new(&config.jwt_secret, config.api_key.clone()),
        notifier,
        discord,
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let server = start_http_server(bind, state, shutdown_rx).await?;

    tokio::signal::ctrl_c()
        .await
        .with_context(|| "failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);
    let _ = server.await;

    Ok(())
}
