//! HTTP server setup: router, middleware, and API routes.

use crate::auth::{AuthService, Claims};
use crate::chat::ChatService;
use crate::discord::{self, SignatureVerifier};
use crate::error::{AuthError, ChatError, Error};
use crate::webhook::{WebhookNotifier, WebhookSubscription};
use crate::{ChatReply, ChatRequest};

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Query, Request, State};
use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, post};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use std::net::SocketAddr;
use std::sync::Arc;

/// Request bodies above this size are rejected outright.
const MAX_BODY_BYTES: u64 = 1024 * 1024;

/// Shared state behind every handler.
pub struct AppState {
    pub chat: Arc<ChatService>,
    pub auth: AuthService,
    pub notifier: Arc<WebhookNotifier>,
    /// Present only when a Discord public key is configured.
    pub discord: Option<SignatureVerifier>,
}

// -- Request/response types --

#[derive(Deserialize)]
struct TokenRequest {
    platform: String,
    api_key: String,
}

#[derive(Serialize)]
struct TokenResponse {
    access_token: String,
    token_type: &'static str,
}

#[derive(Deserialize)]
struct RegisterWebhookRequest {
    url: String,
    events: Vec<String>,
    secret: String,
}

#[derive(Deserialize)]
struct UnregisterParams {
    url: String,
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    message: &'static str,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Start the HTTP server on the given address.
pub async fn start_http_server(
    bind: SocketAddr,
    state: Arc<AppState>,
    shutdown_rx: tokio::sync::watch::Receiver<bool>,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut routes = Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat))
        .route("/auth/token", post(auth_token))
        .route("/webhooks/register", post(register_webhook))
        .route("/webhooks/unregister", delete(unregister_webhook));

    if state.discord.is_some() {
        routes = routes.route("/discord/interactions", post(discord_interactions));
    } else {
        tracing::warn!("DISCORD_PUBLIC_KEY not set, Discord interaction route disabled");
    }

    let app = routes
        .layer(middleware::from_fn(validate_request))
        .layer(middleware::from_fn(track_request))
        .layer(cors)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(%bind, "HTTP server listening");

    let handle = tokio::spawn(async move {
        let mut shutdown = shutdown_rx;
        if let Err(error) = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|v| *v).await;
            })
            .await
        {
            tracing::error!(%error, "HTTP server exited with error");
        }
    });

    Ok(handle)
}

// -- API handlers --

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ChatReply>, ApiError> {
    let claims = bearer_claims(&state.auth, &headers)?;
    let request: ChatRequest = parse_json(&body)?;

    let reply = state
        .chat
        .respond(&claims.user_id, &request.message, &request.platform)
        .await?;
    Ok(Json(reply))
}

async fn auth_token(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<TokenResponse>, ApiError> {
    let request: TokenRequest = parse_json(&body)?;
    let access_token = state
        .auth
        .exchange_api_key(&request.platform, &request.api_key)?;
    Ok(Json(TokenResponse { access_token, token_type: "bearer" }))
}

async fn register_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<StatusResponse>, ApiError> {
    bearer_claims(&state.auth, &headers)?;
    let request: RegisterWebhookRequest = parse_json(&body)?;

    if request.url.parse::<reqwest::Url>().is_err() {
        return Err(ApiError::invalid_json());
    }

    state.notifier.register(WebhookSubscription {
        url: request.url,
        events: request.events.into_iter().collect(),
        secret: request.secret,
    });
    Ok(Json(StatusResponse {
        status: "success",
        message: "Webhook registered successfully",
    }))
}

async fn unregister_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<UnregisterParams>,
) -> Result<Json<StatusResponse>, ApiError> {
    bearer_claims(&state.auth, &headers)?;
    state.notifier.unregister(&params.url);
    Ok(Json(StatusResponse {
        status: "success",
        message: "Webhook unregistered successfully",
    }))
}

async fn discord_interactions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Some(verifier) = state.discord.as_ref() else {
        return Err(Error::Other(anyhow::anyhow!("discord route without verifier")).into());
    };

    let signature = header_str(&headers, "x-signature-ed25519");
    let timestamp = header_str(&headers, "x-signature-timestamp");
    let (Some(signature), Some(timestamp)) = (signature, timestamp) else {
        return Err(Error::Auth(AuthError::InvalidSignature).into());
    };
    verifier
        .verify(timestamp, &body, signature)
        .map_err(Error::Auth)?;

    let interaction: discord::Interaction = parse_json(&body)?;
    let response = discord::handle_interaction(&state.chat, interaction).await;
    Ok(Json(response))
}

// -- Middleware --

/// Reject malformed requests before any handler runs.
async fn validate_request(request: Request, next: Next) -> Response {
    if request.method() == Method::POST {
        let is_json = request
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));
        if !is_json {
            return ApiError::invalid_content_type().into_response();
        }
    }

    let declared_length = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared_length.is_some_and(|length| length > MAX_BODY_BYTES) {
        return ApiError::request_too_large().into_response();
    }

    next.run(request).await
}

/// Log method, path, status, and latency for every request.
async fn track_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = std::time::Instant::now();

    let response = next.run(request).await;

    tracing::info!(
        %method,
        path,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "request completed"
    );
    response
}

// -- Helpers --

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn bearer_claims(auth: &AuthService, headers: &HeaderMap) -> Result<Claims, ApiError> {
    let token = header_str(headers, "authorization")
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(Error::Auth(AuthError::MissingToken))?;
    auth.verify_token(token)
        .map_err(|error| Error::Auth(error).into())
}

fn parse_json<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|_| ApiError::invalid_json())
}

// -- Error rendering --

/// A fully-mapped API error: status code plus the structured error body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    additional_info: serde_json::Value,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            additional_info: serde_json::json!({}),
        }
    }

    pub fn invalid_content_type() -> Self {
        Self::new(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "INVALID_CONTENT_TYPE",
            "Content type must be application/json",
        )
    }

    pub fn request_too_large() -> Self {
        Self::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            "REQUEST_TOO_LARGE",
            "Request body too large",
        )
    }

    pub fn invalid_json() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_JSON", "Invalid JSON format")
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        match error {
            Error::Chat(ChatError::RateLimited { retry_after_secs }) => {
                let mut api = Self::new(
                    StatusCode::TOO_MANY_REQUESTS,
                    "RATE_LIMIT_EXCEEDED",
                    "Rate limit exceeded",
                );
                api.additional_info = serde_json::json!({ "retry_after": retry_after_secs });
                api
            }
            Error::Auth(error) => Self::new(
                StatusCode::UNAUTHORIZED,
                "INVALID_CREDENTIALS",
                error.to_string(),
            ),
            Error::Llm(error) => {
                // Provider detail stays in the logs.
                tracing::warn!(%error, "model generation failed");
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "AI_SERVICE_ERROR",
                    "AI service error",
                )
            }
            error => {
                tracing::error!(%error, "request failed internally");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal server error",
                )
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": {
                "code": self.code,
                "message": self.message,
                "additional_info": self.additional_info,
            }
        });
        (self.status, Json(body)).into_response()
    }
}
