//! Tally Web Server
//!
//! Axum-based webhook endpoint for the Tally bot.
//!
//! - `POST /webhook`: Telegram updates, always acknowledged with `Webhook OK`
//! - `GET /health`: liveness probe
//!
//! Telegram can echo a secret in `X-Telegram-Bot-Api-Secret-Token`; when one
//! is configured, requests without it are rejected before decoding.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{debug, error, info, info_span, warn, Instrument};

use tally_core::{parse_update, Config, Error, InMemorySessionStore, UploadService};


/// Maximum webhook body size (1 MB)
pub const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Header carrying the secret passed to `setWebhook`
const SECRET_TOKEN_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Body of every accepted webhook call
pub const WEBHOOK_ACK: &str = "Webhook OK";

/// Server configuration
#[derive(Clone, Default)]
pub struct ServerConfig {
    /// Expected secret token; `None` accepts every caller
    pub webhook_secret: Option<String>,
}

/// Shared application state
pub struct AppState {
    pub uploads: UploadService,
    pub config: ServerConfig,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Build the router around an upload service
pub fn create_router(uploads: UploadService, config: ServerConfig) -> Router {
    let state = Arc::new(AppState { uploads, config });

    Router::new()
        .route("/webhook", post(webhook))
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Constant-time secret check
fn validate_secret(provided: &str, expected: &str) -> bool {
    use subtle::ConstantTimeEq;

    let provided_bytes = provided.as_bytes();
    let expected_bytes = expected.as_bytes();
    // Only compare if lengths match (constant-time for same-length secrets)
    provided_bytes.len() == expected_bytes.len() && provided_bytes.ct_eq(expected_bytes).into()
}

async fn webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(expected) = &state.config.webhook_secret {
        let authorized = headers
            .get(SECRET_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|provided| validate_secret(provided, expected))
            .unwrap_or(false);

        if !authorized {
            warn!("Rejected webhook call with missing or wrong secret token");
            return (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "error": "Invalid secret token" })),
            )
                .into_response();
        }
    }

    let update = match parse_update(&body) {
        Ok(update) => update,
        Err(e) => {
            warn!(error = %e, "Ignoring undecodable update");
            return WEBHOOK_ACK.into_response();
        }
    };

    let span = info_span!("update", update_id = update.update_id);
    async {
        let Some(message) = update.inbound() else {
            debug!("Ignoring update without a user message");
            return;
        };

        match state.uploads.handle(&message).await {
            Ok(()) => {}
            Err(Error::SessionNotFound(user)) => {
                warn!(user, "Dropped message outside an upload session")
            }
            Err(e @ (Error::UnknownCommand(_) | Error::NoFileAttached)) => {
                info!(user = message.user_id, error = %e, "Message not handled")
            }
            Err(e) => error!(user = message.user_id, error = %e, "Failed to handle message"),
        }
    }
    .instrument(span)
    .await;

    WEBHOOK_ACK.into_response()
}

/// Start the server with clients built from `config`
pub async fn serve(config: &Config, host: &str, port: u16) -> anyhow::Result<()> {
    config.validate()?;

    let chat = config
        .telegram_client()
        .context("Failed to create Telegram client")?;
    let sheets = config
        .sheets_client()
        .context("Failed to create Sheets client")?;
    let sessions = InMemorySessionStore::with_timeout(config.session_timeout);

    let uploads = UploadService::new(Arc::new(chat), Arc::new(sheets), Arc::new(sessions));
    let server_config = ServerConfig {
        webhook_secret: config.webhook_secret.clone(),
    };
    if server_config.webhook_secret.is_none() {
        warn!("No webhook secret configured - any caller can post updates");
    }

    let app = create_router(uploads, server_config);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
