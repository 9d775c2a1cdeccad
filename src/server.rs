//! Webhook receiver server
//!
//! Provides an HTTP endpoint for Clubhouse outgoing webhooks. Every request
//! except the health check must carry a valid `Clubhouse-Signature`.

use axum::{
    body::Bytes,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::config::{ConfigError, WebhookConfig};
use crate::middleware::{verify_signature, ErrorResponse, HeaderVerification};
use crate::signature::SignatureVerifier;

/// Path of the unauthenticated health check.
pub const HEALTH_PATH: &str = "/health";

/// Path Clubhouse delivers webhooks to.
pub const WEBHOOK_PATH: &str = "/webhooks/clubhouse";

/// Errors that stop the server from running.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] io::Error),
}

/// Errors returned by webhook handlers once the request has been verified.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Failed to parse webhook payload
    #[error("Failed to parse webhook payload: {0}")]
    ParseError(String),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::ParseError(_) => StatusCode::BAD_REQUEST,
        };

        let body = Json(ErrorResponse {
            error: self.to_string(),
        });

        (status, body).into_response()
    }
}

/// Shared application state for the webhook server
#[derive(Debug, Clone)]
pub struct AppState {
    /// Receiver configuration
    pub config: WebhookConfig,
    /// Signature check applied to incoming requests
    pub verification: HeaderVerification,
}

impl AppState {
    /// Build the state, keying the verifier with the configured secret.
    ///
    /// The health check is exempt from verification.
    pub fn new(config: WebhookConfig) -> Result<Self, ConfigError> {
        let verifier = SignatureVerifier::new(config.secret()?);
        let verification =
            HeaderVerification::new(verifier).with_skipper(|req| req.uri().path() == HEALTH_PATH);

        Ok(Self {
            config,
            verification,
        })
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Response to an accepted Clubhouse webhook
#[derive(Debug, Serialize, Deserialize)]
pub struct ClubhouseWebhookResponse {
    pub received: bool,
    pub event_id: String,
    pub actions: usize,
}

/// Clubhouse outgoing webhook payload (the fields the receiver looks at)
#[derive(Debug, Deserialize)]
pub struct ClubhouseEvent {
    pub id: String,
    pub changed_at: Option<String>,
    pub version: Option<String>,
    pub member_id: Option<String>,
    pub primary_id: Option<u64>,
    #[serde(default)]
    pub actions: Vec<ClubhouseAction>,
}

/// A single change described by a webhook event.
#[derive(Debug, Deserialize)]
pub struct ClubhouseAction {
    pub id: serde_json::Value,
    pub entity_type: String,
    pub action: String,
    pub name: Option<String>,
}

/// Create the webhook router with all routes.
///
/// Layers from the outside in: request tracing, body size limit, signature
/// verification.
pub fn create_webhook_router(state: AppState) -> Router {
    let verification = state.verification.clone();
    let max_body_bytes = state.config.max_body_bytes;

    Router::new()
        .route(HEALTH_PATH, get(health_handler))
        .route(WEBHOOK_PATH, post(clubhouse_webhook_handler))
        .layer(middleware::from_fn_with_state(verification, verify_signature))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "clubhouse-webhook".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// POST /webhooks/clubhouse
///
/// Only reached once the signature middleware has verified the request and
/// put the body back, so the raw bytes here are exactly what was signed.
pub async fn clubhouse_webhook_handler(
    body: Bytes,
) -> Result<Json<ClubhouseWebhookResponse>, WebhookError> {
    let event: ClubhouseEvent =
        serde_json::from_slice(&body).map_err(|e| WebhookError::ParseError(e.to_string()))?;

    for action in &event.actions {
        tracing::info!(
            event_id = %event.id,
            entity_type = %action.entity_type,
            action = %action.action,
            name = ?action.name,
            "Received Clubhouse action"
        );
    }

    tracing::debug!(
        event_id = %event.id,
        changed_at = ?event.changed_at,
        member_id = ?event.member_id,
        primary_id = ?event.primary_id,
        version = ?event.version,
        "Received Clubhouse webhook"
    );

    Ok(Json(ClubhouseWebhookResponse {
        received: true,
        actions: event.actions.len(),
        event_id: event.id,
    }))
}

/// Bind to the configured address and serve until Ctrl-C.
pub async fn serve(config: WebhookConfig) -> Result<(), ServerError> {
    let addr = config.socket_addr();
    let state = AppState::new(config)?;

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;

    tracing::info!(address = %addr, "Webhook receiver listening");

    axum::serve(listener, create_webhook_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ServerError::Serve)?;

    tracing::info!("Webhook receiver stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::{compute_signature, SIGNATURE_HEADER};
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    const SECRET: &str = "the_cake_is_a_lie";
    const PAYLOAD: &str = r#"{
        "id": "595285dc-9c43-4b9c-a1e6-0cd9aff5b084",
        "changed_at": "2017-06-27T16:20:44Z",
        "version": "v1",
        "primary_id": 12345,
        "member_id": "56d8a839-1c52-437f-b981-c3a15a11d6d4",
        "actions": [
            {"id": 12345, "entity_type": "story", "action": "update", "name": "Prepare for Jar-Jar"}
        ]
    }"#;

    fn create_test_state() -> AppState {
        AppState::new(WebhookConfig::new(3000).with_secret(SECRET)).unwrap()
    }

    fn webhook_request(signature: Option<&str>, body: &'static str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(WEBHOOK_PATH)
            .header("Content-Type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        builder.body(Body::from(body)).unwrap()
    }

    #[test]
    fn test_app_state_requires_secret() {
        let result = AppState::new(WebhookConfig::default());
        assert!(matches!(result, Err(ConfigError::MissingSecret)));
    }

    #[test]
    fn test_webhook_error_display() {
        assert_eq!(
            WebhookError::ParseError("bad json".to_string()).to_string(),
            "Failed to parse webhook payload: bad json"
        );
    }

    #[tokio::test]
    async fn test_health_endpoint_skips_verification() {
        let app = create_webhook_router(create_test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri(HEALTH_PATH)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .unwrap();
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();

        assert_eq!(health.status, "healthy");
        assert_eq!(health.service, "clubhouse-webhook");
    }

    #[tokio::test]
    async fn test_clubhouse_webhook_with_valid_signature() {
        let app = create_webhook_router(create_test_state());
        let signature = compute_signature(SECRET, PAYLOAD.as_bytes());

        let response = app
            .oneshot(webhook_request(Some(&signature), PAYLOAD))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .unwrap();
        let result: ClubhouseWebhookResponse = serde_json::from_slice(&body).unwrap();

        assert!(result.received);
        assert_eq!(result.event_id, "595285dc-9c43-4b9c-a1e6-0cd9aff5b084");
        assert_eq!(result.actions, 1);
    }

    #[tokio::test]
    async fn test_clubhouse_webhook_with_invalid_signature() {
        let app = create_webhook_router(create_test_state());
        let signature = compute_signature("wrong-secret", PAYLOAD.as_bytes());

        let response = app
            .oneshot(webhook_request(Some(&signature), PAYLOAD))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_clubhouse_webhook_missing_signature_header() {
        let app = create_webhook_router(create_test_state());

        let response = app.oneshot(webhook_request(None, PAYLOAD)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_clubhouse_webhook_garbage_signature_header() {
        let app = create_webhook_router(create_test_state());

        let response = app
            .oneshot(webhook_request(Some("jar-jar-binks"), PAYLOAD))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_clubhouse_webhook_signed_invalid_json() {
        let app = create_webhook_router(create_test_state());
        let signature = compute_signature(SECRET, b"not valid json");

        let response = app
            .oneshot(webhook_request(Some(&signature), "not valid json"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .unwrap();
        let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert!(error.error.starts_with("Failed to parse webhook payload"));
    }

    #[tokio::test]
    async fn test_oversized_body_with_content_length_is_rejected() {
        let state =
            AppState::new(WebhookConfig::new(3000).with_secret(SECRET).with_max_body_bytes(16))
                .unwrap();
        let app = create_webhook_router(state);
        let signature = compute_signature(SECRET, PAYLOAD.as_bytes());

        let request = Request::builder()
            .method("POST")
            .uri(WEBHOOK_PATH)
            .header(SIGNATURE_HEADER, signature)
            .header("Content-Length", PAYLOAD.len())
            .body(Body::from(PAYLOAD))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_oversized_streamed_body_is_bad_request() {
        let state =
            AppState::new(WebhookConfig::new(3000).with_secret(SECRET).with_max_body_bytes(16))
                .unwrap();
        let app = create_webhook_router(state);
        let signature = compute_signature(SECRET, PAYLOAD.as_bytes());

        let response = app
            .oneshot(webhook_request(Some(&signature), PAYLOAD))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_clubhouse_event_deserialization() {
        let event: ClubhouseEvent = serde_json::from_str(PAYLOAD).unwrap();

        assert_eq!(event.id, "595285dc-9c43-4b9c-a1e6-0cd9aff5b084");
        assert_eq!(event.version.as_deref(), Some("v1"));
        assert_eq!(event.primary_id, Some(12345));
        assert_eq!(event.actions.len(), 1);
        assert_eq!(event.actions[0].entity_type, "story");
        assert_eq!(event.actions[0].action, "update");
    }

    #[test]
    fn test_clubhouse_event_without_actions() {
        let event: ClubhouseEvent = serde_json::from_str(r#"{"id": "abc"}"#).unwrap();
        assert!(event.actions.is_empty());
    }
}
