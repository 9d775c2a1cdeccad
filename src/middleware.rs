//! axum middleware that only lets through requests signed by Clubhouse.
//!
//! Wire it up with [`axum::middleware::from_fn_with_state`]:
//!
//! ```no_run
//! use axum::{middleware, routing::post, Router};
//! use clubhouse_webhook::middleware::{verify_signature, HeaderVerification};
//! use clubhouse_webhook::signature::SignatureVerifier;
//!
//! let verification = HeaderVerification::new(SignatureVerifier::new("secret"))
//!     .with_skipper(|req| req.uri().path() == "/health");
//!
//! let app: Router = Router::new()
//!     .route("/webhooks/clubhouse", post(|| async { "ok" }))
//!     .layer(middleware::from_fn_with_state(verification, verify_signature));
//! ```

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use bytes::BytesMut;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::sync::Arc;

use crate::error::VerifyError;
use crate::signature::{signature_from_headers, SignatureVerifier};

/// Decides per request whether verification should be bypassed.
pub type Skipper = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// The default skipper: every request is verified.
pub fn never_skip(_request: &Request) -> bool {
    false
}

/// State for [`verify_signature`]: the verifier plus the skip policy.
#[derive(Clone)]
pub struct HeaderVerification {
    verifier: Arc<SignatureVerifier>,
    skipper: Skipper,
}

impl fmt::Debug for HeaderVerification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeaderVerification")
            .field("verifier", &self.verifier)
            .finish_non_exhaustive()
    }
}

impl HeaderVerification {
    /// Verify every request with `verifier`.
    pub fn new(verifier: SignatureVerifier) -> Self {
        Self {
            verifier: Arc::new(verifier),
            skipper: Arc::new(never_skip),
        }
    }

    /// Bypass verification for requests where `skipper` returns true.
    pub fn with_skipper<F>(mut self, skipper: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.skipper = Arc::new(skipper);
        self
    }

    /// Whether `request` bypasses verification.
    pub fn should_skip(&self, request: &Request) -> bool {
        (self.skipper)(request)
    }

    /// Verify `request`, returning it with a fresh body on success.
    ///
    /// The header is validated before the body is polled, so header errors
    /// leave the body stream untouched.
    pub async fn check(&self, request: Request) -> Result<Request, Rejection> {
        let expected = signature_from_headers(request.headers()).map_err(Rejection::Invalid)?;

        let (parts, body) = request.into_parts();
        let bytes = collect_body(body).await.map_err(Rejection::Invalid)?;

        if !self.verifier.matches(&expected, &bytes) {
            return Err(Rejection::Mismatch { body: bytes });
        }

        Ok(Request::from_parts(parts, Body::from(bytes)))
    }
}

/// Drain `body` into memory, keeping the bytes read so far if a frame fails.
async fn collect_body(body: Body) -> Result<Bytes, VerifyError> {
    let mut stream = body.into_data_stream();
    let mut buf = BytesMut::new();

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(chunk) => buf.extend_from_slice(&chunk),
            Err(err) => {
                return Err(VerifyError::BodyRead {
                    source: io::Error::other(err),
                    body: buf.freeze(),
                })
            }
        }
    }

    Ok(buf.freeze())
}

/// Why a request was turned away.
#[derive(Debug)]
pub enum Rejection {
    /// The request could not be verified at all. Maps to `400 Bad Request`.
    Invalid(VerifyError),
    /// The signature was well formed but did not match. Maps to `401 Unauthorized`.
    Mismatch {
        /// The consumed body.
        body: Bytes,
    },
}

impl Rejection {
    /// HTTP status sent back to the caller.
    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::Invalid(_) => StatusCode::BAD_REQUEST,
            Rejection::Mismatch { .. } => StatusCode::UNAUTHORIZED,
        }
    }

    /// Body bytes consumed before the request was rejected.
    pub fn restored_body(&self) -> Bytes {
        match self {
            Rejection::Invalid(err) => err.restored_body(),
            Rejection::Mismatch { body } => body.clone(),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Invalid(err) => write!(f, "webhook verification failed. Error: {}", err),
            Rejection::Mismatch { .. } => write!(f, "webhook signature did not match"),
        }
    }
}

impl std::error::Error for Rejection {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Rejection::Invalid(err) => Some(err),
            Rejection::Mismatch { .. } => None,
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.to_string(),
        });

        (self.status(), body).into_response()
    }
}

/// JSON error body shared by every error response of the receiver.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Middleware function for [`axum::middleware::from_fn_with_state`].
///
/// Skipped requests are forwarded untouched. Verified requests are forwarded
/// with their body restored. Everything else is answered here: `400` for a
/// missing or malformed signature or an unreadable body, `401` for a
/// signature that does not match.
pub async fn verify_signature(
    State(verification): State<HeaderVerification>,
    request: Request,
    next: Next,
) -> Response {
    if verification.should_skip(&request) {
        tracing::trace!(path = %request.uri().path(), "Skipping signature verification");
        return next.run(request).await;
    }

    match verification.check(request).await {
        Ok(request) => {
            tracing::debug!("Webhook signature verified");
            next.run(request).await
        }
        Err(rejection) => {
            match &rejection {
                Rejection::Invalid(err) => tracing::warn!(
                    kind = err.kind(),
                    error = %err,
                    "Rejecting webhook request"
                ),
                Rejection::Mismatch { body } => tracing::warn!(
                    body_size = body.len(),
                    "Webhook signature did not match"
                ),
            }
            rejection.into_response()
        }
    }
}
