//! HTTP handlers
//!
//! - `POST /api/suggestions`: complete suggestion as `{ "suggestions": ... }`
//! - `POST /api/suggestions/stream`: relay records as JSON lines
//! - `GET /api/health`: liveness and upstream reachability
//!
//! A failure before the stream starts is answered with a JSON
//! `{ "error": ... }` body and a failure status; once the stream has
//! started, failures are reported in-band by the relay's error record.

use std::convert::Infallible;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::info;

use suggest_core::{GenerationBackend, Relay, Suggestion, SuggestError, SuggestionRequest};

/// Content type of the streaming endpoint
///
/// The body is JSON lines; editors read it with a streaming fetch.
pub const STREAM_CONTENT_TYPE: &str = "text/event-stream";

/// Shared state of all handlers
pub struct AppState<B> {
    /// Relay over the upstream backend
    pub relay: Relay<B>,
    /// Upstream base URL, reported by the health endpoint
    pub upstream_url: String,
}

impl<B> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            relay: self.relay.clone(),
            upstream_url: self.upstream_url.clone(),
        }
    }
}

impl<B: GenerationBackend + 'static> AppState<B> {
    /// Create the handler state
    pub fn new(relay: Relay<B>, upstream_url: impl Into<String>) -> Self {
        Self {
            relay,
            upstream_url: upstream_url.into(),
        }
    }
}

/// JSON error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable failure description
    pub error: String,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Relay status
    pub status: String,
    /// Relay version
    pub version: String,
    /// `reachable` or `unreachable`
    pub upstream: String,
    /// Upstream base URL
    pub upstream_url: String,
    /// Model requests are sent to
    pub model: String,
}

/// Failure answered before any body byte was written
#[derive(Debug)]
pub struct ApiError(pub SuggestError);

impl From<SuggestError> for ApiError {
    fn from(err: SuggestError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(SuggestError::InvalidRequest(rejection.body_text()))
    }
}

impl ApiError {
    /// Status code for the failure
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            SuggestError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            SuggestError::UpstreamUnreachable(_)
            | SuggestError::UpstreamStatus { .. }
            | SuggestError::UpstreamMidStreamFailure(_) => StatusCode::BAD_GATEWAY,
            SuggestError::RequestRejectedConcurrent => StatusCode::CONFLICT,
            SuggestError::MalformedFragment(_) | SuggestError::Cancelled => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorResponse {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Complete suggestion (POST /api/suggestions)
pub async fn suggestions<B: GenerationBackend + 'static>(
    State(state): State<AppState<B>>,
    payload: Result<Json<SuggestionRequest>, JsonRejection>,
) -> Result<Json<Suggestion>, ApiError> {
    let Json(request) = payload?;
    info!(content_type = %request.content_type, "POST /api/suggestions");

    let suggestion = state.relay.suggest(&request).await?;
    Ok(Json(suggestion))
}

/// Streamed suggestion (POST /api/suggestions/stream)
pub async fn suggestions_stream<B: GenerationBackend + 'static>(
    State(state): State<AppState<B>>,
    payload: Result<Json<SuggestionRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    info!(content_type = %request.content_type, "POST /api/suggestions/stream");

    let records = state.relay.relay(&request).await?;
    let body = Body::from_stream(records.map(Ok::<_, Infallible>));

    Ok((
        [
            (header::CONTENT_TYPE, STREAM_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response())
}

/// Health check (GET /api/health)
pub async fn health<B: GenerationBackend + 'static>(
    State(state): State<AppState<B>>,
) -> Json<HealthResponse> {
    let upstream = if state.relay.backend().health_check().await {
        "reachable"
    } else {
        "unreachable"
    };

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        upstream: upstream.to_string(),
        upstream_url: state.upstream_url.clone(),
        model: state.relay.model().to_string(),
    })
}
