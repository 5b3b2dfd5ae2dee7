//! Ollama Backend Implementation
//!
//! Generation backend for Ollama (local LLM server).
//!
//! # Ollama API
//!
//! - `/api/generate` - Generate completions (streaming or batch)
//! - `/api/tags` - List available models
//!
//! # Timeouts
//!
//! The client bounds connection establishment with a connect timeout. A
//! streaming call is additionally bounded until the response headers arrive;
//! the body is then read without a deadline because a long answer is not a
//! failure. Non-streaming calls are bounded end to end.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::traits::{GenerateResponse, GenerationBackend, GenerationRequest, ModelInfo, StreamingToken};
use crate::config::UpstreamConfig;
use crate::error::{Result, SuggestError};
use crate::framing::{classify_upstream_line, LineAssembler, LineOutcome, RawLine};

/// Default Ollama port
pub const DEFAULT_OLLAMA_PORT: u16 = 11434;

/// Buffered fragments between the HTTP reader task and the relay
const STREAM_CHANNEL_CAPACITY: usize = 100;

/// Ollama backend client
#[derive(Clone, Debug)]
pub struct OllamaBackend {
    /// Base URL without trailing slash, e.g. `http://localhost:11434`
    base_url: String,
    /// Deadline for a complete non-streaming call, or for stream headers
    request_timeout: Duration,
    /// HTTP client
    http_client: reqwest::Client,
}

impl OllamaBackend {
    /// Create a backend with explicit timeouts
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| {
                SuggestError::UpstreamUnreachable(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout,
            http_client,
        })
    }

    /// Create from the upstream section of the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &UpstreamConfig) -> Result<Self> {
        Self::new(
            config.base_url.clone(),
            config.connect_timeout,
            config.request_timeout,
        )
    }

    /// Create from `OLLAMA_HOST` / `OLLAMA_PORT`, falling back to localhost
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_env() -> Result<Self> {
        let config = UpstreamConfig::default();
        let base_url = ollama_base_url_from_env().unwrap_or(config.base_url);
        Self::new(base_url, config.connect_timeout, config.request_timeout)
    }

    /// Get the base URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get generate endpoint URL
    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }

    /// Get tags endpoint URL
    fn tags_url(&self) -> String {
        format!("{}/api/tags", self.base_url)
    }
}

/// Base URL from the Ollama environment variables
///
/// `OLLAMA_HOST` may be a bare host or a full URL.
pub(crate) fn ollama_base_url_from_env() -> Option<String> {
    let host = std::env::var("OLLAMA_HOST").ok()?;
    if host.starts_with("http://") || host.starts_with("https://") {
        return Some(host);
    }
    let port: u16 = std::env::var("OLLAMA_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_OLLAMA_PORT);
    Some(format!("http://{host}:{port}"))
}

/// Error body Ollama sends with a failure status
#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Deserialize)]
struct TagModel {
    name: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    details: Option<TagDetails>,
}

#[derive(Deserialize)]
struct TagDetails {
    #[serde(default)]
    parameter_size: Option<String>,
}

/// Turn a non-success status into `UpstreamStatus` before any body is used
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(parsed) => parsed.error,
        Err(_) if body.is_empty() => status.canonical_reason().unwrap_or("").to_string(),
        Err(_) => body,
    };
    Err(SuggestError::UpstreamStatus {
        status: status.as_u16(),
        message,
    })
}

/// Read the upstream body and forward decoded fragments until the stream ends
///
/// Stops early when the receiver goes away, which drops the body stream and
/// with it the upstream connection.
async fn forward_fragments<S>(mut body: S, tx: mpsc::Sender<StreamingToken>)
where
    S: Stream<Item = reqwest::Result<Bytes>> + Unpin,
{
    let mut assembler = LineAssembler::default();

    loop {
        let chunk = tokio::select! {
            () = tx.closed() => {
                debug!("Fragment receiver dropped, aborting upstream stream");
                return;
            }
            chunk = body.next() => chunk,
        };

        let lines = match chunk {
            Some(Ok(bytes)) => assembler.push(&bytes),
            Some(Err(e)) => {
                warn!(error = %e, "Upstream stream failed");
                let _ = tx
                    .send(StreamingToken::Error(SuggestError::from_body(&e)))
                    .await;
                return;
            }
            None => {
                let trailing: Vec<RawLine> = assembler.finish().into_iter().collect();
                forward_lines(trailing, &tx).await;
                debug!("Upstream stream ended");
                return;
            }
        };

        if !forward_lines(lines, &tx).await {
            return;
        }
    }
}

/// Forward complete lines; returns `false` once the stream is finished
async fn forward_lines(lines: Vec<RawLine>, tx: &mpsc::Sender<StreamingToken>) -> bool {
    for line in lines {
        let line = match line {
            RawLine::Text(line) => line,
            RawLine::Invalid(reason) => {
                warn!(reason = %reason, "Skipping undecodable upstream line");
                continue;
            }
        };

        match classify_upstream_line(&line) {
            LineOutcome::Blank => {}
            LineOutcome::Malformed(reason) => {
                warn!(line = %line, reason = %reason, "Skipping malformed upstream line");
            }
            LineOutcome::UpstreamError(message) => {
                warn!(error = %message, "Upstream reported an error mid-stream");
                let _ = tx
                    .send(StreamingToken::Error(SuggestError::UpstreamMidStreamFailure(
                        message,
                    )))
                    .await;
                return false;
            }
            LineOutcome::Applied(fragment) => {
                let is_final = fragment.is_final;
                if tx.send(StreamingToken::Fragment(fragment)).await.is_err() {
                    return false;
                }
                if is_final {
                    return false;
                }
            }
        }
    }
    true
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    fn name(&self) -> &'static str {
        "Ollama"
    }

    async fn health_check(&self) -> bool {
        self.http_client
            .get(self.tags_url())
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .is_ok_and(|r| r.status().is_success())
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerateResponse> {
        let body = request.clone().with_stream(false);

        let response = self
            .http_client
            .post(self.generate_url())
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| SuggestError::from_connect(&e))?;
        let response = check_status(response).await?;

        response
            .json::<GenerateResponse>()
            .await
            .map_err(|e| SuggestError::from_body(&e))
    }

    async fn generate_stream(
        &self,
        request: &GenerationRequest,
    ) -> Result<mpsc::Receiver<StreamingToken>> {
        let body = request.clone().with_stream(true);

        let send = self.http_client.post(self.generate_url()).json(&body).send();
        let response = tokio::time::timeout(self.request_timeout, send)
            .await
            .map_err(|_| {
                SuggestError::UpstreamUnreachable(format!(
                    "no response within {}ms",
                    self.request_timeout.as_millis()
                ))
            })?
            .map_err(|e| SuggestError::from_connect(&e))?;
        let response = check_status(response).await?;

        debug!(model = %request.model, "Upstream stream established");

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        tokio::spawn(forward_fragments(response.bytes_stream().boxed(), tx));
        Ok(rx)
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let response = self
            .http_client
            .get(self.tags_url())
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| SuggestError::from_connect(&e))?;
        let response = check_status(response).await?;

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| SuggestError::from_body(&e))?;

        Ok(tags
            .models
            .into_iter()
            .map(|m| ModelInfo {
                name: m.name,
                size: m.size,
                parameters: m.details.and_then(|d| d.parameter_size),
            })
            .collect())
    }
}
