//! Generation Backend Traits
//!
//! Trait definitions for the upstream generation endpoint. The relay only
//! talks to [`GenerationBackend`], so tests can swap the Ollama client for a
//! scripted backend.
//!
//! # Design Philosophy
//!
//! The trait covers what the relay needs from the model server:
//! - Streaming generation (fragments as they are produced)
//! - Non-streaming generation (one complete answer)
//! - Health checking and model listing

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{Result, SuggestError};
use crate::framing::{ContextToken, Fragment};

/// Events delivered by a streaming generation call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamingToken {
    /// The next decoded fragment, in generation order
    Fragment(Fragment),
    /// The stream broke after it was established; always the last event
    Error(SuggestError),
}

/// Sampling parameters forwarded untouched to the model
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingOptions {
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Top-k cutoff
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
}

impl SamplingOptions {
    /// Whether no option is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.top_p.is_none() && self.top_k.is_none()
    }
}

/// Body of one `/api/generate` call
///
/// Built by value, then only borrowed while it is sent.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GenerationRequest {
    /// Model identifier
    pub model: String,
    /// Full prompt text
    pub prompt: String,
    /// Continuation token from a previous answer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextToken>,
    /// Whether the answer should be streamed
    pub stream: bool,
    /// Sampling parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<SamplingOptions>,
}

impl GenerationRequest {
    /// Create a streaming request with prompt and model
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            context: None,
            stream: true,
            options: None,
        }
    }

    /// Set streaming mode
    #[must_use]
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Set the continuation token (empty tokens are dropped)
    #[must_use]
    pub fn with_context(mut self, context: Option<ContextToken>) -> Self {
        self.context = context.filter(|c| !c.is_empty());
        self
    }

    /// Set sampling options (empty options are dropped)
    #[must_use]
    pub fn with_options(mut self, options: SamplingOptions) -> Self {
        self.options = (!options.is_empty()).then_some(options);
        self
    }
}

/// Reply of a non-streaming `/api/generate` call
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct GenerateResponse {
    /// Model that produced the answer
    #[serde(default)]
    pub model: String,
    /// Upstream timestamp (RFC 3339)
    #[serde(default)]
    pub created_at: String,
    /// Complete answer text
    #[serde(default)]
    pub response: String,
    /// Continuation token
    #[serde(default)]
    pub context: Option<ContextToken>,
}

/// Information about an available model
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelInfo {
    /// Model identifier
    pub name: String,
    /// Model size in bytes (if known)
    pub size: Option<u64>,
    /// Parameter count (if known)
    pub parameters: Option<String>,
}

/// Upstream generation backend
///
/// Implementations own their HTTP client and are shared behind an `Arc` by
/// every concurrent relay invocation, so they hold no per-request state.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Backend name (e.g. "Ollama")
    fn name(&self) -> &'static str;

    /// Check if the backend is reachable
    async fn health_check(&self) -> bool;

    /// Generate a complete answer (`stream` is forced to `false`)
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerateResponse>;

    /// Start a streaming generation
    ///
    /// Returns once the upstream accepted the request; failures up to that
    /// point are returned as `Err` and nothing has been streamed. Afterwards
    /// fragments arrive on the channel in order. The channel closes after the
    /// final fragment or after a single [`StreamingToken::Error`]. Dropping
    /// the receiver aborts the upstream call.
    async fn generate_stream(
        &self,
        request: &GenerationRequest,
    ) -> Result<mpsc::Receiver<StreamingToken>>;

    /// List available models
    async fn list_models(&self) -> Result<Vec<ModelInfo>>;

    /// Check if a specific model is available
    async fn has_model(&self, model: &str) -> Result<bool> {
        let models = self.list_models().await?;
        Ok(models
            .iter()
            .any(|m| m.name == model || m.name.split(':').next() == Some(model)))
    }
}
