//! Prompt Building
//!
//! Turns an editor request (`{ contentType, description }`) into one
//! [`GenerationRequest`]. The guidance text per content type comes from a
//! [`Templatize`] implementation and is treated as opaque.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backend::{GenerationRequest, SamplingOptions};
use crate::config::{PromptConfig, SuggestConfig};
use crate::error::{Result, SuggestError};
use crate::framing::ContextToken;

/// Request body sent by the editor
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionRequest {
    /// Editor content type, e.g. `H5P.Course`
    pub content_type: String,
    /// Free-text description of what the author wants
    pub description: String,
    /// Continuation token from the previous answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextToken>,
}

impl SuggestionRequest {
    /// Create a request without a continuation token
    pub fn new(content_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            description: description.into(),
            context: None,
        }
    }

    /// Attach a continuation token
    #[must_use]
    pub fn with_context(mut self, context: Option<ContextToken>) -> Self {
        self.context = context;
        self
    }
}

/// Source of per-content-type guidance
pub trait Templatize: Send + Sync {
    /// Guidance text for `content_type`
    fn guidance(&self, content_type: &str) -> String;
}

/// Guidance looked up from configuration, with a fallback entry
#[derive(Clone, Debug, Default)]
pub struct GuidanceTable {
    default_guidance: String,
    entries: BTreeMap<String, String>,
}

impl GuidanceTable {
    /// Build the table from the prompts section of the configuration
    #[must_use]
    pub fn from_config(config: &PromptConfig) -> Self {
        Self {
            default_guidance: config.default_guidance.clone(),
            entries: config.guidance.clone(),
        }
    }
}

impl Templatize for GuidanceTable {
    fn guidance(&self, content_type: &str) -> String {
        self.entries
            .get(content_type)
            .unwrap_or(&self.default_guidance)
            .clone()
    }
}

/// Builds upstream requests from editor requests
#[derive(Clone)]
pub struct PromptBuilder {
    templates: Arc<dyn Templatize>,
    model: String,
    options: SamplingOptions,
    max_description_length: usize,
}

impl std::fmt::Debug for PromptBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptBuilder")
            .field("model", &self.model)
            .field("options", &self.options)
            .field("max_description_length", &self.max_description_length)
            .finish_non_exhaustive()
    }
}

impl PromptBuilder {
    /// Create a builder with an explicit guidance source
    pub fn new(templates: Arc<dyn Templatize>, model: impl Into<String>) -> Self {
        Self {
            templates,
            model: model.into(),
            options: SamplingOptions::default(),
            max_description_length: 2000,
        }
    }

    /// Create a builder from the full configuration
    #[must_use]
    pub fn from_config(config: &SuggestConfig) -> Self {
        Self::new(
            Arc::new(GuidanceTable::from_config(&config.prompts)),
            config.upstream.model.clone(),
        )
        .with_options(config.upstream.options.clone())
        .with_max_description_length(config.relay.max_description_length)
    }

    /// Set sampling options
    #[must_use]
    pub fn with_options(mut self, options: SamplingOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the description length limit (characters)
    #[must_use]
    pub fn with_max_description_length(mut self, max: usize) -> Self {
        self.max_description_length = max;
        self
    }

    /// Model every request is sent to
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Validate `request` and build the upstream request for it
    ///
    /// # Errors
    ///
    /// Returns [`SuggestError::InvalidRequest`] for a blank content type, a
    /// blank description or a description over the length limit.
    pub fn build(&self, request: &SuggestionRequest) -> Result<GenerationRequest> {
        let content_type = request.content_type.trim();
        let description = request.description.trim();

        if content_type.is_empty() {
            return Err(SuggestError::InvalidRequest(
                "contentType must not be empty".to_string(),
            ));
        }
        if description.is_empty() {
            return Err(SuggestError::InvalidRequest(
                "description must not be empty".to_string(),
            ));
        }
        let length = description.chars().count();
        if length > self.max_description_length {
            return Err(SuggestError::InvalidRequest(format!(
                "description is {length} characters, limit is {}",
                self.max_description_length
            )));
        }

        let prompt = format!(
            "{}\n\nContent type: {content_type}\nDescription: {description}",
            self.templates.guidance(content_type)
        );

        Ok(GenerationRequest::new(prompt, self.model.clone())
            .with_context(request.context.clone())
            .with_options(self.options.clone()))
    }
}
