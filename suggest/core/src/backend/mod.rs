//! Upstream Generation Backend
//!
//! Access to the model server behind a common trait interface.
//!
//! # Usage
//!
//! ```ignore
//! use suggest_core::backend::{GenerationBackend, GenerationRequest, OllamaBackend};
//!
//! let backend = OllamaBackend::from_env()?;
//! let request = GenerationRequest::new("Suggest a structure", "llama3.2");
//! let mut rx = backend.generate_stream(&request).await?;
//! ```

mod ollama;
mod traits;

pub(crate) use ollama::ollama_base_url_from_env;
pub use ollama::{OllamaBackend, DEFAULT_OLLAMA_PORT};
pub use traits::{
    GenerateResponse, GenerationBackend, GenerationRequest, ModelInfo, SamplingOptions,
    StreamingToken,
};
