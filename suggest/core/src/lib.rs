//! Suggest Core - Incremental Suggestion Streaming
//!
//! This crate implements the incremental response protocol between an
//! authoring editor and a locally hosted language model: how one request
//! becomes a stream of JSON lines, how the lines are reassembled into a
//! growing message, how an in-flight request is cancelled, and how partial
//! failures end without corrupting text already received.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐        ┌──────────────────────────┐
//! │      STREAM CONSUMER     │  POST  │        STREAM RELAY       │
//! │  StreamConsumer          │ ─────▶ │  Relay                    │
//! │  MessageLog, StreamHandle│        │  PromptBuilder            │
//! │  HttpTransport           │ ◀───── │                           │
//! └──────────────────────────┘ JSON   └─────────────┬─────────────┘
//!                              lines        POST    │  ▲ JSON lines
//!                                                   ▼  │
//!                                     ┌──────────────────────────┐
//!                                     │  GenerationBackend        │
//!                                     │  OllamaBackend            │
//!                                     │  (/api/generate)          │
//!                                     └──────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`Relay`]: forwards one upstream generation as relay records
//! - [`StreamConsumer`]: folds relay records into the open message
//! - [`StreamHandle`]: cancellation handle for one in-flight request
//! - [`MessageLog`]: append-only conversation with one open message
//! - [`SuggestError`]: failure kinds shared by every hop
//!
//! # Quick Start
//!
//! ```ignore
//! use suggest_core::{HttpTransport, StreamConsumer};
//! use std::time::Duration;
//!
//! let transport = HttpTransport::new("http://127.0.0.1:3001", Duration::from_secs(5))?;
//! let mut consumer = StreamConsumer::new(transport, "H5P.Course");
//!
//! consumer.submit("intro to photosynthesis")?;
//! let outcome = consumer.run().await;
//! println!("{}", consumer.messages().last().unwrap().text());
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: upstream generation client (Ollama)
//! - [`config`]: TOML, environment and CLI configuration
//! - [`error`]: protocol error kinds
//! - [`framing`]: JSON-lines records, line assembly and folding
//! - [`messages`]: message log
//! - [`prompt`]: editor request validation and prompt building
//! - [`relay`]: stream relay
//! - [`streaming`]: stream consumer, handles and transports

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod config;
pub mod error;
pub mod framing;
pub mod messages;
pub mod prompt;
pub mod relay;
pub mod streaming;

// Re-exports for convenience
pub use backend::{
    GenerateResponse, GenerationBackend, GenerationRequest, ModelInfo, OllamaBackend,
    SamplingOptions, StreamingToken,
};
pub use error::{Result, SuggestError};
pub use framing::{ContextToken, Fragment, RelayRecord};
pub use messages::{Message, MessageId, MessageLog, MessageRole, MessageStatus};
pub use prompt::{GuidanceTable, PromptBuilder, SuggestionRequest, Templatize};
pub use relay::{RecordStream, Relay, Suggestion};

// Streaming exports
pub use streaming::{
    ByteStream, ConsumerEvent, ConsumerState, CycleOutcome, HttpTransport, Progress,
    ResponseTransport, StreamConsumer, StreamHandle, StreamStats,
};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, ConfigOverrides,
    ConfigSource, ConsumerConfig, PromptConfig, RelayConfig, SuggestConfig, SuggestToml,
    UpstreamConfig,
};
