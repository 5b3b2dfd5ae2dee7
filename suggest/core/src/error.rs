//! Error Types
//!
//! Failure kinds of the incremental response protocol. Every hop (upstream
//! client, relay, consumer) reports failures with [`SuggestError`] so the
//! consumer can decide how a failure shows up on the open message.
//!
//! # Propagation
//!
//! - `MalformedFragment` and `Cancelled` are absorbed by the consumer
//! - `UpstreamUnreachable`, `UpstreamStatus` and `UpstreamMidStreamFailure`
//!   end the cycle and become a visible terminal state on the message
//! - `RequestRejectedConcurrent` is returned synchronously from `submit`
//!
//! The error carries only owned strings so it can be cloned into events and
//! compared in tests.

use thiserror::Error;

/// Errors produced by the suggestion streaming protocol
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SuggestError {
    /// The connection to the next hop was never established (or timed out)
    #[error("Upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    /// The next hop answered with a non-success status before any byte of body
    #[error("Upstream returned {status}: {message}")]
    UpstreamStatus {
        /// HTTP status code
        status: u16,
        /// Response body or reason phrase
        message: String,
    },

    /// The stream broke after some data had already been delivered
    #[error("Upstream failed mid-stream: {0}")]
    UpstreamMidStreamFailure(String),

    /// A single line could not be parsed as a record
    ///
    /// The consumer skips such lines and logs them under this kind; it is
    /// never returned from a cycle.
    #[error("Malformed fragment: {0}")]
    MalformedFragment(String),

    /// A request was submitted while another one was still streaming
    #[error("A suggestion request is already in flight")]
    RequestRejectedConcurrent,

    /// The stream was cancelled by its owner
    ///
    /// Cancellation is reported through `CycleOutcome::Cancelled`; this
    /// variant only classifies it in logs.
    #[error("Stream cancelled")]
    Cancelled,

    /// The request failed validation before anything was sent upstream
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl SuggestError {
    /// Map a transport error that happened while establishing a connection
    #[must_use]
    pub fn from_connect(err: &reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::UpstreamStatus {
                status: status.as_u16(),
                message: err.to_string(),
            };
        }
        Self::UpstreamUnreachable(err.to_string())
    }

    /// Map a transport error that happened while reading a response body
    #[must_use]
    pub fn from_body(err: &reqwest::Error) -> Self {
        Self::UpstreamMidStreamFailure(err.to_string())
    }

    /// Whether the failure leaves a user-visible terminal state on the message
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::UpstreamUnreachable(_)
                | Self::UpstreamStatus { .. }
                | Self::UpstreamMidStreamFailure(_)
        )
    }

    /// Short machine-readable name, used in logs and error records
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UpstreamUnreachable(_) => "upstream_unreachable",
            Self::UpstreamStatus { .. } => "upstream_status",
            Self::UpstreamMidStreamFailure(_) => "upstream_mid_stream_failure",
            Self::MalformedFragment(_) => "malformed_fragment",
            Self::RequestRejectedConcurrent => "request_rejected_concurrent",
            Self::Cancelled => "cancelled",
            Self::InvalidRequest(_) => "invalid_request",
        }
    }
}

/// Convenience alias
pub type Result<T> = std::result::Result<T, SuggestError>;
