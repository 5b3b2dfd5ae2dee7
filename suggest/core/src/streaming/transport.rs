//! Response transports
//!
//! The consumer reads relay records through [`ResponseTransport`] so the
//! state machine can be driven by HTTP in production and by scripted byte
//! streams in tests.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Deserialize;

use crate::error::{Result, SuggestError};
use crate::prompt::SuggestionRequest;

/// Response body as a stream of raw reads
///
/// Chunk boundaries are arbitrary. An `Err` item ends the stream.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Opens one streaming response per request
#[async_trait]
pub trait ResponseTransport: Send + Sync {
    /// Send `request` and return the response body once it is accepted
    ///
    /// A connection failure or a non-success status is returned as `Err`
    /// before any body exists.
    async fn open(&self, request: &SuggestionRequest) -> Result<ByteStream>;
}

/// HTTP transport posting to the relay's stream endpoint
#[derive(Clone, Debug)]
pub struct HttpTransport {
    stream_url: String,
    http_client: reqwest::Client,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl HttpTransport {
    /// Create a transport for the relay at `relay_url`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(relay_url: &str, connect_timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| {
                SuggestError::UpstreamUnreachable(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            stream_url: format!("{}/api/suggestions/stream", relay_url.trim_end_matches('/')),
            http_client,
        })
    }

    /// Endpoint requests are posted to
    #[must_use]
    pub fn stream_url(&self) -> &str {
        &self.stream_url
    }
}

#[async_trait]
impl ResponseTransport for HttpTransport {
    async fn open(&self, request: &SuggestionRequest) -> Result<ByteStream> {
        let response = self
            .http_client
            .post(&self.stream_url)
            .json(request)
            .send()
            .await
            .map_err(|e| SuggestError::from_connect(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.error)
                .unwrap_or(body);
            return Err(SuggestError::UpstreamStatus {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| SuggestError::from_body(&e)))
            .boxed())
    }
}
