//! Stream Relay
//!
//! Forwards one upstream generation as JSON lines, one line per fragment,
//! as soon as each fragment is decoded.
//!
//! ```text
//!  SuggestionRequest ─▶ PromptBuilder ─▶ backend.generate_stream ─┐
//!                                                                  │ StreamingToken
//!  downstream ◀── RelayRecord\n ◀── encode_token ◀── ReceiverStream ◀┘
//! ```
//!
//! # Failure handling
//!
//! - Anything that fails before the upstream accepted the request is
//!   returned as `Err` and no stream exists.
//! - A failure after that point becomes a single error record, written as
//!   the last line; records already written stand.
//!
//! Every invocation opens exactly one upstream call. Dropping the returned
//! stream drops the fragment receiver, which aborts the upstream read.

use std::sync::Arc;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{future, StreamExt};
use serde::Serialize;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use crate::backend::{GenerationBackend, StreamingToken};
use crate::error::Result;
use crate::framing::{ContextToken, RelayRecord};
use crate::prompt::{PromptBuilder, SuggestionRequest};

/// Downstream body: encoded relay records, each ending in `\n`
pub type RecordStream = BoxStream<'static, Bytes>;

/// Complete answer of the non-streaming variant
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    /// Complete suggestion text
    pub suggestions: String,
    /// Continuation token for a follow-up request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextToken>,
}

/// Relay between editor requests and the generation backend
///
/// Holds only immutable shared state, so one value serves all connections.
pub struct Relay<B> {
    backend: Arc<B>,
    prompts: PromptBuilder,
}

impl<B> Clone for Relay<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            prompts: self.prompts.clone(),
        }
    }
}

impl<B: GenerationBackend + 'static> Relay<B> {
    /// Create a relay over `backend`
    pub fn new(backend: Arc<B>, prompts: PromptBuilder) -> Self {
        Self { backend, prompts }
    }

    /// The generation backend
    #[must_use]
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Model requests are sent to
    #[must_use]
    pub fn model(&self) -> &str {
        self.prompts.model()
    }

    /// Generate a complete suggestion without streaming
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for a rejected request, or the upstream
    /// failure.
    pub async fn suggest(&self, request: &SuggestionRequest) -> Result<Suggestion> {
        let generation = self.prompts.build(request)?.with_stream(false);

        let response = self.backend.generate(&generation).await.map_err(|e| {
            error!(error = %e, kind = e.kind(), "Upstream generation failed");
            e
        })?;

        info!(
            content_type = %request.content_type,
            chars = response.response.chars().count(),
            "Suggestion generated"
        );
        Ok(Suggestion {
            suggestions: response.response,
            context: response.context.filter(|c| !c.is_empty()),
        })
    }

    /// Open one upstream stream and forward it as relay records
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for a rejected request, or the upstream
    /// failure if it happened before any fragment.
    pub async fn relay(&self, request: &SuggestionRequest) -> Result<RecordStream> {
        let generation = self.prompts.build(request)?.with_stream(true);

        let rx = self
            .backend
            .generate_stream(&generation)
            .await
            .map_err(|e| {
                error!(error = %e, kind = e.kind(), "Upstream stream could not be opened");
                e
            })?;

        debug!(
            backend = self.backend.name(),
            content_type = %request.content_type,
            "Relaying upstream stream"
        );
        Ok(ReceiverStream::new(rx)
            .filter_map(|token| future::ready(encode_token(token)))
            .boxed())
    }
}

/// Encode one backend event as a relay line
///
/// Empty non-final fragments carry nothing and produce no line.
fn encode_token(token: StreamingToken) -> Option<Bytes> {
    let record = match token {
        StreamingToken::Fragment(fragment) if fragment.is_empty() => return None,
        StreamingToken::Fragment(fragment) => RelayRecord::from(fragment),
        StreamingToken::Error(e) => {
            error!(error = %e, kind = e.kind(), "Upstream failed mid-stream");
            RelayRecord::error(e.to_string())
        }
    };

    match record.to_line() {
        Ok(line) => Some(line),
        Err(e) => {
            warn!(error = %e, "Failed to encode relay record");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{GenerateResponse, GenerationRequest, ModelInfo};
    use crate::error::SuggestError;
    use crate::framing::Fragment;
    use crate::prompt::Templatize;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    struct Plain;

    impl Templatize for Plain {
        fn guidance(&self, _content_type: &str) -> String {
            "Suggest.".to_string()
        }
    }

    /// Backend that replays a fixed script
    struct ScriptedBackend {
        script: std::result::Result<Vec<StreamingToken>, SuggestError>,
        calls: AtomicUsize,
        /// Keeps the stream open after the script when set
        held_sender: Mutex<Option<mpsc::Sender<StreamingToken>>>,
        hold_open: bool,
    }

    impl ScriptedBackend {
        fn new(script: std::result::Result<Vec<StreamingToken>, SuggestError>) -> Self {
            Self {
                script,
                calls: AtomicUsize::new(0),
                held_sender: Mutex::new(None),
                hold_open: false,
            }
        }
    }

    #[async_trait]
    impl GenerationBackend for ScriptedBackend {
        fn name(&self) -> &'static str {
            "Scripted"
        }

        async fn health_check(&self) -> bool {
            true
        }

        async fn generate(&self, _request: &GenerationRequest) -> Result<GenerateResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let tokens = self.script.clone()?;
            let mut text = String::new();
            for token in tokens {
                if let StreamingToken::Fragment(f) = token {
                    text.push_str(&f.delta);
                }
            }
            Ok(GenerateResponse {
                response: text,
                ..Default::default()
            })
        }

        async fn generate_stream(
            &self,
            _request: &GenerationRequest,
        ) -> Result<mpsc::Receiver<StreamingToken>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let tokens = self.script.clone()?;
            let (tx, rx) = mpsc::channel(tokens.len() + 1);
            for token in tokens {
                tx.try_send(token).unwrap();
            }
            if self.hold_open {
                *self.held_sender.lock().unwrap() = Some(tx);
            }
            Ok(rx)
        }

        async fn list_models(&self) -> Result<Vec<ModelInfo>> {
            Ok(Vec::new())
        }
    }

    fn relay(backend: ScriptedBackend) -> Relay<ScriptedBackend> {
        Relay::new(Arc::new(backend), PromptBuilder::new(Arc::new(Plain), "m"))
    }

    async fn body(stream: RecordStream) -> String {
        let chunks: Vec<Bytes> = stream.collect().await;
        chunks
            .iter()
            .map(|c| std::str::from_utf8(c).unwrap())
            .collect()
    }

    fn request() -> SuggestionRequest {
        SuggestionRequest::new("H5P.Course", "intro to photosynthesis")
    }

    #[tokio::test]
    async fn test_relay_one_line_per_fragment() {
        let relay = relay(ScriptedBackend::new(Ok(vec![
            StreamingToken::Fragment(Fragment::delta("Struct")),
            StreamingToken::Fragment(Fragment::delta("")),
            StreamingToken::Fragment(Fragment::delta("ure: ")),
            StreamingToken::Fragment(Fragment {
                delta: String::new(),
                context: Some(ContextToken(vec![3])),
                is_final: true,
            }),
        ])));

        let stream = relay.relay(&request()).await.unwrap();
        let chunks: Vec<Bytes> = stream.collect().await;

        assert_eq!(
            chunks,
            vec![
                Bytes::from_static(b"{\"response\":\"Struct\"}\n"),
                Bytes::from_static(b"{\"response\":\"ure: \"}\n"),
                Bytes::from_static(b"{\"response\":\"\",\"context\":[3],\"done\":true}\n"),
            ]
        );
        assert_eq!(relay.backend().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_relay_mid_stream_failure_writes_error_record_last() {
        let relay = relay(ScriptedBackend::new(Ok(vec![
            StreamingToken::Fragment(Fragment::delta("Half")),
            StreamingToken::Error(SuggestError::UpstreamMidStreamFailure("reset".into())),
        ])));

        let text = body(relay.relay(&request()).await.unwrap()).await;
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"response":"Half"}"#);
        let last: RelayRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(
            last,
            RelayRecord::error("Upstream failed mid-stream: reset")
        );
    }

    #[tokio::test]
    async fn test_relay_failure_before_stream_is_err() {
        let relay = relay(ScriptedBackend::new(Err(SuggestError::UpstreamUnreachable(
            "connection refused".into(),
        ))));

        let result = relay.relay(&request()).await;
        assert!(matches!(result, Err(SuggestError::UpstreamUnreachable(_))));
    }

    #[tokio::test]
    async fn test_invalid_request_never_reaches_upstream() {
        let relay = relay(ScriptedBackend::new(Ok(Vec::new())));

        let result = relay
            .relay(&SuggestionRequest::new("H5P.Course", "  "))
            .await;
        assert!(matches!(result, Err(SuggestError::InvalidRequest(_))));
        assert_eq!(relay.backend().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dropping_stream_releases_upstream() {
        let mut backend = ScriptedBackend::new(Ok(vec![StreamingToken::Fragment(
            Fragment::delta("a"),
        )]));
        backend.hold_open = true;
        let relay = relay(backend);

        let mut stream = relay.relay(&request()).await.unwrap();
        assert!(stream.next().await.is_some());

        let sender = relay.backend().held_sender.lock().unwrap().clone().unwrap();
        assert!(!sender.is_closed());
        drop(stream);
        assert!(sender.is_closed());
    }

    #[tokio::test]
    async fn test_suggest_non_streaming() {
        let relay = relay(ScriptedBackend::new(Ok(vec![
            StreamingToken::Fragment(Fragment::delta("Structure: ")),
            StreamingToken::Fragment(Fragment::delta("intro")),
        ])));

        let suggestion = relay.suggest(&request()).await.unwrap();
        assert_eq!(suggestion.suggestions, "Structure: intro");
        assert_eq!(
            serde_json::to_value(&suggestion).unwrap(),
            serde_json::json!({"suggestions": "Structure: intro"})
        );
    }
}
