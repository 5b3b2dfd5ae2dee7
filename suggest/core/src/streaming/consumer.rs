//! Stream Consumer
//!
//! Client-side state machine that submits a request, reads the relay's
//! response incrementally and folds each record into the open assistant
//! message.
//!
//! # State Machine
//!
//! ```text
//!          submit             open ok
//!   Idle ─────────▶ Sending ─────────▶ Streaming ── done / end of body ──▶ Closing ──▶ Idle
//!                     │                  │  │                                ▲
//!                     │                  │  └────────── cancelled ───────────┘
//!                     │ open failed      │ error record / transport failure
//!                     ▼                  │
//!                  Errored ◀─────────────┘
//!                     └────────────────────────────────────────────────────────────────▶ Idle
//! ```
//!
//! Every cycle ends back in `Idle`. The read is the only suspension point
//! and is raced against the handle's cancellation token, so a cancel
//! unblocks a pending read. Once cancelled, nothing more is applied even if
//! bytes were already buffered.
//!
//! # Ownership
//!
//! A consumer owns at most one live [`StreamHandle`]. `submit` while one is
//! live is rejected without touching the message log. Dropping the consumer
//! cancels the live handle.

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::handle::{StreamHandle, StreamStats};
use super::transport::{ByteStream, ResponseTransport};
use crate::config::ConsumerConfig;
use crate::error::{Result, SuggestError};
use crate::framing::{ContextToken, LineAssembler, LineOutcome, RawLine};
use crate::messages::{Message, MessageId, MessageLog, MessageRole, MessageStatus};
use crate::prompt::SuggestionRequest;

/// Consumer lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsumerState {
    /// No request in flight
    Idle,
    /// Request dispatched, waiting for the response to open
    Sending,
    /// Reading the response body
    Streaming,
    /// Closing the message after completion or cancellation
    Closing,
    /// Closing the message after a failure
    Errored,
}

impl ConsumerState {
    /// Short human-readable description
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Idle => "Ready",
            Self::Sending => "Sending...",
            Self::Streaming => "Receiving...",
            Self::Closing => "Finishing...",
            Self::Errored => "Failed",
        }
    }

    /// Whether a request is in flight
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Sending | Self::Streaming)
    }
}

/// Notifications for a renderer
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsumerEvent {
    /// A message was appended to the log
    MessageAppended {
        /// Message ID
        id: MessageId,
        /// Who sent it
        role: MessageRole,
    },
    /// Text was appended to the open message
    Delta {
        /// Message ID
        id: MessageId,
        /// Appended text
        text: String,
    },
    /// The open message closed normally
    StreamEnd {
        /// Message ID
        id: MessageId,
        /// Final text
        text: String,
        /// Cycle counters
        stats: StreamStats,
    },
    /// The open message was closed by a cancel
    StreamCancelled {
        /// Message ID
        id: MessageId,
        /// Text received before the cancel
        text: String,
    },
    /// The cycle failed
    StreamError {
        /// Message ID
        id: MessageId,
        /// What went wrong
        error: SuggestError,
        /// Text shown on the message (partial text or apology)
        text: String,
    },
    /// The consumer changed state
    State(ConsumerState),
}

/// Result of one [`StreamConsumer::pump`] step
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Progress {
    /// Nothing in flight
    Idle,
    /// The cycle is still running
    Pending,
    /// The cycle ended during this step
    Finished(CycleOutcome),
}

/// How a submit cycle ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Closed by a `done` record or end of body
    Completed(StreamStats),
    /// Closed by the owner
    Cancelled(StreamStats),
    /// Closed by a failure
    Failed {
        /// What went wrong
        error: SuggestError,
        /// Cycle counters
        stats: StreamStats,
    },
}

impl CycleOutcome {
    /// Counters of the cycle
    #[must_use]
    pub fn stats(&self) -> &StreamStats {
        match self {
            Self::Completed(stats) | Self::Cancelled(stats) => stats,
            Self::Failed { stats, .. } => stats,
        }
    }
}

/// Why a cycle is ending
enum Terminal {
    Completed,
    Cancelled,
    Failed(SuggestError),
}

/// The single in-flight request
struct ActiveStream {
    handle: StreamHandle,
    request: SuggestionRequest,
    /// Present once the transport opened
    body: Option<ByteStream>,
    assembler: LineAssembler,
    stats: StreamStats,
    /// Continuation token seen during this cycle
    context: Option<ContextToken>,
}

fn emit(events: &Option<mpsc::UnboundedSender<ConsumerEvent>>, event: ConsumerEvent) {
    if let Some(tx) = events {
        // A renderer that went away does not stop the stream
        let _ = tx.send(event);
    }
}

/// Client-side stream consumer
pub struct StreamConsumer<T> {
    transport: Arc<T>,
    config: ConsumerConfig,
    log: MessageLog,
    state: ConsumerState,
    active: Option<ActiveStream>,
    /// Continuation token of the last completed cycle
    context: Option<ContextToken>,
    last_error: Option<SuggestError>,
    events: Option<mpsc::UnboundedSender<ConsumerEvent>>,
}

impl<T: ResponseTransport> StreamConsumer<T> {
    /// Create a consumer sending every submit with `content_type`
    pub fn new(transport: T, content_type: impl Into<String>) -> Self {
        let config = ConsumerConfig {
            content_type: content_type.into(),
            ..ConsumerConfig::default()
        };
        Self::with_config(transport, config)
    }

    /// Create a consumer from the consumer section of the configuration
    pub fn with_config(transport: T, config: ConsumerConfig) -> Self {
        Self {
            transport: Arc::new(transport),
            config,
            log: MessageLog::new(),
            state: ConsumerState::Idle,
            active: None,
            context: None,
            last_error: None,
            events: None,
        }
    }

    /// Send render notifications to `tx`
    #[must_use]
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<ConsumerEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// All messages, oldest first
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        self.log.messages()
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> ConsumerState {
        self.state
    }

    /// Failure of the most recent failed cycle
    #[must_use]
    pub fn last_error(&self) -> Option<&SuggestError> {
        self.last_error.as_ref()
    }

    /// Continuation token the next submit will carry
    #[must_use]
    pub fn context(&self) -> Option<&ContextToken> {
        self.context.as_ref()
    }

    /// Handle of the live request, if any
    #[must_use]
    pub fn handle(&self) -> Option<StreamHandle> {
        self.active.as_ref().map(|a| a.handle.clone())
    }

    /// Whether a request is in flight
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    /// Submit a description
    ///
    /// Appends the user message and the empty assistant placeholder, then
    /// enters `Sending`. Call [`run`](Self::run) or [`pump`](Self::pump) to
    /// drive the request.
    ///
    /// # Errors
    ///
    /// Returns [`SuggestError::RequestRejectedConcurrent`] while another
    /// request is live; the message log is left untouched. A request whose
    /// handle was cancelled is no longer live: its cycle is closed here
    /// before the new one starts.
    pub fn submit(&mut self, text: impl Into<String>) -> Result<StreamHandle> {
        if self
            .active
            .as_ref()
            .is_some_and(|active| active.handle.is_cancelled())
        {
            self.finish(Terminal::Cancelled);
        }
        if self.active.is_some() || self.log.open_message().is_some() {
            warn!("Submit rejected, a request is already in flight");
            return Err(SuggestError::RequestRejectedConcurrent);
        }
        let text = text.into();

        let user_id = self.log.push_user(text.clone()).id().clone();
        emit(
            &self.events,
            ConsumerEvent::MessageAppended {
                id: user_id,
                role: MessageRole::User,
            },
        );
        if let Some(placeholder) = self.log.open_assistant() {
            emit(
                &self.events,
                ConsumerEvent::MessageAppended {
                    id: placeholder.id().clone(),
                    role: MessageRole::Assistant,
                },
            );
        }

        let handle = StreamHandle::new();
        let request = SuggestionRequest::new(self.config.content_type.clone(), text)
            .with_context(self.context.clone());
        self.active = Some(ActiveStream {
            handle: handle.clone(),
            request,
            body: None,
            assembler: LineAssembler::new(self.config.max_line_bytes),
            stats: StreamStats::started(),
            context: None,
        });

        debug!(stream_id = %handle.id(), "Request submitted");
        self.set_state(ConsumerState::Sending);
        Ok(handle)
    }

    /// Cancel the live request, if any
    ///
    /// The cycle closes on the next [`pump`](Self::pump) or
    /// [`submit`](Self::submit), whichever comes first.
    pub fn cancel(&self) {
        if let Some(active) = &self.active {
            active.handle.cancel();
        }
    }

    /// Drive the current cycle until it ends
    ///
    /// Returns `None` if nothing was in flight.
    pub async fn run(&mut self) -> Option<CycleOutcome> {
        loop {
            match self.pump().await {
                Progress::Idle => return None,
                Progress::Pending => {}
                Progress::Finished(outcome) => return Some(outcome),
            }
        }
    }

    /// Perform one step of the current cycle
    ///
    /// In `Sending` this opens the transport; in `Streaming` it awaits one
    /// read and applies every line the read completed.
    pub async fn pump(&mut self) -> Progress {
        let Some(active) = self.active.as_ref() else {
            return Progress::Idle;
        };
        if active.handle.is_cancelled() {
            return Progress::Finished(self.finish(Terminal::Cancelled));
        }

        if active.body.is_none() {
            self.open_step().await
        } else {
            self.read_step().await
        }
    }

    async fn open_step(&mut self) -> Progress {
        let Some(active) = self.active.as_ref() else {
            return Progress::Idle;
        };
        let token = active.handle.token().clone();
        let request = active.request.clone();
        let transport = Arc::clone(&self.transport);
        let open_timeout = self.config.open_timeout;

        let opened = tokio::select! {
            biased;
            () = token.cancelled() => None,
            result = tokio::time::timeout(open_timeout, transport.open(&request)) => Some(result),
        };

        let body = match opened {
            None => return Progress::Finished(self.finish(Terminal::Cancelled)),
            Some(Ok(Ok(body))) => body,
            Some(Ok(Err(e))) => return Progress::Finished(self.finish(Terminal::Failed(e))),
            Some(Err(_)) => {
                let error = SuggestError::UpstreamUnreachable(format!(
                    "no response within {}ms",
                    open_timeout.as_millis()
                ));
                return Progress::Finished(self.finish(Terminal::Failed(error)));
            }
        };

        if let Some(active) = self.active.as_mut() {
            active.body = Some(body);
        }
        self.set_state(ConsumerState::Streaming);
        Progress::Pending
    }

    async fn read_step(&mut self) -> Progress {
        let Some(active) = self.active.as_mut() else {
            return Progress::Idle;
        };
        let Some(body) = active.body.as_mut() else {
            return Progress::Pending;
        };
        let token = active.handle.token().clone();

        let read = tokio::select! {
            biased;
            () = token.cancelled() => None,
            chunk = body.next() => Some(chunk),
        };

        let terminal = match read {
            None => Some(Terminal::Cancelled),
            Some(Some(Ok(bytes))) => {
                active.stats.bytes_received += bytes.len() as u64;
                let lines = active.assembler.push(&bytes);
                self.apply_lines(lines)
            }
            Some(Some(Err(e))) => Some(Terminal::Failed(e)),
            Some(None) => {
                let trailing: Vec<RawLine> = active.assembler.finish().into_iter().collect();
                Some(self.apply_lines(trailing).unwrap_or(Terminal::Completed))
            }
        };

        match terminal {
            Some(terminal) => Progress::Finished(self.finish(terminal)),
            None => Progress::Pending,
        }
    }

    /// Fold complete lines into the open message, in order
    ///
    /// Returns the terminal condition a line triggered, if any.
    fn apply_lines(&mut self, lines: Vec<RawLine>) -> Option<Terminal> {
        let active = self.active.as_mut()?;

        for line in lines {
            if active.handle.is_cancelled() {
                return Some(Terminal::Cancelled);
            }

            let line = match line {
                RawLine::Text(line) => line,
                RawLine::Invalid(reason) => {
                    let skipped = SuggestError::MalformedFragment(reason);
                    warn!(kind = skipped.kind(), error = %skipped, "Skipping undecodable line");
                    active.stats.malformed_skipped += 1;
                    continue;
                }
            };

            match self.log.fold_into_open(&line)? {
                LineOutcome::Blank => {}
                LineOutcome::Malformed(reason) => {
                    let skipped = SuggestError::MalformedFragment(reason);
                    warn!(
                        line = %line,
                        kind = skipped.kind(),
                        error = %skipped,
                        "Skipping malformed fragment"
                    );
                    active.stats.malformed_skipped += 1;
                }
                LineOutcome::UpstreamError(message) => {
                    return Some(Terminal::Failed(SuggestError::UpstreamMidStreamFailure(
                        message,
                    )));
                }
                LineOutcome::Applied(fragment) => {
                    active.stats.fragments_applied += 1;
                    if !fragment.delta.is_empty() {
                        if let Some(open) = self.log.open_message() {
                            emit(
                                &self.events,
                                ConsumerEvent::Delta {
                                    id: open.id().clone(),
                                    text: fragment.delta,
                                },
                            );
                        }
                    }
                    if let Some(context) = fragment.context {
                        active.context = Some(context);
                    }
                    if fragment.is_final {
                        return Some(Terminal::Completed);
                    }
                }
            }
        }
        None
    }

    /// Close the open message, release the transport and return to `Idle`
    fn finish(&mut self, terminal: Terminal) -> CycleOutcome {
        let (mut stats, context, stream_id) = match self.active.take() {
            Some(active) => (active.stats, active.context, Some(active.handle.id())),
            None => (StreamStats::default(), None, None),
        };
        stats.finished_at = Some(Instant::now());

        let outcome = match terminal {
            Terminal::Completed => {
                self.set_state(ConsumerState::Closing);
                if context.is_some() {
                    self.context = context;
                }
                let closed = self.log.close_open(MessageStatus::Complete, &self.config.apology);
                if let Some(msg) = closed {
                    emit(
                        &self.events,
                        ConsumerEvent::StreamEnd {
                            id: msg.id().clone(),
                            text: msg.text().to_string(),
                            stats: stats.clone(),
                        },
                    );
                }
                info!(
                    stream_id = ?stream_id,
                    fragments = stats.fragments_applied,
                    skipped = stats.malformed_skipped,
                    bytes = stats.bytes_received,
                    elapsed_ms = stats.elapsed().as_millis() as u64,
                    "Stream complete"
                );
                CycleOutcome::Completed(stats)
            }
            Terminal::Cancelled => {
                self.set_state(ConsumerState::Closing);
                let closed = self.log.close_open(MessageStatus::Cancelled, &self.config.apology);
                if let Some(msg) = closed {
                    emit(
                        &self.events,
                        ConsumerEvent::StreamCancelled {
                            id: msg.id().clone(),
                            text: msg.text().to_string(),
                        },
                    );
                }
                let cancelled = SuggestError::Cancelled;
                info!(
                    stream_id = ?stream_id,
                    kind = cancelled.kind(),
                    fragments = stats.fragments_applied,
                    "Stream cancelled"
                );
                CycleOutcome::Cancelled(stats)
            }
            Terminal::Failed(error) => {
                self.set_state(ConsumerState::Errored);
                warn!(stream_id = ?stream_id, error = %error, kind = error.kind(), "Stream failed");
                let status = MessageStatus::Failed {
                    error: error.to_string(),
                };
                if let Some(msg) = self.log.close_open(status, &self.config.apology) {
                    emit(
                        &self.events,
                        ConsumerEvent::StreamError {
                            id: msg.id().clone(),
                            error: error.clone(),
                            text: msg.text().to_string(),
                        },
                    );
                }
                self.last_error = Some(error.clone());
                CycleOutcome::Failed { error, stats }
            }
        };

        self.set_state(ConsumerState::Idle);
        outcome
    }

    fn set_state(&mut self, state: ConsumerState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "Consumer state change");
            self.state = state;
            emit(&self.events, ConsumerEvent::State(state));
        }
    }
}

impl<T> Drop for StreamConsumer<T> {
    fn drop(&mut self) {
        if let Some(active) = &self.active {
            active.handle.cancel();
        }
    }
}
