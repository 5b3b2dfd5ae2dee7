//! Terminal rendering of consumer events
//!
//! Deltas are written as they arrive so the suggestion grows in place.
//! Everything that is not suggestion text goes in square brackets on its
//! own line.

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use suggest_core::{ConsumerEvent, MessageRole};

/// Label printed before each suggestion
pub const ASSISTANT_LABEL: &str = "suggest> ";

/// Writes consumer events to a terminal-like sink
#[derive(Debug)]
pub struct Renderer<W> {
    out: W,
    /// Whether any delta was printed for the open message
    streamed: bool,
}

impl<W: AsyncWrite + Unpin> Renderer<W> {
    /// Create a renderer writing to `out`
    pub fn new(out: W) -> Self {
        Self {
            out,
            streamed: false,
        }
    }

    /// Consume the renderer, returning the sink
    pub fn into_inner(self) -> W {
        self.out
    }

    /// Render one event
    ///
    /// # Errors
    ///
    /// Returns an error if writing to the sink fails.
    pub async fn render(&mut self, event: &ConsumerEvent) -> io::Result<()> {
        let text = match event {
            ConsumerEvent::MessageAppended {
                role: MessageRole::Assistant,
                ..
            } => {
                self.streamed = false;
                ASSISTANT_LABEL.to_string()
            }
            ConsumerEvent::MessageAppended { .. } => return Ok(()),
            ConsumerEvent::Delta { text, .. } => {
                self.streamed = true;
                text.clone()
            }
            ConsumerEvent::StreamEnd { .. } => "\n".to_string(),
            ConsumerEvent::StreamCancelled { .. } => "\n[cancelled]\n".to_string(),
            ConsumerEvent::StreamError { error, text, .. } => {
                // Without streamed text the message shows the apology
                if self.streamed {
                    format!("\n[error: {error}]\n")
                } else {
                    format!("{text}\n[error: {error}]\n")
                }
            }
            ConsumerEvent::State(state) => {
                debug!(state = state.description(), "Consumer state");
                return Ok(());
            }
        };

        self.out.write_all(text.as_bytes()).await?;
        self.out.flush().await
    }
}

/// Render events until every sender is dropped
///
/// Returns the renderer so callers can inspect the sink.
pub async fn render_events<W: AsyncWrite + Unpin>(
    mut rx: mpsc::UnboundedReceiver<ConsumerEvent>,
    mut renderer: Renderer<W>,
) -> Renderer<W> {
    while let Some(event) = rx.recv().await {
        if let Err(e) = renderer.render(&event).await {
            warn!(error = %e, "Failed to write to terminal");
        }
    }
    renderer
}
