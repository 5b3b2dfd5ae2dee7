//! Message Log
//!
//! The client-visible conversation: an ordered, append-only log of user and
//! assistant messages.
//!
//! # Open message
//!
//! When a request is dispatched an empty assistant placeholder is appended
//! and becomes the single *open* message. Only the log can mutate it, by
//! folding fragment deltas in arrival order. Closing it records a terminal
//! [`MessageStatus`]; closed messages are read-only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::framing::{fold_line, LineOutcome};

/// Message identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generate a new unique message ID
    pub fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        Self(format!("msg_{id}"))
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who sent a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Editor user
    User,
    /// Model answer
    Assistant,
}

/// Lifecycle of a message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum MessageStatus {
    /// Still receiving deltas (assistant placeholder only)
    Streaming,
    /// Closed normally
    Complete,
    /// Closed by its owner; text is whatever arrived before the cancel
    Cancelled,
    /// Failed after partial text arrived; the partial text is kept
    Incomplete {
        /// What went wrong
        error: String,
    },
    /// Failed before any text arrived; text is the apology
    Failed {
        /// What went wrong
        error: String,
    },
}

impl MessageStatus {
    /// Whether the message can still change
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Streaming)
    }
}

/// One conversational turn
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    id: MessageId,
    role: MessageRole,
    text: String,
    created_at: DateTime<Utc>,
    status: MessageStatus,
}

impl Message {
    fn new(role: MessageRole, text: String, status: MessageStatus) -> Self {
        Self {
            id: MessageId::new(),
            role,
            text,
            created_at: Utc::now(),
            status,
        }
    }

    /// Unique message ID
    #[must_use]
    pub fn id(&self) -> &MessageId {
        &self.id
    }

    /// Who sent this message
    #[must_use]
    pub fn role(&self) -> MessageRole {
        self.role
    }

    /// Accumulated text
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// When the message was appended to the log
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Current lifecycle status
    #[must_use]
    pub fn status(&self) -> &MessageStatus {
        &self.status
    }
}

/// Append-only log with at most one open assistant message
#[derive(Clone, Debug, Default)]
pub struct MessageLog {
    messages: Vec<Message>,
    /// Index of the open assistant message
    open: Option<usize>,
}

impl MessageLog {
    /// Create an empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages, oldest first
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the log is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Most recent message
    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// The open assistant message, if any
    #[must_use]
    pub fn open_message(&self) -> Option<&Message> {
        self.open.map(|idx| &self.messages[idx])
    }

    /// Append a closed user message (the echo of a submit)
    pub fn push_user(&mut self, text: impl Into<String>) -> &Message {
        self.messages.push(Message::new(
            MessageRole::User,
            text.into(),
            MessageStatus::Complete,
        ));
        &self.messages[self.messages.len() - 1]
    }

    /// Append the empty assistant placeholder and make it the open message
    ///
    /// Returns `None` if another assistant message is still open.
    pub fn open_assistant(&mut self) -> Option<&Message> {
        if self.open.is_some() {
            return None;
        }
        self.messages.push(Message::new(
            MessageRole::Assistant,
            String::new(),
            MessageStatus::Streaming,
        ));
        let idx = self.messages.len() - 1;
        self.open = Some(idx);
        Some(&self.messages[idx])
    }

    /// Fold one relay line into the open message
    ///
    /// Returns `None` when no message is open.
    pub fn fold_into_open(&mut self, line: &str) -> Option<LineOutcome> {
        let idx = self.open?;
        let message = &mut self.messages[idx];
        let (text, outcome) = fold_line(std::mem::take(&mut message.text), line);
        message.text = text;
        Some(outcome)
    }

    /// Close the open message with a terminal status
    ///
    /// A `Failed` status on a message with no text replaces it with
    /// `apology`; a failure after partial text keeps the text and is recorded
    /// as `Incomplete`.
    pub fn close_open(&mut self, status: MessageStatus, apology: &str) -> Option<&Message> {
        let idx = self.open.take()?;
        let message = &mut self.messages[idx];

        message.status = match status {
            MessageStatus::Failed { error } | MessageStatus::Incomplete { error } => {
                if message.text.is_empty() {
                    message.text = apology.to_string();
                    MessageStatus::Failed { error }
                } else {
                    MessageStatus::Incomplete { error }
                }
            }
            // Closing never reopens
            MessageStatus::Streaming => MessageStatus::Complete,
            other => other,
        };
        Some(&self.messages[idx])
    }
}
