//! Wire Records
//!
//! The two JSON-lines shapes that cross the network:
//!
//! - [`UpstreamChunk`]: one line of the upstream `/api/generate` stream
//! - [`RelayRecord`]: one line the relay forwards to its downstream client
//!
//! Both decode into the transport-independent [`Fragment`].

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Opaque continuation token handed back by the model
///
/// The upstream encodes it as an integer array. It is never inspected, only
/// passed back on the next request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextToken(pub Vec<i64>);

impl ContextToken {
    /// Whether the token carries anything worth sending back
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One decoded unit of generated output
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Fragment {
    /// Incremental text to append
    pub delta: String,
    /// Updated continuation token (usually only on the final fragment)
    pub context: Option<ContextToken>,
    /// Whether this fragment terminates the answer
    pub is_final: bool,
}

impl Fragment {
    /// A plain text delta
    pub fn delta(text: impl Into<String>) -> Self {
        Self {
            delta: text.into(),
            ..Default::default()
        }
    }

    /// Whether forwarding this fragment would carry no information
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.delta.is_empty() && !self.is_final
    }
}

/// One line of the upstream generation stream
///
/// Streaming replies carry `response` deltas and end with `done: true`.
/// A failing model may send a line with only `error`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct UpstreamChunk {
    /// Model that produced the line
    #[serde(default)]
    pub model: Option<String>,
    /// Upstream timestamp (RFC 3339)
    #[serde(default)]
    pub created_at: Option<String>,
    /// Text delta
    #[serde(default)]
    pub response: Option<String>,
    /// Completion marker
    #[serde(default)]
    pub done: bool,
    /// Continuation token (final line)
    #[serde(default)]
    pub context: Option<ContextToken>,
    /// Inline upstream failure
    #[serde(default)]
    pub error: Option<String>,
}

/// One line forwarded by the relay
///
/// The error variant is listed first so a line carrying `error` never
/// decodes as a fragment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelayRecord {
    /// Mid-stream failure; always the last line of a stream
    Error {
        /// Human-readable failure description
        error: String,
    },
    /// Incremental text
    Fragment {
        /// Text delta
        response: String,
        /// Continuation token, present on the final record
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<ContextToken>,
        /// Completion marker
        #[serde(default, skip_serializing_if = "is_false")]
        done: bool,
    },
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(value: &bool) -> bool {
    !*value
}

impl RelayRecord {
    /// Error record for a mid-stream failure
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    /// Serialize as one JSON line (object followed by `\n`)
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_line(&self) -> serde_json::Result<Bytes> {
        let mut buf = serde_json::to_vec(self)?;
        buf.push(b'\n');
        Ok(Bytes::from(buf))
    }
}

impl From<Fragment> for RelayRecord {
    fn from(fragment: Fragment) -> Self {
        Self::Fragment {
            response: fragment.delta,
            context: fragment.context,
            done: fragment.is_final,
        }
    }
}
