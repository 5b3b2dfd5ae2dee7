//! Stream handles and per-cycle statistics

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// One in-flight request
///
/// Clones share the same cancellation token, so a handle can be given to
/// another task (a Ctrl-C watcher, a UI) to abort the stream.
#[derive(Clone, Debug)]
pub struct StreamHandle {
    id: Uuid,
    token: CancellationToken,
}

impl StreamHandle {
    pub(crate) fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            token: CancellationToken::new(),
        }
    }

    /// Unique ID of this request
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Abort the request
    ///
    /// Idempotent, and a no-op once the stream has finished.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether [`cancel`](Self::cancel) has been called
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Counters for one submit cycle
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Fragments whose delta was applied
    pub fragments_applied: u32,
    /// Lines skipped because they did not parse
    pub malformed_skipped: u32,
    /// Body bytes read from the transport
    pub bytes_received: u64,
    /// When the request was dispatched
    pub started_at: Option<Instant>,
    /// When the cycle reached a terminal state
    pub finished_at: Option<Instant>,
}

impl StreamStats {
    pub(crate) fn started() -> Self {
        Self {
            started_at: Some(Instant::now()),
            ..Default::default()
        }
    }

    /// Time from dispatch to the terminal state (or until now)
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => end.duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        }
    }
}
