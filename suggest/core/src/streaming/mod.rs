//! Stream Consumer Infrastructure
//!
//! Client side of the incremental response protocol.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      StreamConsumer                         │
//! │                                                             │
//! │  submit(text) ──▶ MessageLog ◀── fold_line ◀── LineAssembler │
//! │       │              ▲                              ▲       │
//! │       ▼              │ ConsumerEvent                │ bytes │
//! │  StreamHandle ───────┼── cancel ──▶ select! ────────┤       │
//! └──────────────────────┼──────────────────────────────┼───────┘
//!                        ▼                              │
//!                    renderer              ResponseTransport (HTTP)
//! ```
//!
//! # Features
//!
//! - **Single in-flight request**: a second submit is rejected
//! - **Cancellation-aware reads**: a cancel unblocks a pending read
//! - **Chunk-boundary independence**: lines and characters split across
//!   reads are reassembled before they are parsed
//! - **Failure states**: apology text or a partial message marked incomplete

mod consumer;
mod handle;
mod transport;

pub use consumer::{ConsumerEvent, ConsumerState, CycleOutcome, Progress, StreamConsumer};
pub use handle::{StreamHandle, StreamStats};
pub use transport::{ByteStream, HttpTransport, ResponseTransport};
