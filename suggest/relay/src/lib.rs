//! Suggest Relay - HTTP surface of the stream relay
//!
//! Exposes [`suggest_core::Relay`] over HTTP for the authoring editor:
//!
//! ```text
//! editor ── POST /api/suggestions/stream ──▶ relay ── POST /api/generate ──▶ model server
//!        ◀──────── JSON lines ────────────        ◀──────── JSON lines ─────
//! ```
//!
//! Each connection runs its own upstream call and forwarding loop; the only
//! shared state is the immutable [`AppState`].

#![deny(missing_docs)]

pub mod handlers;
pub mod server;

pub use handlers::{AppState, ErrorResponse, HealthResponse, STREAM_CONTENT_TYPE};
pub use server::{router, serve, shutdown_signal};
