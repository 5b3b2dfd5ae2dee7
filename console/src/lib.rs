//! Suggest Console - line-based suggestion client
//!
//! Reads one description per line, streams the suggestion from the relay
//! and prints it as it grows. Ctrl-C cancels the suggestion in flight.

pub mod app;
pub mod render;

pub use app::{Session, Turn};
pub use render::{render_events, Renderer, ASSISTANT_LABEL};
