//! JSON-Lines Framing
//!
//! Shared framing for both hops of the protocol. Each record is one
//! self-contained JSON object followed by a newline; the byte stream is a
//! concatenation of independently parseable lines.
//!
//! ```text
//!  upstream ──UpstreamChunk\n──▶ relay ──RelayRecord\n──▶ consumer
//!                                  │                        │
//!                           LineAssembler             LineAssembler
//!                      classify_upstream_line          fold_line
//! ```
//!
//! # Example
//!
//! ```
//! use suggest_core::framing::{fold_line, LineAssembler, RawLine};
//!
//! let mut assembler = LineAssembler::default();
//! let mut text = String::new();
//! for chunk in [&b"{\"response\":\"Str"[..], &b"uct\"}\n"[..]] {
//!     for line in assembler.push(chunk) {
//!         if let RawLine::Text(line) = line {
//!             text = fold_line(text, &line).0;
//!         }
//!     }
//! }
//! assert_eq!(text, "Struct");
//! ```

mod fragment;
mod lines;

pub use fragment::{ContextToken, Fragment, RelayRecord, UpstreamChunk};
pub use lines::{
    classify_relay_line, classify_upstream_line, fold_line, LineAssembler, LineOutcome, RawLine,
    DEFAULT_MAX_LINE_BYTES,
};
