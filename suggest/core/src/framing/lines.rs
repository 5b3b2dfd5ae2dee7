//! Line Assembly and Fragment Folding
//!
//! Reassembles JSON lines from arbitrarily chunked transport reads and folds
//! each line into a text buffer.
//!
//! # Chunk boundaries
//!
//! A single read may hold zero, one or several complete lines, or cut a line
//! (and a multi-byte character) in half. The assembler splits on `\n` at the
//! byte level and only decodes complete lines, so a character split across
//! reads is reassembled before UTF-8 decoding ever sees it. The trailing
//! incomplete segment is kept for the next read.
//!
//! # Pure folding
//!
//! [`fold_line`] is a pure function of `(buffer, line)` so accumulation can be
//! tested without any transport.

use bytes::BytesMut;

use super::fragment::{Fragment, RelayRecord, UpstreamChunk};

/// Default upper bound for a single pending line (1 MiB)
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// A complete line cut out of the byte stream
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RawLine {
    /// Decoded line text (without the trailing newline)
    Text(String),
    /// The line could not be decoded or exceeded the size limit
    Invalid(String),
}

/// Stateful assembler turning byte chunks into complete lines
#[derive(Debug)]
pub struct LineAssembler {
    /// Bytes received after the last newline
    pending: BytesMut,
    /// Prefix of `pending` already known to contain no newline
    scanned: usize,
    /// Dropping bytes until the next newline (oversized line)
    discarding: bool,
    /// Maximum bytes a pending line may grow to
    max_line_bytes: usize,
}

impl Default for LineAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_BYTES)
    }
}

impl LineAssembler {
    /// Create an assembler with a pending-line size limit
    #[must_use]
    pub fn new(max_line_bytes: usize) -> Self {
        Self {
            pending: BytesMut::new(),
            scanned: 0,
            discarding: false,
            max_line_bytes: max_line_bytes.max(1),
        }
    }

    /// Number of bytes waiting for a newline
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Feed one transport read and return every line it completed, in order
    pub fn push(&mut self, chunk: &[u8]) -> Vec<RawLine> {
        let mut lines = Vec::new();
        self.pending.extend_from_slice(chunk);

        while let Some(offset) = self.pending[self.scanned..]
            .iter()
            .position(|b| *b == b'\n')
        {
            let end = self.scanned + offset;
            let line = self.pending.split_to(end + 1);
            self.scanned = 0;

            if self.discarding {
                self.discarding = false;
                continue;
            }
            lines.push(decode(&line[..end]));
        }
        self.scanned = self.pending.len();

        if self.pending.len() > self.max_line_bytes {
            if !self.discarding {
                lines.push(RawLine::Invalid(format!(
                    "line exceeds {} bytes",
                    self.max_line_bytes
                )));
                self.discarding = true;
            }
            self.pending.clear();
            self.scanned = 0;
        }

        lines
    }

    /// Flush the trailing segment at end-of-stream
    ///
    /// A final line without a terminating newline is still a line.
    pub fn finish(&mut self) -> Option<RawLine> {
        let rest = self.pending.split();
        self.scanned = 0;
        if std::mem::take(&mut self.discarding) || rest.is_empty() {
            return None;
        }
        Some(decode(&rest))
    }
}

fn decode(bytes: &[u8]) -> RawLine {
    match std::str::from_utf8(bytes) {
        Ok(text) => RawLine::Text(text.to_string()),
        Err(e) => RawLine::Invalid(format!("invalid UTF-8: {e}")),
    }
}

/// Result of interpreting one line
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LineOutcome {
    /// Empty after trimming; ignored
    Blank,
    /// A fragment whose delta was (or should be) appended
    Applied(Fragment),
    /// The line did not parse; skip it and keep streaming
    Malformed(String),
    /// The line reported a failure from the hop behind it
    UpstreamError(String),
}

/// Interpret one line of the relay's downstream stream
#[must_use]
pub fn classify_relay_line(line: &str) -> LineOutcome {
    let line = line.trim();
    if line.is_empty() {
        return LineOutcome::Blank;
    }

    match serde_json::from_str::<RelayRecord>(line) {
        Ok(RelayRecord::Fragment {
            response,
            context,
            done,
        }) => LineOutcome::Applied(Fragment {
            delta: response,
            context,
            is_final: done,
        }),
        Ok(RelayRecord::Error { error }) => LineOutcome::UpstreamError(error),
        Err(e) => LineOutcome::Malformed(e.to_string()),
    }
}

/// Interpret one line of the upstream generation stream
#[must_use]
pub fn classify_upstream_line(line: &str) -> LineOutcome {
    let line = line.trim();
    if line.is_empty() {
        return LineOutcome::Blank;
    }

    match serde_json::from_str::<UpstreamChunk>(line) {
        Ok(UpstreamChunk {
            error: Some(error), ..
        }) => LineOutcome::UpstreamError(error),
        Ok(UpstreamChunk {
            response: Some(response),
            done,
            context,
            ..
        }) => LineOutcome::Applied(Fragment {
            delta: response,
            context,
            is_final: done,
        }),
        // Ollama omits `response` on some terminal lines
        Ok(UpstreamChunk {
            response: None,
            done: true,
            context,
            ..
        }) => LineOutcome::Applied(Fragment {
            delta: String::new(),
            context,
            is_final: true,
        }),
        Ok(_) => LineOutcome::Malformed("missing `response` field".to_string()),
        Err(e) => LineOutcome::Malformed(e.to_string()),
    }
}

/// Fold one raw relay line into the accumulated text
///
/// On success the fragment's delta is appended to `buffer`; anything else
/// leaves `buffer` untouched.
#[must_use]
pub fn fold_line(mut buffer: String, line: &str) -> (String, LineOutcome) {
    let outcome = classify_relay_line(line);
    if let LineOutcome::Applied(ref fragment) = outcome {
        buffer.push_str(&fragment.delta);
    }
    (buffer, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::fragment::ContextToken;
    use pretty_assertions::assert_eq;

    fn texts(lines: Vec<RawLine>) -> Vec<String> {
        lines
            .into_iter()
            .map(|l| match l {
                RawLine::Text(t) => t,
                RawLine::Invalid(reason) => panic!("unexpected invalid line: {reason}"),
            })
            .collect()
    }

    #[test]
    fn test_multiple_lines_in_one_read() {
        let mut assembler = LineAssembler::default();
        let lines = assembler.push(b"{\"response\":\"a\"}\n{\"response\":\"b\"}\n");
        assert_eq!(texts(lines), vec!["{\"response\":\"a\"}", "{\"response\":\"b\"}"]);
        assert_eq!(assembler.pending_len(), 0);
    }

    #[test]
    fn test_line_split_across_reads() {
        let mut assembler = LineAssembler::default();
        assert!(assembler.push(b"{\"respon").is_empty());
        assert!(assembler.push(b"se\":\"x\"").is_empty());
        let lines = assembler.push(b"}\n{\"res");
        assert_eq!(texts(lines), vec!["{\"response\":\"x\"}"]);
        assert_eq!(assembler.pending_len(), 5);
    }

    #[test]
    fn test_multibyte_character_split_across_reads() {
        let line = "{\"response\":\"héllo 🌱\"}\n".as_bytes();
        let mut assembler = LineAssembler::default();
        let mut out = Vec::new();
        for byte in line {
            out.extend(assembler.push(std::slice::from_ref(byte)));
        }
        assert_eq!(texts(out), vec!["{\"response\":\"héllo 🌱\"}"]);
    }

    #[test]
    fn test_finish_flushes_unterminated_line() {
        let mut assembler = LineAssembler::default();
        assert!(assembler.push(b"{\"response\":\"tail\"}").is_empty());
        assert_eq!(
            assembler.finish(),
            Some(RawLine::Text("{\"response\":\"tail\"}".to_string()))
        );
        assert_eq!(assembler.finish(), None);
    }

    #[test]
    fn test_oversized_line_is_discarded_once() {
        let mut assembler = LineAssembler::new(8);
        let lines = assembler.push(b"0123456789");
        assert!(matches!(lines.as_slice(), [RawLine::Invalid(_)]));
        // Remainder of the oversized line is dropped up to its newline
        assert!(assembler.push(b"abcdef").is_empty());
        let lines = assembler.push(b"gh\n{}\n");
        assert_eq!(texts(lines), vec!["{}"]);
    }

    #[test]
    fn test_invalid_utf8_line() {
        let mut assembler = LineAssembler::default();
        let lines = assembler.push(b"\xff\xfe\n");
        assert!(matches!(lines.as_slice(), [RawLine::Invalid(_)]));
    }

    #[test]
    fn test_fold_appends_delta() {
        let (buffer, outcome) = fold_line("Struct".to_string(), r#"{"response":"ure: "}"#);
        assert_eq!(buffer, "Structure: ");
        assert!(matches!(outcome, LineOutcome::Applied(_)));
    }

    #[test]
    fn test_fold_skips_malformed_line() {
        let (buffer, outcome) = fold_line("keep".to_string(), "{not json");
        assert_eq!(buffer, "keep");
        assert!(matches!(outcome, LineOutcome::Malformed(_)));
    }

    #[test]
    fn test_fold_blank_line() {
        let (buffer, outcome) = fold_line("keep".to_string(), "   \r");
        assert_eq!(buffer, "keep");
        assert_eq!(outcome, LineOutcome::Blank);
    }

    #[test]
    fn test_fold_error_record() {
        let (buffer, outcome) = fold_line("partial".to_string(), r#"{"error":"boom"}"#);
        assert_eq!(buffer, "partial");
        assert_eq!(outcome, LineOutcome::UpstreamError("boom".to_string()));
    }

    #[test]
    fn test_classify_upstream_lines() {
        assert_eq!(
            classify_upstream_line(r#"{"model":"m","response":"Hi","done":false}"#),
            LineOutcome::Applied(Fragment::delta("Hi"))
        );
        assert_eq!(
            classify_upstream_line(r#"{"model":"m","response":"","done":true,"context":[7]}"#),
            LineOutcome::Applied(Fragment {
                delta: String::new(),
                context: Some(ContextToken(vec![7])),
                is_final: true,
            })
        );
        assert_eq!(
            classify_upstream_line(r#"{"error":"out of memory"}"#),
            LineOutcome::UpstreamError("out of memory".to_string())
        );
        assert!(matches!(
            classify_upstream_line(r#"{"model":"m"}"#),
            LineOutcome::Malformed(_)
        ));
    }
}
