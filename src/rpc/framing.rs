//! Dual-framing decoder for MCP server output.
//!
//! MCP servers are inconsistent about how they frame JSON-RPC messages on
//! stdout: some use LSP-style `Content-Length` headers, others emit one JSON
//! message per line. The decoder accepts both, at any point in the stream.
//!
//! # Wire Formats
//!
//! ```text
//! Content-Length: <length>\r\n
//! \r\n
//! <message-body>
//! ```
//!
//! or
//!
//! ```text
//! <message>\n
//! ```
//!
//! All decoding state lives in the internal buffer, so [`FrameDecoder::feed`]
//! produces the same message sequence, in arrival order, no matter how the
//! stream is chunked. A frame is only recognized when the bytes before its
//! blank-line terminator are all header-shaped lines; anything else falls
//! through to the newline pass.

use serde_json::Value;
use tracing::warn;

/// Maximum accepted frame body (100MB) to prevent OOM from malicious/buggy
/// servers.
const MAX_FRAME_SIZE: usize = 100 * 1024 * 1024;

/// Blank line ending an LSP-style header block.
const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Incremental decoder turning raw subprocess output into JSON messages.
///
/// Holds unconsumed bytes between calls; after each [`feed`](Self::feed) the
/// buffer contains only incomplete trailing data.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk of output and decode every complete message.
    ///
    /// The frame pass and the line pass alternate until neither consumes
    /// anything more, so a buffer mixing both framings decodes fully in one
    /// call.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Value> {
        self.buffer.extend_from_slice(chunk);

        let mut messages = Vec::new();
        loop {
            let len_before = self.buffer.len();
            let awaiting_body = self.drain_frames(&mut messages);
            // While a recognized header waits on its body, every buffered
            // byte belongs to that frame; the line pass must not touch them.
            if !awaiting_body {
                self.drain_lines(&mut messages);
            }
            if self.buffer.len() == len_before {
                break;
            }
        }
        messages
    }

    /// Number of unconsumed bytes held in the buffer.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drain complete `Content-Length` frames from the front of the buffer.
    ///
    /// Returns true when a recognized header is waiting on an incomplete
    /// body.
    fn drain_frames(&mut self, out: &mut Vec<Value>) -> bool {
        loop {
            let Some(header_end) = find(&self.buffer, HEADER_TERMINATOR) else {
                return false;
            };
            let Some(length) = parse_header_block(&self.buffer[..header_end]) else {
                return false;
            };

            let body_start = header_end + HEADER_TERMINATOR.len();
            if length > MAX_FRAME_SIZE {
                warn!(
                    "Ignoring frame header declaring {} bytes (cap {})",
                    length, MAX_FRAME_SIZE
                );
                self.buffer.drain(..body_start);
                continue;
            }

            let body_end = body_start + length;
            if self.buffer.len() < body_end {
                return true;
            }

            match serde_json::from_slice::<Value>(&self.buffer[body_start..body_end]) {
                Ok(message) => out.push(message),
                Err(e) => warn!("Discarding length-prefixed frame with invalid JSON: {}", e),
            }
            self.buffer.drain(..body_end);
        }
    }

    /// Consume newline-delimited JSON from the front of the buffer.
    fn drain_lines(&mut self, out: &mut Vec<Value>) {
        loop {
            let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') else {
                return;
            };

            let raw = &self.buffer[..newline];
            let ends_with_cr = raw.last() == Some(&b'\r');
            let line = String::from_utf8_lossy(raw).trim().to_string();
            let is_last = newline + 1 == self.buffer.len();

            if line.is_empty() {
                self.buffer.drain(..=newline);
                continue;
            }

            if looks_like_stray_header(&line) {
                if ends_with_cr {
                    // A CRLF-terminated header line may be the start of a
                    // length-prefixed frame whose terminator has not arrived;
                    // the frame pass will claim it once it completes.
                    return;
                }
                self.buffer.drain(..=newline);
                continue;
            }

            match serde_json::from_str::<Value>(&line) {
                Ok(message) => {
                    out.push(message);
                    self.buffer.drain(..=newline);
                }
                Err(e) => {
                    // The line may be a partial flush of a larger message, so
                    // it is held while it is the last content in the buffer.
                    // Any further output proves it complete and malformed.
                    if is_last {
                        return;
                    }
                    warn!("Discarding malformed line from server output: {}", e);
                    self.buffer.drain(..=newline);
                }
            }
        }
    }
}

/// Locate `needle` in `haystack`.
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Parse a candidate header block, returning its `Content-Length`.
///
/// Every line must be header-shaped (`token: value`, case-insensitive key);
/// a block containing anything else is not a frame header and is left for
/// the newline pass. The first `Content-Length` wins; unknown headers such
/// as `Content-Type` are ignored.
fn parse_header_block(block: &[u8]) -> Option<usize> {
    let block = String::from_utf8_lossy(block);
    let mut content_length = None;

    for line in block.lines() {
        let line = line.trim();
        let colon = line.find(':')?;
        let key = line[..colon].trim();
        let value = line[colon + 1..].trim();
        if key.is_empty() || !key.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
            return None;
        }
        if key.eq_ignore_ascii_case("Content-Length") && content_length.is_none() {
            content_length = value.parse::<usize>().ok();
        }
    }

    content_length
}

/// Whether a trimmed line looks like a stray `Content-Length` header.
fn looks_like_stray_header(line: &str) -> bool {
    const PREFIX: &str = "content-length:";
    line.get(..PREFIX.len())
        .map(|p| p.eq_ignore_ascii_case(PREFIX))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    /// Wrap a JSON body in a Content-Length frame.
    fn frame(body: &str) -> Vec<u8> {
        format!("Content-Length: {}\r\n\r\n{}", body.len(), body).into_bytes()
    }

    fn feed_all(bytes: &[u8]) -> Vec<Value> {
        FrameDecoder::new().feed(bytes)
    }

    #[test]
    fn test_single_line_message() {
        let messages = feed_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n");
        assert_eq!(messages, vec![json!({"jsonrpc": "2.0", "id": 1, "result": {}})]);
    }

    #[test]
    fn test_multiple_lines_in_one_chunk() {
        let messages = feed_all(b"{\"id\":1}\n{\"id\":2}\n{\"id\":3}\n");
        assert_eq!(
            messages,
            vec![json!({"id": 1}), json!({"id": 2}), json!({"id": 3})]
        );
    }

    #[test]
    fn test_single_length_prefixed_frame() {
        let messages = feed_all(&frame(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#));
        assert_eq!(messages, vec![json!({"jsonrpc": "2.0", "id": 1, "result": {}})]);
    }

    #[test]
    fn test_multiple_frames_in_one_chunk() {
        let mut bytes = frame(r#"{"id":1}"#);
        bytes.extend(frame(r#"{"id":2}"#));
        let messages = feed_all(&bytes);
        assert_eq!(messages, vec![json!({"id": 1}), json!({"id": 2})]);
    }

    #[test]
    fn test_frame_not_decoded_until_body_complete() {
        let mut decoder = FrameDecoder::new();
        let bytes = frame(r#"{"id":42}"#);
        let (head, tail) = bytes.split_at(bytes.len() - 4);

        assert_eq!(decoder.feed(head), Vec::<Value>::new());
        assert!(decoder.buffered() > 0);

        assert_eq!(decoder.feed(tail), vec![json!({"id": 42})]);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_header_only_waits_for_body() {
        let mut decoder = FrameDecoder::new();
        assert_eq!(decoder.feed(b"Content-Length: 8\r\n\r\n"), Vec::<Value>::new());
        assert_eq!(decoder.feed(b"{\"id\":7}"), vec![json!({"id": 7})]);
    }

    #[test]
    fn test_header_case_insensitive_and_extra_headers() {
        let body = r#"{"id":1}"#;
        let bytes = format!(
            "Content-Type: application/vscode-jsonrpc\r\ncontent-length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        assert_eq!(feed_all(bytes.as_bytes()), vec![json!({"id": 1})]);
    }

    #[test]
    fn test_frame_body_may_span_lines() {
        // Exact byte count, not line structure, delimits a frame body.
        let body = "{\n  \"id\": 5\n}";
        let bytes = format!("Content-Length: {}\r\n\r\n{}", body.len(), body);
        assert_eq!(feed_all(bytes.as_bytes()), vec![json!({"id": 5})]);
    }

    #[test]
    fn test_frame_consumes_exactly_header_plus_body() {
        let mut decoder = FrameDecoder::new();
        let mut bytes = frame(r#"{"id":1}"#);
        bytes.extend(b"{\"id\":2");
        decoder.feed(&bytes);
        // Only the unterminated trailing line remains.
        assert_eq!(decoder.buffered(), "{\"id\":2".len());
    }

    #[test]
    fn test_invalid_json_in_frame_is_dropped_stream_continues() {
        let mut bytes = frame("not json at all");
        bytes.extend(frame(r#"{"id":2}"#));
        let messages = feed_all(&bytes);
        assert_eq!(messages, vec![json!({"id": 2})]);
    }

    #[test]
    fn test_blank_lines_skipped() {
        let messages = feed_all(b"\n\n{\"id\":1}\n\n");
        assert_eq!(messages, vec![json!({"id": 1})]);
    }

    #[test]
    fn test_stray_header_line_skipped() {
        // A bare-LF Content-Length line cannot open a real frame; it is
        // dropped without producing a message.
        let messages = feed_all(b"Content-Length: 99\n{\"id\":1}\n");
        assert_eq!(messages, vec![json!({"id": 1})]);
    }

    #[test]
    fn test_malformed_line_held_then_discarded() {
        let mut decoder = FrameDecoder::new();

        // While the bad line is the newest content it is held back.
        assert_eq!(decoder.feed(b"not json\n"), Vec::<Value>::new());
        assert!(decoder.buffered() > 0);

        // Further output proves it complete; it is dropped and the stream
        // keeps decoding.
        assert_eq!(decoder.feed(b"{\"id\":1}\n"), vec![json!({"id": 1})]);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_mixed_framings_decode_in_arrival_order() {
        let mut bytes = frame(r#"{"id":1}"#);
        bytes.extend(b"{\"id\":2}\n");
        bytes.extend(frame(r#"{"id":3}"#));
        let messages = feed_all(&bytes);
        assert_eq!(
            messages,
            vec![json!({"id": 1}), json!({"id": 2}), json!({"id": 3})]
        );
    }

    #[test]
    fn test_oversized_frame_header_is_rejected() {
        let mut decoder = FrameDecoder::new();
        let bytes = format!("Content-Length: {}\r\n\r\n", MAX_FRAME_SIZE + 1);
        decoder.feed(bytes.as_bytes());
        // The header was consumed instead of waiting for an absurd body.
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_line_with_crlf_ending() {
        let messages = feed_all(b"{\"id\":1}\r\n");
        assert_eq!(messages, vec![json!({"id": 1})]);
    }

    #[test]
    fn test_unterminated_line_waits() {
        let mut decoder = FrameDecoder::new();
        assert_eq!(decoder.feed(b"{\"id\":1"), Vec::<Value>::new());
        assert_eq!(decoder.feed(b"}\n"), vec![json!({"id": 1})]);
    }

    #[test]
    fn test_initialize_response_scenario() {
        // Length-prefixed response to an initialize-style request.
        let body = r#"{"jsonrpc":"2.0","id":1,"result":{}}"#;
        let bytes = format!("Content-Length: {}\r\n\r\n{}", body.len(), body);
        let messages = feed_all(bytes.as_bytes());
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["result"], json!({}));
    }

    #[test]
    fn test_header_block_rejects_non_header_lines() {
        assert_eq!(parse_header_block(b"Content-Length: 10"), Some(10));
        assert_eq!(
            parse_header_block(b"Content-Type: json\r\nContent-Length: 3"),
            Some(3)
        );
        // A JSON line in front of the headers disqualifies the block.
        assert_eq!(
            parse_header_block(b"{\"id\":2}\r\nContent-Length: 3"),
            None
        );
        assert_eq!(parse_header_block(b"no colon here"), None);
        assert_eq!(parse_header_block(b"Content-Length: abc"), None);
        assert_eq!(parse_header_block(b""), None);
    }

    /// Decode a byte stream split into `size`-byte chunks.
    fn feed_chunked(bytes: &[u8], size: usize) -> Vec<Value> {
        let mut decoder = FrameDecoder::new();
        let mut messages = Vec::new();
        for chunk in bytes.chunks(size) {
            messages.extend(decoder.feed(chunk));
        }
        messages
    }

    #[test]
    fn test_chunk_boundary_independence() {
        let mut stream = frame(r#"{"jsonrpc":"2.0","id":1,"result":{"tools":[]}}"#);
        stream.extend(b"{\"jsonrpc\":\"2.0\",\"id\":2,\"result\":{}}\n");
        stream.extend(b"\n");
        stream.extend(frame(r#"{"id":3,"error":{"code":-1,"message":"x"}}"#));
        stream.extend(b"not json\n");
        stream.extend(b"{\"id\":4}\n");

        let expected = feed_all(&stream);
        assert_eq!(expected.len(), 4);
        for (i, message) in expected.iter().enumerate() {
            assert_eq!(message["id"], json!(i as u64 + 1));
        }

        for size in [1, 2, 3, 5, 7, 11, 16, 64] {
            assert_eq!(
                feed_chunked(&stream, size),
                expected,
                "decode differed at chunk size {}",
                size
            );
        }
    }

    #[test]
    fn test_chunk_boundary_independence_header_split() {
        // The header terminator arriving byte-by-byte must not let the line
        // pass eat the frame's header.
        let stream = frame(r#"{"id":9,"result":{"ok":true}}"#);
        let expected = feed_all(&stream);
        for size in 1..stream.len() {
            assert_eq!(
                feed_chunked(&stream, size),
                expected,
                "decode differed at chunk size {}",
                size
            );
        }
    }
}
