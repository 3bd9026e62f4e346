//! SSE stream decoding for chat completion responses.
//!
//! The wire format is OpenAI's streaming flavor of server-sent events:
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"Hel"}}]}
//!
//! data: {"choices":[{"delta":{"content":"lo"}}]}
//!
//! data: [DONE]
//! ```
//!
//! Transport chunks carry no alignment guarantees: a chunk may end
//! mid-line, even inside a JSON token or a multi-byte UTF-8 scalar.
//! [`StreamDecoder`] reassembles complete lines from raw bytes before any
//! decoding happens, so chunk boundaries are never observable in the
//! extracted fragments.

use crate::error::{Error, Result};
use bytes::Bytes;
use futures::Stream;
use serde::Deserialize;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::warn;

/// SSE field prefix carrying event payloads.
const DATA_PREFIX: &[u8] = b"data: ";

/// Terminal payload signaling that no further events will arrive.
const DONE_MARKER: &[u8] = b"[DONE]";

/// Fragments and termination state produced by one [`StreamDecoder::feed`]
/// call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Feed {
    /// Text fragments extracted from this chunk, in encounter order.
    pub fragments: Vec<String>,
    /// Whether the terminal `[DONE]` marker has been observed.
    pub terminated: bool,
}

/// Incremental decoder turning raw response bytes into text fragments.
///
/// Owns a byte buffer holding at most one incomplete trailing line. Lines
/// that do not start with `data: ` are discarded; `data: [DONE]` latches
/// the decoder into its terminal state; every other payload is parsed as
/// JSON and `choices[0].delta.content` is emitted when present. Malformed
/// payloads are logged and skipped, never fatal.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl StreamDecoder {
    /// Create a new decoder in its initial streaming state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer: Vec::new(),
            done: false,
        }
    }

    /// Whether the terminal `[DONE]` marker has been observed.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one transport chunk and extract whatever fragments it completes.
    ///
    /// Appends the chunk to the internal buffer, then splits off and decodes
    /// every complete line. Once `[DONE]` is seen the rest of the buffer is
    /// discarded and further calls are no-ops.
    pub fn feed(&mut self, chunk: &[u8]) -> Feed {
        if self.done {
            return Feed {
                fragments: Vec::new(),
                terminated: true,
            };
        }

        self.buffer.extend_from_slice(chunk);

        let mut fragments = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line = self.buffer[..pos].to_vec();
            self.buffer.drain(..=pos);

            if let Some(fragment) = self.decode_line(&line) {
                fragments.push(fragment);
            }
            if self.done {
                // Whatever trails the terminal marker is never processed.
                self.buffer.clear();
                break;
            }
        }

        Feed {
            fragments,
            terminated: self.done,
        }
    }

    /// Decode any residual bytes as a final, unterminated line.
    ///
    /// Called when the transport closes without a trailing newline; a
    /// complete final event is not lost just because the server skipped
    /// the last line terminator.
    pub fn finish(&mut self) -> Feed {
        if self.done || self.buffer.is_empty() {
            return Feed {
                fragments: Vec::new(),
                terminated: self.done,
            };
        }

        let line = std::mem::take(&mut self.buffer);
        let mut fragments = Vec::new();
        if let Some(fragment) = self.decode_line(&line) {
            fragments.push(fragment);
        }

        Feed {
            fragments,
            terminated: self.done,
        }
    }

    /// Decode a single line, returning the extracted fragment if any.
    fn decode_line(&mut self, line: &[u8]) -> Option<String> {
        let line = line.strip_suffix(b"\r").unwrap_or(line);

        // Anything without the data prefix (blank keep-alives, comments,
        // other SSE fields) is dropped without a diagnostic.
        let payload = line.strip_prefix(DATA_PREFIX)?;

        if payload == DONE_MARKER {
            self.done = true;
            return None;
        }

        // The buffer is raw bytes so a scalar split across chunks has been
        // reassembled by now; a complete line that still fails validation
        // is a recoverable decode error.
        let payload = match std::str::from_utf8(payload) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("skipping event line with invalid UTF-8: {e}");
                return None;
            }
        };

        match serde_json::from_str::<StreamChunk>(payload) {
            Ok(chunk) => chunk
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta.content),
            Err(e) => {
                warn!("failed to decode event payload: {e}");
                None
            }
        }
    }
}

/// Byte stream produced by the HTTP transport.
pub type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// Fragment stream over a boxed transport byte stream.
pub type ChatStream = FragmentStream<ByteStream>;

/// Adapter turning a transport byte stream into a stream of text fragments.
///
/// Fragments buffered from one chunk are yielded one per poll. After the
/// decoder observes `[DONE]` the adapter reports end-of-stream without
/// polling the transport again, so a transport error arriving after
/// termination never surfaces.
pub struct FragmentStream<S> {
    inner: S,
    decoder: StreamDecoder,
    pending: VecDeque<String>,
    inner_done: bool,
}

impl<S> std::fmt::Debug for FragmentStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentStream")
            .field("inner", &std::any::type_name::<S>())
            .field("decoder", &self.decoder)
            .field("pending", &self.pending)
            .field("inner_done", &self.inner_done)
            .finish()
    }
}

impl<S> FragmentStream<S> {
    /// Wrap a transport byte stream.
    pub fn new(stream: S) -> Self {
        Self {
            inner: stream,
            decoder: StreamDecoder::new(),
            pending: VecDeque::new(),
            inner_done: false,
        }
    }

    /// Whether the terminal `[DONE]` marker has been observed.
    #[must_use]
    pub const fn terminated(&self) -> bool {
        self.decoder.is_done()
    }
}

impl<S, E> Stream for FragmentStream<S>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: Into<Error>,
{
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(fragment) = self.pending.pop_front() {
                return Poll::Ready(Some(Ok(fragment)));
            }
            if self.decoder.is_done() || self.inner_done {
                return Poll::Ready(None);
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    let feed = self.decoder.feed(&chunk);
                    self.pending.extend(feed.fragments);
                }
                Poll::Ready(Some(Err(e))) => {
                    return Poll::Ready(Some(Err(e.into())));
                }
                Poll::Ready(None) => {
                    self.inner_done = true;
                    let feed = self.decoder.finish();
                    self.pending.extend(feed.fragments);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Streaming chunk structure, one per SSE data event.
#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn event(content: &str) -> String {
        format!(
            "data: {}\n",
            serde_json::json!({"choices": [{"delta": {"content": content}}]})
        )
    }

    mod decoder {
        use super::*;

        #[test]
        fn extracts_fragment_per_event() {
            let mut decoder = StreamDecoder::new();
            let feed = decoder.feed(format!("{}{}", event("Hel"), event("lo")).as_bytes());
            assert_eq!(feed.fragments, vec!["Hel", "lo"]);
            assert!(!feed.terminated);
        }

        #[test]
        fn json_split_across_chunks_is_reassembled() {
            let mut decoder = StreamDecoder::new();

            let feed = decoder.feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel");
            assert!(feed.fragments.is_empty());
            assert!(!feed.terminated);

            let feed = decoder.feed(b"lo\"}}]}\n\ndata: [DONE]\n");
            assert_eq!(feed.fragments, vec!["Hello"]);
            assert!(feed.terminated);
        }

        #[test]
        fn empty_delta_yields_nothing() {
            let mut decoder = StreamDecoder::new();
            let feed = decoder.feed(
                b"data: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\ndata: {\"choices\":[{\"delta\":{}}]}\ndata: [DONE]\n",
            );
            assert_eq!(feed.fragments, vec![" world"]);
            assert!(feed.terminated);
        }

        #[test]
        fn keep_alive_comment_is_ignored() {
            let mut decoder = StreamDecoder::new();
            let feed = decoder.feed(b": keep-alive\n\n");
            assert!(feed.fragments.is_empty());
            assert!(!feed.terminated);
        }

        #[test]
        fn non_data_lines_are_ignored() {
            let mut decoder = StreamDecoder::new();
            let feed = decoder.feed(b"event: message\nid: 42\nretry: 100\n\n");
            assert!(feed.fragments.is_empty());
            assert!(!feed.terminated);
        }

        #[test]
        fn done_marker_terminates() {
            let mut decoder = StreamDecoder::new();
            let feed = decoder.feed(b"data: [DONE]\n");
            assert!(feed.fragments.is_empty());
            assert!(feed.terminated);
            assert!(decoder.is_done());
        }

        #[test]
        fn lines_after_done_are_not_processed() {
            let mut decoder = StreamDecoder::new();
            let chunk = format!("data: [DONE]\n{}", event("late"));
            let feed = decoder.feed(chunk.as_bytes());
            assert!(feed.fragments.is_empty());
            assert!(feed.terminated);
        }

        #[test]
        fn feed_after_done_is_a_noop() {
            let mut decoder = StreamDecoder::new();
            decoder.feed(b"data: [DONE]\n");

            let feed = decoder.feed(event("late").as_bytes());
            assert!(feed.fragments.is_empty());
            assert!(feed.terminated);
        }

        #[test]
        fn malformed_json_is_skipped_not_fatal() {
            let mut decoder = StreamDecoder::new();
            let chunk = format!("data: {{not json\n{}", event("ok"));
            let feed = decoder.feed(chunk.as_bytes());
            assert_eq!(feed.fragments, vec!["ok"]);
            assert!(!feed.terminated);
        }

        #[test]
        fn empty_choices_yields_nothing() {
            let mut decoder = StreamDecoder::new();
            let feed = decoder.feed(b"data: {\"choices\":[]}\n");
            assert!(feed.fragments.is_empty());
            assert!(!feed.terminated);
        }

        #[test]
        fn null_content_yields_nothing() {
            let mut decoder = StreamDecoder::new();
            let feed = decoder.feed(b"data: {\"choices\":[{\"delta\":{\"content\":null}}]}\n");
            assert!(feed.fragments.is_empty());
            assert!(!feed.terminated);
        }

        #[test]
        fn missing_choices_yields_nothing() {
            let mut decoder = StreamDecoder::new();
            let feed = decoder.feed(b"data: {\"id\":\"chatcmpl-1\"}\n");
            assert!(feed.fragments.is_empty());
        }

        #[test]
        fn crlf_line_endings_are_tolerated() {
            let mut decoder = StreamDecoder::new();
            let feed = decoder
                .feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\r\ndata: [DONE]\r\n");
            assert_eq!(feed.fragments, vec!["hi"]);
            assert!(feed.terminated);
        }

        #[test]
        fn empty_chunk_is_a_noop() {
            let mut decoder = StreamDecoder::new();
            let feed = decoder.feed(b"");
            assert!(feed.fragments.is_empty());
            assert!(!feed.terminated);
        }

        #[test]
        fn multibyte_scalar_split_across_chunks_survives() {
            // "héllo" with the chunk boundary inside the two-byte é.
            let bytes = b"data: {\"choices\":[{\"delta\":{\"content\":\"h\xc3\xa9llo\"}}]}\n";
            let split = bytes.iter().position(|&b| b == 0xc3).unwrap() + 1;

            let mut decoder = StreamDecoder::new();
            let feed = decoder.feed(&bytes[..split]);
            assert!(feed.fragments.is_empty());

            let feed = decoder.feed(&bytes[split..]);
            assert_eq!(feed.fragments, vec!["héllo"]);
        }

        #[test]
        fn chunk_boundaries_are_unobservable() {
            let stream = format!("{}{}{}data: [DONE]\n", event("a"), event("b"), event("c"));
            let bytes = stream.as_bytes();

            let mut reference = StreamDecoder::new();
            let expected = reference.feed(bytes);
            assert_eq!(expected.fragments, vec!["a", "b", "c"]);
            assert!(expected.terminated);

            for split in 0..=bytes.len() {
                let mut decoder = StreamDecoder::new();
                let mut fragments = Vec::new();
                let mut terminated = false;
                for chunk in [&bytes[..split], &bytes[split..]] {
                    let feed = decoder.feed(chunk);
                    fragments.extend(feed.fragments);
                    terminated = feed.terminated;
                }
                assert_eq!(fragments, expected.fragments, "split at byte {split}");
                assert!(terminated, "split at byte {split}");
            }
        }

        #[test]
        fn finish_decodes_residual_unterminated_line() {
            let mut decoder = StreamDecoder::new();
            let feed = decoder.feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}");
            assert!(feed.fragments.is_empty());

            let feed = decoder.finish();
            assert_eq!(feed.fragments, vec!["tail"]);
        }

        #[test]
        fn finish_on_empty_buffer_is_a_noop() {
            let mut decoder = StreamDecoder::new();
            let feed = decoder.finish();
            assert!(feed.fragments.is_empty());
            assert!(!feed.terminated);
        }
    }

    mod fragment_stream {
        use super::*;
        use futures::StreamExt;
        use futures::executor::block_on;

        fn chunks(parts: &[&[u8]]) -> Vec<std::result::Result<Bytes, Error>> {
            parts
                .iter()
                .map(|part| Ok(Bytes::copy_from_slice(part)))
                .collect()
        }

        #[test]
        fn yields_fragments_in_arrival_order() {
            let body = format!("{}{}data: [DONE]\n", event("Hel"), event("lo"));
            let mut stream = FragmentStream::new(futures::stream::iter(chunks(&[body.as_bytes()])));

            let items: Vec<_> = block_on((&mut stream).collect());
            let fragments: Vec<String> = items.into_iter().map(|item| item.unwrap()).collect();
            assert_eq!(fragments, vec!["Hel", "lo"]);
            assert!(stream.terminated());
        }

        #[test]
        fn transport_error_before_done_surfaces() {
            let body = event("partial");
            let items = vec![
                Ok(Bytes::copy_from_slice(body.as_bytes())),
                Err(Error::config("connection reset")),
            ];
            let mut stream = FragmentStream::new(futures::stream::iter(items));

            let collected: Vec<_> = block_on((&mut stream).collect());
            assert_eq!(collected.len(), 2);
            assert_eq!(collected[0].as_ref().unwrap(), "partial");
            assert!(collected[1].is_err());
            assert!(!stream.terminated());
        }

        #[test]
        fn transport_error_after_done_is_suppressed() {
            let items = vec![
                Ok(Bytes::from_static(b"data: [DONE]\n")),
                Err(Error::config("connection reset")),
            ];
            let mut stream = FragmentStream::new(futures::stream::iter(items));

            let collected: Vec<_> = block_on((&mut stream).collect());
            assert!(collected.is_empty());
            assert!(stream.terminated());
        }

        #[test]
        fn residual_line_is_flushed_at_connection_close() {
            let mut stream = FragmentStream::new(futures::stream::iter(chunks(&[
                b"data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}",
            ])));

            let items: Vec<_> = block_on((&mut stream).collect());
            let fragments: Vec<String> = items.into_iter().map(|item| item.unwrap()).collect();
            assert_eq!(fragments, vec!["tail"]);
            assert!(!stream.terminated());
        }
    }
}
