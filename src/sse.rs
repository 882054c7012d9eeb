//! Server-Sent Events (SSE) frame parser.
//!
//! The database streams each message as an `event: <type>` line followed by a
//! `data: <payload>` line. Blank lines between messages carry no meaning, so
//! pairing is the only state: a frame is emitted once both lines are seen.
//!
//! Lines are buffered without an upper bound. Change payloads are arbitrary
//! JSON documents and a fixed-size line buffer would truncate them.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::collections::VecDeque;

const EVENT_PREFIX: &str = "event: ";
const DATA_PREFIX: &str = "data: ";

/// One `event:`/`data:` pair, prefixes stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub event: String,
    pub data: String,
}

impl RawFrame {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug)]
enum PairState {
    AwaitingEvent,
    AwaitingData { event: String },
}

/// Incremental, push-based frame parser.
///
/// Bytes are fed with [`push`](Self::push) in whatever chunks the network
/// delivers; complete frames are drained with [`next_frame`](Self::next_frame).
#[derive(Debug)]
pub struct FrameParser {
    line: Vec<u8>,
    state: PairState,
    ready: VecDeque<RawFrame>,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameParser {
    pub fn new() -> Self {
        Self {
            line: Vec::new(),
            state: PairState::AwaitingEvent,
            ready: VecDeque::new(),
        }
    }

    /// Feed a chunk of bytes from the connection.
    pub fn push(&mut self, mut chunk: &[u8]) {
        while let Some(newline_pos) = chunk.iter().position(|&b| b == b'\n') {
            self.line.extend_from_slice(&chunk[..newline_pos]);
            chunk = &chunk[newline_pos + 1..];

            let line = std::mem::take(&mut self.line);
            self.feed_line(&line);
        }
        self.line.extend_from_slice(chunk);
    }

    /// Pop the oldest complete frame, if any.
    pub fn next_frame(&mut self) -> Option<RawFrame> {
        self.ready.pop_front()
    }

    /// Whether bytes of an unfinished frame are buffered.
    pub fn has_partial(&self) -> bool {
        !self.line.is_empty() || matches!(self.state, PairState::AwaitingData { .. })
    }

    fn feed_line(&mut self, raw: &[u8]) {
        // Decode only complete lines so multi-byte characters split across
        // chunks survive.
        let text = String::from_utf8_lossy(raw);
        let line = text.strip_suffix('\r').unwrap_or(&text);

        if line.is_empty() {
            return;
        }

        match std::mem::replace(&mut self.state, PairState::AwaitingEvent) {
            PairState::AwaitingEvent => {
                let event = line.strip_prefix(EVENT_PREFIX).unwrap_or(line);
                self.state = PairState::AwaitingData {
                    event: event.to_string(),
                };
            }
            PairState::AwaitingData { event } => {
                let data = line.strip_prefix(DATA_PREFIX).unwrap_or(line);
                self.ready.push_back(RawFrame {
                    event,
                    data: data.to_string(),
                });
            }
        }
    }
}

/// Pull-based frame reader over a byte stream.
pub struct FrameReader<S> {
    stream: S,
    parser: FrameParser,
    finished: bool,
}

impl<S, E> FrameReader<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            parser: FrameParser::new(),
            finished: false,
        }
    }

    /// Read the next frame.
    ///
    /// Returns `Ok(None)` once the stream ends cleanly and every complete
    /// frame has been returned. A read error ends the reader; it is returned
    /// once and every later call yields `Ok(None)`.
    pub async fn next_frame(&mut self) -> Result<Option<RawFrame>, E> {
        loop {
            if let Some(frame) = self.parser.next_frame() {
                return Ok(Some(frame));
            }

            if self.finished {
                return Ok(None);
            }

            match self.stream.next().await {
                Some(Ok(chunk)) => self.parser.push(&chunk),
                Some(Err(e)) => {
                    self.finished = true;
                    return Err(e);
                }
                None => {
                    #[cfg(feature = "tracing")]
                    {
                        if self.parser.has_partial() {
                            tracing::debug!("discarding incomplete SSE frame at end of stream");
                        }
                    }
                    self.finished = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn parse_all(input: &[u8]) -> Vec<RawFrame> {
        let mut parser = FrameParser::new();
        parser.push(input);
        std::iter::from_fn(|| parser.next_frame()).collect()
    }

    #[test]
    fn test_parse_single_frame() {
        let frames = parse_all(b"event: hi\ndata: there\n");
        assert_eq!(frames, vec![RawFrame::new("hi", "there")]);
    }

    #[test]
    fn test_parse_two_frames_with_blank_separator() {
        let frames = parse_all(b"event: hi\ndata: there\n\nevent: hey\ndata: you\n\n");
        assert_eq!(
            frames,
            vec![RawFrame::new("hi", "there"), RawFrame::new("hey", "you")]
        );
    }

    #[test]
    fn test_blank_lines_between_event_and_data_are_skipped() {
        let frames = parse_all(b"\n\nevent: put\n\r\n\ndata: null\n");
        assert_eq!(frames, vec![RawFrame::new("put", "null")]);
    }

    #[test]
    fn test_crlf_line_endings() {
        let frames = parse_all(b"event: keep-alive\r\ndata: null\r\n\r\n");
        assert_eq!(frames, vec![RawFrame::new("keep-alive", "null")]);
    }

    #[test]
    fn test_chunks_split_anywhere() {
        let input = b"event: put\ndata: {\"path\":\"/\",\"data\":1}\n\nevent: patch\ndata: x\n";
        for split in 0..input.len() {
            let mut parser = FrameParser::new();
            parser.push(&input[..split]);
            parser.push(&input[split..]);
            let frames: Vec<_> = std::iter::from_fn(|| parser.next_frame()).collect();
            assert_eq!(frames.len(), 2, "split at {}", split);
            assert_eq!(frames[0].data, "{\"path\":\"/\",\"data\":1}");
            assert_eq!(frames[1], RawFrame::new("patch", "x"));
        }
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let input = "event: put\ndata: \"héllo\"\n".as_bytes();
        let split = input.iter().position(|&b| b == 0xc3).unwrap() + 1;

        let mut parser = FrameParser::new();
        parser.push(&input[..split]);
        parser.push(&input[split..]);
        assert_eq!(parser.next_frame(), Some(RawFrame::new("put", "\"héllo\"")));
    }

    #[test]
    fn test_very_long_line_is_not_truncated() {
        let payload = "x".repeat(4 * 1024 * 1024);
        let input = format!("event: put\ndata: {}\n", payload);

        let mut parser = FrameParser::new();
        for chunk in input.as_bytes().chunks(8192) {
            parser.push(chunk);
        }
        let frame = parser.next_frame().unwrap();
        assert_eq!(frame.data.len(), payload.len());
        assert!(!parser.has_partial());
    }

    #[test]
    fn test_partial_frame_is_reported() {
        let mut parser = FrameParser::new();
        parser.push(b"event: put\n");
        assert!(parser.next_frame().is_none());
        assert!(parser.has_partial());

        parser.push(b"data: nul");
        assert!(parser.has_partial());
        parser.push(b"l\n");
        assert_eq!(parser.next_frame(), Some(RawFrame::new("put", "null")));
        assert!(!parser.has_partial());
    }

    #[test]
    fn test_line_without_prefix_is_kept_verbatim() {
        let frames = parse_all(b"put\nnull\n");
        assert_eq!(frames, vec![RawFrame::new("put", "null")]);
    }

    #[tokio::test]
    async fn test_reader_clean_eof() {
        let chunks: Vec<Result<Bytes, String>> = vec![
            Ok(Bytes::from_static(b"event: hi\nda")),
            Ok(Bytes::from_static(b"ta: there\n")),
        ];
        let mut reader = FrameReader::new(stream::iter(chunks));

        assert_eq!(reader.next_frame().await, Ok(Some(RawFrame::new("hi", "there"))));
        assert_eq!(reader.next_frame().await, Ok(None));
        assert_eq!(reader.next_frame().await, Ok(None));
    }

    #[tokio::test]
    async fn test_reader_eof_discards_partial_frame() {
        let chunks: Vec<Result<Bytes, String>> = vec![Ok(Bytes::from_static(b"event: put\n"))];
        let mut reader = FrameReader::new(stream::iter(chunks));
        assert_eq!(reader.next_frame().await, Ok(None));
    }

    #[tokio::test]
    async fn test_reader_surfaces_read_error_after_complete_frames() {
        let chunks: Vec<Result<Bytes, String>> = vec![
            Ok(Bytes::from_static(b"event: a\ndata: 1\n")),
            Err("connection reset".to_string()),
            Ok(Bytes::from_static(b"event: b\ndata: 2\n")),
        ];
        let mut reader = FrameReader::new(stream::iter(chunks));

        assert_eq!(reader.next_frame().await, Ok(Some(RawFrame::new("a", "1"))));
        assert_eq!(reader.next_frame().await, Err("connection reset".to_string()));
        assert_eq!(reader.next_frame().await, Ok(None));
    }
}
