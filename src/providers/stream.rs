//! Incremental frame reader for streamed HTTP responses
//!
//! Both OpenAI-compatible servers (Server-Sent Events) and Ollama (newline
//! delimited JSON) deliver a generation as a sequence of small JSON
//! documents. `FrameReader` buffers raw body bytes, splits them on the frame
//! delimiter and decodes only complete frames, so a multi-byte character
//! split across chunks survives intact.

use bytes::{Buf, Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use super::base::{TokenEvent, TokenSink, TokenStream, ToolCall};
use super::GatewayError;

/// Buffered token events between the reader task and the coordinator
const TOKEN_BUFFER: usize = 64;

/// How frames are delimited on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// `data: {...}` events separated by blank lines
    Sse,
    /// One JSON document per line
    Ndjson,
}

/// A decoded frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A JSON payload
    Data(String),
    /// The SSE `[DONE]` sentinel
    Done,
}

/// Pull-based reader over a response body
pub struct FrameReader {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    format: FrameFormat,
    buffer: BytesMut,
    finished: bool,
}

impl FrameReader {
    /// Wrap an HTTP response body
    pub fn new(response: reqwest::Response, format: FrameFormat) -> Self {
        Self::from_stream(response.bytes_stream().boxed(), format)
    }

    /// Wrap any byte stream; used directly by tests
    pub fn from_stream(
        body: BoxStream<'static, reqwest::Result<Bytes>>,
        format: FrameFormat,
    ) -> Self {
        Self {
            body,
            format,
            buffer: BytesMut::new(),
            finished: false,
        }
    }

    /// Next frame, or `None` when the body is exhausted
    ///
    /// # Errors
    ///
    /// Returns a network error if the body fails mid-stream.
    pub async fn next_frame(&mut self) -> Option<std::result::Result<Frame, GatewayError>> {
        loop {
            if let Some(block) = self.take_block() {
                if let Some(frame) = self.decode(&block) {
                    return Some(Ok(frame));
                }
                continue;
            }

            if self.finished {
                let rest = String::from_utf8_lossy(&self.buffer.split()).into_owned();
                if rest.trim().is_empty() {
                    return None;
                }
                return self.decode(&rest).map(Ok);
            }

            match self.body.next().await {
                // CR never occurs inside a UTF-8 sequence or a JSON payload,
                // so dropping it turns CRLF delimiters into LF ones.
                Some(Ok(chunk)) => self
                    .buffer
                    .extend(chunk.iter().copied().filter(|b| *b != b'\r')),
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(GatewayError::network(&e)));
                }
                None => self.finished = true,
            }
        }
    }

    fn take_block(&mut self) -> Option<String> {
        let delimiter: &[u8] = match self.format {
            FrameFormat::Sse => b"\n\n",
            FrameFormat::Ndjson => b"\n",
        };
        let pos = self
            .buffer
            .windows(delimiter.len())
            .position(|w| w == delimiter)?;
        let block = self.buffer.split_to(pos);
        self.buffer.advance(delimiter.len());
        Some(String::from_utf8_lossy(&block).into_owned())
    }

    fn decode(&self, block: &str) -> Option<Frame> {
        match self.format {
            FrameFormat::Ndjson => {
                let line = block.trim();
                (!line.is_empty()).then(|| Frame::Data(line.to_string()))
            }
            FrameFormat::Sse => {
                let data: Vec<&str> = block
                    .lines()
                    .filter_map(|line| line.strip_prefix("data:"))
                    .map(str::trim_start)
                    .collect();
                if data.is_empty() {
                    return None;
                }
                let payload = data.join("\n");
                if payload.trim() == "[DONE]" {
                    Some(Frame::Done)
                } else {
                    Some(Frame::Data(payload))
                }
            }
        }
    }
}

/// What one frame contributed to a text generation
#[derive(Debug, Clone, PartialEq)]
pub enum TextDelta {
    /// More answer text
    Text(String),
    /// The engine signalled completion
    Finished,
    /// The engine finished with a tool call after its text
    ToolCall(ToolCall),
    /// Nothing user-visible (role headers, keepalives, usage frames)
    Skip,
}

/// Continue a text generation on a background task
///
/// `first` is the segment already read while deciding the generation was
/// text. The task stops, dropping the HTTP body, as soon as `cancel` fires or
/// the returned stream is dropped. `parse` may keep state across frames,
/// such as tool call fragments that arrive after the text.
pub fn spawn_text_forwarder<F>(
    mut reader: FrameReader,
    first: String,
    mut parse: F,
    cancel: CancellationToken,
) -> TokenStream
where
    F: FnMut(&Frame) -> std::result::Result<TextDelta, GatewayError> + Send + 'static,
{
    let (tx, stream) = TokenStream::channel(TOKEN_BUFFER);
    tokio::spawn(async move {
        if !send(&tx, Ok(TokenEvent::Token(first))).await {
            return;
        }
        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Generation cancelled, abandoning response stream");
                    return;
                }
                _ = tx.closed() => {
                    tracing::debug!("Token receiver dropped, abandoning response stream");
                    return;
                }
                frame = reader.next_frame() => frame,
            };

            let event = match frame {
                None => Err(GatewayError::protocol(
                    "response stream ended before completion",
                )),
                Some(Err(e)) => Err(e),
                Some(Ok(frame)) => match parse(&frame) {
                    Ok(TextDelta::Text(t)) if t.is_empty() => continue,
                    Ok(TextDelta::Text(t)) => Ok(TokenEvent::Token(t)),
                    Ok(TextDelta::Finished) => Ok(TokenEvent::End),
                    Ok(TextDelta::ToolCall(call)) => Ok(TokenEvent::ToolCall(call)),
                    Ok(TextDelta::Skip) => continue,
                    Err(e) => Err(e),
                },
            };

            let terminal = !matches!(event, Ok(TokenEvent::Token(_)));
            if !send(&tx, event).await || terminal {
                return;
            }
        }
    });
    stream
}

async fn send(tx: &TokenSink, event: std::result::Result<TokenEvent, GatewayError>) -> bool {
    tx.send(event).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(chunks: Vec<&'static str>, format: FrameFormat) -> FrameReader {
        byte_reader(chunks.into_iter().map(str::as_bytes).collect(), format)
    }

    #[tokio::test]
    async fn test_sse_frames_split_across_chunks() {
        let mut r = reader(
            vec!["data: {\"a\":", "1}\n\n: keepalive\n\ndata: [DONE]\n\n"],
            FrameFormat::Sse,
        );
        assert_eq!(
            r.next_frame().await.unwrap().unwrap(),
            Frame::Data("{\"a\":1}".to_string())
        );
        assert_eq!(r.next_frame().await.unwrap().unwrap(), Frame::Done);
        assert!(r.next_frame().await.is_none());
    }

    fn byte_reader(chunks: Vec<&'static [u8]>, format: FrameFormat) -> FrameReader {
        let stream = futures::stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok::<Bytes, reqwest::Error>(Bytes::from_static(c))),
        );
        FrameReader::from_stream(stream.boxed(), format)
    }

    #[tokio::test]
    async fn test_multibyte_character_split_across_chunks() {
        // "é" is 0xC3 0xA9; the chunk boundary falls between the two bytes
        let mut r = byte_reader(
            vec![&b"{\"t\":\"caf\xC3"[..], &b"\xA9\"}\n"[..]],
            FrameFormat::Ndjson,
        );
        assert_eq!(
            r.next_frame().await.unwrap().unwrap(),
            Frame::Data("{\"t\":\"caf\u{e9}\"}".to_string())
        );
        assert!(r.next_frame().await.is_none());

        let mut r = byte_reader(
            vec![
                &b"data: {\"t\":\"\xE2\x80"[..],
                &b"\x9Cquoted\xE2\x80\x9D\"}\r\n\r\n"[..],
            ],
            FrameFormat::Sse,
        );
        assert_eq!(
            r.next_frame().await.unwrap().unwrap(),
            Frame::Data("{\"t\":\"\u{201c}quoted\u{201d}\"}".to_string())
        );
    }

    #[tokio::test]
    async fn test_sse_crlf_delimiters() {
        let mut r = reader(vec!["data: {}\r\n\r\n"], FrameFormat::Sse);
        assert_eq!(
            r.next_frame().await.unwrap().unwrap(),
            Frame::Data("{}".to_string())
        );
    }

    #[tokio::test]
    async fn test_ndjson_trailing_line_without_newline() {
        let mut r = reader(vec!["{\"x\":1}\n\n{\"x\"", ":2}"], FrameFormat::Ndjson);
        assert_eq!(
            r.next_frame().await.unwrap().unwrap(),
            Frame::Data("{\"x\":1}".to_string())
        );
        assert_eq!(
            r.next_frame().await.unwrap().unwrap(),
            Frame::Data("{\"x\":2}".to_string())
        );
        assert!(r.next_frame().await.is_none());
    }

    fn parse_plain(frame: &Frame) -> std::result::Result<TextDelta, GatewayError> {
        match frame {
            Frame::Done => Ok(TextDelta::Finished),
            Frame::Data(d) if d == "skip" => Ok(TextDelta::Skip),
            Frame::Data(d) => Ok(TextDelta::Text(d.clone())),
        }
    }

    #[tokio::test]
    async fn test_forwarder_emits_tokens_then_end() {
        let r = reader(
            vec!["data: b\n\ndata: skip\n\ndata: c\n\ndata: [DONE]\n\n"],
            FrameFormat::Sse,
        );
        let stream =
            spawn_text_forwarder(r, "a".to_string(), parse_plain, CancellationToken::new());
        assert_eq!(stream.collect_text().await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_forwarder_reports_truncated_stream() {
        let r = reader(vec!["data: b\n\n"], FrameFormat::Sse);
        let stream =
            spawn_text_forwarder(r, "a".to_string(), parse_plain, CancellationToken::new());
        let err = stream.collect_text().await.unwrap_err();
        assert_eq!(err.kind, super::super::GatewayErrorKind::Protocol);
    }

    #[tokio::test]
    async fn test_forwarder_stops_on_cancel() {
        let pending = futures::stream::pending::<reqwest::Result<Bytes>>();
        let r = FrameReader::from_stream(pending.boxed(), FrameFormat::Sse);
        let cancel = CancellationToken::new();
        let mut stream = spawn_text_forwarder(r, "a".to_string(), parse_plain, cancel.clone());
        assert_eq!(
            stream.next().await.unwrap().unwrap(),
            TokenEvent::Token("a".to_string())
        );
        cancel.cancel();
        assert!(stream.next().await.is_none());
    }
}
