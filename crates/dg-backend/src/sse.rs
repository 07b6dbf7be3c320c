//! Server-Sent Events (SSE) framing for the chat stream.
//!
//! The DGD backend writes one JSON chunk per `data:` line, optionally preceded
//! by an `event:` line naming the frame kind (`message` or `error`). Each data
//! line becomes one [`SseFrame`]; a blank line clears the current event type.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;

/// One `data:` line together with the event type in effect when it arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

impl SseFrame {
    pub fn is_error(&self) -> bool {
        self.event.as_deref() == Some("error")
    }
}

#[derive(Default)]
struct FrameDecoder {
    /// Raw bytes of the line being assembled. Kept as bytes so a UTF-8
    /// sequence split across reads is only decoded once complete.
    line: Vec<u8>,
    event: Option<String>,
}

impl FrameDecoder {
    fn feed(&mut self, bytes: &[u8], out: &mut VecDeque<SseFrame>) {
        let mut rest = bytes;
        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            self.line.extend_from_slice(&rest[..pos]);
            rest = &rest[pos + 1..];
            let raw = std::mem::take(&mut self.line);
            if let Some(frame) = self.process_line(&raw) {
                out.push_back(frame);
            }
        }
        self.line.extend_from_slice(rest);
    }

    fn finish(&mut self) -> Option<SseFrame> {
        if self.line.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.line);
        self.process_line(&raw)
    }

    fn process_line(&mut self, raw: &[u8]) -> Option<SseFrame> {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let line = String::from_utf8_lossy(raw);

        if line.trim().is_empty() {
            self.event = None;
            return None;
        }

        let (field, value) = match line.find(':') {
            // Comment line
            Some(0) => return None,
            Some(idx) => {
                let value = &line[idx + 1..];
                (&line[..idx], value.strip_prefix(' ').unwrap_or(value))
            }
            None => return None,
        };

        match field {
            "event" => {
                self.event = Some(value.trim().to_string());
                None
            }
            "data" => Some(SseFrame {
                event: self.event.clone(),
                data: value.to_string(),
            }),
            _ => None,
        }
    }
}

/// Stream adapter turning a byte stream into [`SseFrame`]s.
pub struct SseStream<S> {
    inner: S,
    decoder: FrameDecoder,
    pending: VecDeque<SseFrame>,
    exhausted: bool,
}

impl<S> SseStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            decoder: FrameDecoder::default(),
            pending: VecDeque::new(),
            exhausted: false,
        }
    }
}

impl<S, E> Stream for SseStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<SseFrame, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        loop {
            if let Some(frame) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(frame)));
            }
            if this.exhausted {
                return Poll::Ready(None);
            }

            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    this.decoder.feed(&bytes, &mut this.pending);
                }
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => {
                    this.exhausted = true;
                    if let Some(frame) = this.decoder.finish() {
                        this.pending.push_back(frame);
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Wrap a byte stream in an SSE frame parser.
pub fn parse_sse_stream<S, E>(stream: S) -> SseStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    SseStream::new(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn bytes_stream(
        chunks: Vec<&'static str>,
    ) -> impl Stream<Item = Result<Bytes, std::io::Error>> {
        futures::stream::iter(chunks.into_iter().map(|s| Ok(Bytes::from(s))))
    }

    async fn collect(chunks: Vec<&'static str>) -> Vec<SseFrame> {
        parse_sse_stream(bytes_stream(chunks))
            .map(|r| r.unwrap())
            .collect()
            .await
    }

    #[tokio::test]
    async fn message_event_frames() {
        let frames = collect(vec![
            "event: message\ndata: {\"content\":\"Hel\"}\n\nevent: message\ndata: {\"content\":\"lo\"}\n\n",
        ])
        .await;

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].event.as_deref(), Some("message"));
        assert_eq!(frames[0].data, r#"{"content":"Hel"}"#);
        assert_eq!(frames[1].data, r#"{"content":"lo"}"#);
    }

    #[tokio::test]
    async fn blank_line_clears_event_type() {
        let frames = collect(vec!["event: error\ndata: {}\n\ndata: {}\n\n"]).await;

        assert!(frames[0].is_error());
        assert_eq!(frames[1].event, None);
        assert!(!frames[1].is_error());
    }

    #[tokio::test]
    async fn each_data_line_is_its_own_frame() {
        let frames = collect(vec!["data: one\ndata: two\n\n"]).await;
        let data: Vec<_> = frames.iter().map(|f| f.data.as_str()).collect();
        assert_eq!(data, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn line_split_across_reads() {
        let frames = collect(vec!["da", "ta: {\"content\":", "\"x\"}\n\n"]).await;
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, r#"{"content":"x"}"#);
    }

    #[tokio::test]
    async fn multibyte_character_split_across_reads() {
        // "é" is 0xC3 0xA9
        let inner = futures::stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"data: caf\xC3")),
            Ok(Bytes::from_static(b"\xA9\n\n")),
        ]);
        let frames: Vec<_> = parse_sse_stream(inner).map(|r| r.unwrap()).collect().await;
        assert_eq!(frames[0].data, "café");
    }

    #[tokio::test]
    async fn crlf_line_endings() {
        let frames = collect(vec!["event: message\r\ndata: hi\r\n\r\n"]).await;
        assert_eq!(frames[0].event.as_deref(), Some("message"));
        assert_eq!(frames[0].data, "hi");
    }

    #[tokio::test]
    async fn comments_and_unknown_fields_are_skipped() {
        let frames = collect(vec![": keep-alive\nid: 7\nretry: 100\ndata: ok\n\n"]).await;
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "ok");
    }

    #[tokio::test]
    async fn trailing_line_without_newline() {
        let frames = collect(vec!["data: last"]).await;
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "last");
    }

    #[tokio::test]
    async fn empty_stream_yields_nothing() {
        assert!(collect(vec![]).await.is_empty());
    }

    #[tokio::test]
    async fn read_error_is_forwarded() {
        let inner = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"data: a\n")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ]);
        let mut sse = parse_sse_stream(inner);

        assert_eq!(sse.next().await.unwrap().unwrap().data, "a");
        let err = sse.next().await.unwrap().unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::ConnectionReset);
    }
}
