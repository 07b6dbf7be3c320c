//! Scriptable transport for testing.
//!
//! Produces the same chunk sequence shape as the HTTP client, so tests at
//! every layer can swap it in for a real backend.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_stream::stream;
use dg_protocol::{ChatRequest, StreamChunk};
use futures::Stream;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::transport::{ChatTransport, ChunkStream, TransportError};

/// One scripted step of a mock stream.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Deliver a chunk as-is.
    Chunk(StreamChunk),
    /// Fail the read with a connection error.
    Failure { message: String },
    /// Wait before the next step.
    Delay { ms: u64 },
    /// Deliver nothing more until cancelled.
    Stall,
}

/// Configuration for one mock stream.
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    pub responses: Vec<MockResponse>,
    /// Optional delay before each step (ms).
    pub chunk_delay_ms: Option<u64>,
}

impl MockConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses(mut self, responses: Vec<MockResponse>) -> Self {
        self.responses = responses;
        self
    }

    pub fn with_chunks(self, chunks: Vec<StreamChunk>) -> Self {
        self.with_responses(chunks.into_iter().map(MockResponse::Chunk).collect())
    }

    pub fn with_chunk_delay(mut self, ms: u64) -> Self {
        self.chunk_delay_ms = Some(ms);
        self
    }

    pub fn then(mut self, response: MockResponse) -> Self {
        self.responses.push(response);
        self
    }
}

/// Play a mock config back as a chunk stream. Stops at the next step boundary
/// once `cancel` fires.
pub fn mock_stream(
    config: MockConfig,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<StreamChunk, TransportError>> + Send + 'static {
    stream! {
        for response in config.responses {
            if let Some(delay_ms) = config.chunk_delay_ms {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = sleep(Duration::from_millis(delay_ms)) => {}
                }
            }
            if cancel.is_cancelled() {
                return;
            }

            match response {
                MockResponse::Chunk(chunk) => {
                    yield Ok(chunk);
                }
                MockResponse::Failure { message } => {
                    yield Err(TransportError::Connection(message));
                    return;
                }
                MockResponse::Delay { ms } => {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = sleep(Duration::from_millis(ms)) => {}
                    }
                }
                MockResponse::Stall => {
                    cancel.cancelled().await;
                    return;
                }
            }
        }
    }
}

/// A [`ChatTransport`] that replays scripted streams and records requests.
///
/// The n-th `open_stream` call plays the n-th script; once the scripts run
/// out the last one is repeated.
#[derive(Clone, Default)]
pub struct MockTransport {
    scripts: Arc<Vec<MockConfig>>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl MockTransport {
    pub fn new(config: MockConfig) -> Self {
        Self::with_scripts(vec![config])
    }

    pub fn with_scripts(scripts: Vec<MockConfig>) -> Self {
        Self {
            scripts: Arc::new(scripts),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl ChatTransport for MockTransport {
    fn open_stream(&self, request: ChatRequest, cancel: CancellationToken) -> ChunkStream {
        let index = {
            let mut requests = self
                .requests
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            requests.push(request);
            requests.len() - 1
        };

        let config = self
            .scripts
            .get(index)
            .or_else(|| self.scripts.last())
            .cloned()
            .unwrap_or_default();

        Box::pin(mock_stream(config, cancel))
    }
}

/// Ready-made scripts for common scenarios.
pub mod fixtures {
    use super::*;

    /// Text deltas followed by a bare terminal chunk.
    pub fn streaming_text(chunks: &[&str]) -> MockConfig {
        let mut script: Vec<StreamChunk> = chunks.iter().map(|c| StreamChunk::text(*c)).collect();
        script.push(StreamChunk::done());
        MockConfig::new().with_chunks(script)
    }

    /// Text deltas, then a terminal chunk carrying agent metadata.
    pub fn agent_reply(chunks: &[&str], agent_type: &str, mode: &str) -> MockConfig {
        let mut script: Vec<StreamChunk> = chunks.iter().map(|c| StreamChunk::text(*c)).collect();
        script.push(StreamChunk::done().with_agent_type(agent_type).with_mode(mode));
        MockConfig::new().with_chunks(script)
    }

    /// Some text, then a chunk carrying an error.
    pub fn error_mid_stream(text_before: &str, error: &str) -> MockConfig {
        MockConfig::new().with_chunks(vec![
            StreamChunk::text(text_before),
            StreamChunk::error(error),
        ])
    }

    /// Some text, then a connection failure.
    pub fn dropped_connection(text_before: &str, message: &str) -> MockConfig {
        MockConfig::new()
            .with_chunks(vec![StreamChunk::text(text_before)])
            .then(MockResponse::Failure {
                message: message.to_string(),
            })
    }

    /// Some text, then nothing until cancelled.
    pub fn stalled_after(chunks: &[&str]) -> MockConfig {
        MockConfig::new()
            .with_chunks(chunks.iter().map(|c| StreamChunk::text(*c)).collect())
            .then(MockResponse::Stall)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    async fn collect_ok(config: MockConfig) -> Vec<StreamChunk> {
        mock_stream(config, CancellationToken::new())
            .map(|r| r.unwrap())
            .collect()
            .await
    }

    #[tokio::test]
    async fn fixture_streaming_text() {
        let chunks = collect_ok(fixtures::streaming_text(&["Hel", "lo"])).await;
        assert_eq!(
            chunks,
            vec![
                StreamChunk::text("Hel"),
                StreamChunk::text("lo"),
                StreamChunk::done()
            ]
        );
    }

    #[tokio::test]
    async fn fixture_agent_reply_puts_metadata_on_terminal() {
        let chunks = collect_ok(fixtures::agent_reply(&["Hi"], "dojo", "mirror")).await;
        let last = chunks.last().unwrap();
        assert!(last.done);
        assert_eq!(last.agent_type.as_deref(), Some("dojo"));
        assert_eq!(last.mode.as_deref(), Some("mirror"));
    }

    #[tokio::test]
    async fn failure_ends_stream_with_error() {
        let items: Vec<_> = mock_stream(
            fixtures::dropped_connection("partial", "reset by peer"),
            CancellationToken::new(),
        )
        .collect()
        .await;

        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(
            &items[1],
            Err(TransportError::Connection(msg)) if msg == "reset by peer"
        ));
    }

    #[tokio::test]
    async fn stall_ends_once_cancelled() {
        let cancel = CancellationToken::new();
        let mut stream = Box::pin(mock_stream(fixtures::stalled_after(&["a"]), cancel.clone()));

        assert_eq!(stream.next().await.unwrap().unwrap(), StreamChunk::text("a"));
        cancel.cancel();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn cancelled_before_start_yields_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let items: Vec<_> = mock_stream(fixtures::streaming_text(&["x"]), cancel)
            .collect()
            .await;
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn transport_records_requests_and_cycles_scripts() {
        let transport = MockTransport::with_scripts(vec![
            fixtures::streaming_text(&["first"]),
            fixtures::streaming_text(&["second"]),
        ]);

        let mut seen = Vec::new();
        for message in ["one", "two", "three"] {
            let request = ChatRequest::streaming("sess", message);
            let chunks: Vec<_> = transport
                .open_stream(request, CancellationToken::new())
                .map(|r| r.unwrap())
                .collect()
                .await;
            seen.push(chunks[0].content.clone());
        }

        assert_eq!(seen, vec!["first", "second", "second"]);
        let messages: Vec<_> = transport
            .requests()
            .into_iter()
            .map(|r| r.message)
            .collect();
        assert_eq!(messages, vec!["one", "two", "three"]);
        assert_eq!(transport.request_count(), 3);
    }
}
