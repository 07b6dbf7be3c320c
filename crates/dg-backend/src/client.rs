//! HTTP client for the DGD backend chat endpoints.

use std::time::Duration;

use async_stream::stream;
use dg_protocol::{ChatRequest, ChatResponse, ErrorResponse, StreamChunk};
use futures::{Stream, StreamExt};
use reqwest::{Client, RequestBuilder, Response};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::sse::{parse_sse_stream, SseFrame};
use crate::transport::{ChatTransport, ChunkStream, TransportError};

pub const DEFAULT_API_BASE: &str = "http://localhost:8080";
/// Environment variable that overrides the configured base URL.
pub const API_BASE_ENV: &str = "DGD_API_BASE";

const CHAT_PATH: &str = "/api/chat";
const CHAT_STREAM_PATH: &str = "/api/chat/stream";

/// Retry behaviour for non-streaming requests.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
    pub backoff_multiplier: u32,
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_millis(1000),
            backoff_multiplier: 2,
            retryable_statuses: vec![408, 429, 500, 502, 503, 504],
        }
    }
}

impl RetryPolicy {
    pub fn is_retryable(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    /// Delay before the attempt after one that waited `delay`.
    pub fn next_delay(&self, delay: Duration) -> Duration {
        delay.saturating_mul(self.backoff_multiplier)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    /// Applies to non-streaming requests only; a stream may run indefinitely.
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
            request_timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

/// DGD chat API client.
#[derive(Clone)]
pub struct DgdClient {
    config: ClientConfig,
    http: Client,
}

fn build_http_client(config: &ClientConfig) -> Result<Client, TransportError> {
    let client = Client::builder()
        .connect_timeout(config.connect_timeout)
        .pool_max_idle_per_host(2)
        .build()?;
    Ok(client)
}

impl DgdClient {
    pub fn new(config: ClientConfig) -> Result<Self, TransportError> {
        let http = build_http_client(&config)?;
        Ok(Self { config, http })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Send a non-streaming chat request, retrying transient failures.
    pub async fn send_message(&self, request: &ChatRequest) -> Result<ChatResponse, TransportError> {
        let mut body = request.clone();
        body.stream = false;
        let url = self.endpoint(CHAT_PATH);

        let response = self
            .send_with_retry(|| {
                self.http
                    .post(&url)
                    .timeout(self.config.request_timeout)
                    .json(&body)
            })
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        Ok(response.json().await?)
    }

    async fn send_with_retry<F>(&self, build: F) -> Result<Response, TransportError>
    where
        F: Fn() -> RequestBuilder,
    {
        let policy = &self.config.retry;
        let mut delay = policy.delay;
        let mut last_error = None;

        for attempt in 0..=policy.max_retries {
            match build().send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() || !policy.is_retryable(status.as_u16()) {
                        return Ok(response);
                    }
                    last_error = Some(api_error(response).await);
                }
                Err(e) => last_error = Some(TransportError::Http(e)),
            }

            if attempt == policy.max_retries {
                break;
            }

            debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying chat request");
            tokio::time::sleep(delay).await;
            delay = policy.next_delay(delay);
        }

        Err(last_error.unwrap_or_else(|| {
            TransportError::Connection("request failed after all retries".to_string())
        }))
    }

    /// Submit a streaming chat request and yield its chunks.
    ///
    /// Races every read against `cancel`; once it fires the response body is
    /// dropped, which closes the connection.
    pub fn stream_message(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<StreamChunk, TransportError>> + Send + 'static {
        let http = self.http.clone();
        let url = self.endpoint(CHAT_STREAM_PATH);
        let mut request = request;
        request.stream = true;

        stream! {
            let sent = tokio::select! {
                _ = cancel.cancelled() => return,
                sent = http.post(&url).json(&request).send() => sent,
            };

            let response = match sent {
                Ok(response) => response,
                Err(e) => {
                    yield Err(TransportError::Http(e));
                    return;
                }
            };

            if !response.status().is_success() {
                yield Err(api_error(response).await);
                return;
            }

            let mut frames = parse_sse_stream(response.bytes_stream());

            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!(session_id = %request.session_id, "stream cancelled, closing connection");
                        return;
                    }
                    next = frames.next() => next,
                };

                let frame = match next {
                    Some(Ok(frame)) => frame,
                    Some(Err(e)) => {
                        yield Err(TransportError::Http(e));
                        return;
                    }
                    None => return,
                };

                let chunk = chunk_from_frame(&frame);
                let last = chunk.done || chunk.error.as_deref().is_some_and(|e| !e.is_empty());
                yield Ok(chunk);
                if last {
                    return;
                }
            }
        }
    }
}

impl ChatTransport for DgdClient {
    fn open_stream(&self, request: ChatRequest, cancel: CancellationToken) -> ChunkStream {
        Box::pin(self.stream_message(request, cancel))
    }
}

/// Turn one SSE frame into a chunk.
///
/// Frames under `event: error` always carry an error message. A payload that
/// is not valid chunk JSON becomes a terminal error chunk.
fn chunk_from_frame(frame: &SseFrame) -> StreamChunk {
    match serde_json::from_str::<StreamChunk>(&frame.data) {
        Ok(mut chunk) => {
            if frame.is_error() && chunk.error.as_deref().map_or(true, str::is_empty) {
                chunk.error = Some("Unknown error".to_string());
            }
            chunk
        }
        Err(e) => {
            warn!(error = %e, data = %frame.data, "failed to parse SSE data");
            StreamChunk {
                done: true,
                error: Some(format!("Failed to parse response: {e}")),
                ..StreamChunk::default()
            }
        }
    }
}

/// Build an error from a non-2xx response, preferring the backend's
/// `{"error": ...}` body over the status reason.
async fn api_error(response: Response) -> TransportError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .ok()
        .map(|e| e.error)
        .filter(|e| !e.is_empty())
        .or_else(|| status.canonical_reason().map(str::to_string))
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

    TransportError::Api {
        status: status.as_u16(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(event: Option<&str>, data: &str) -> SseFrame {
        SseFrame {
            event: event.map(str::to_string),
            data: data.to_string(),
        }
    }

    #[test]
    fn message_frame_parses_chunk() {
        let chunk = chunk_from_frame(&frame(Some("message"), r#"{"content":"Hi","done":false}"#));
        assert_eq!(chunk, StreamChunk::text("Hi"));
    }

    #[test]
    fn error_frame_keeps_backend_message() {
        let chunk = chunk_from_frame(&frame(Some("error"), r#"{"content":"","error":"boom"}"#));
        assert_eq!(chunk.error.as_deref(), Some("boom"));
    }

    #[test]
    fn error_frame_without_message_gets_default() {
        let chunk = chunk_from_frame(&frame(Some("error"), r#"{"content":"","done":true}"#));
        assert_eq!(chunk.error.as_deref(), Some("Unknown error"));

        let chunk = chunk_from_frame(&frame(Some("error"), r#"{"content":"","error":""}"#));
        assert_eq!(chunk.error.as_deref(), Some("Unknown error"));
    }

    #[test]
    fn unparseable_frame_becomes_terminal_error() {
        let chunk = chunk_from_frame(&frame(None, "{not json"));
        assert!(chunk.done);
        assert!(chunk
            .error
            .as_deref()
            .unwrap()
            .starts_with("Failed to parse response:"));
    }

    #[test]
    fn retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.delay, Duration::from_millis(1000));
        assert!(policy.is_retryable(503));
        assert!(policy.is_retryable(429));
        assert!(!policy.is_retryable(404));
        assert!(!policy.is_retryable(400));
    }

    #[test]
    fn backoff_grows_and_saturates() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.next_delay(Duration::from_millis(1000)), Duration::from_millis(2000));

        let policy = RetryPolicy {
            backoff_multiplier: u32::MAX,
            ..RetryPolicy::default()
        };
        let mut delay = Duration::from_secs(3600);
        for _ in 0..4 {
            delay = policy.next_delay(delay);
        }
        assert_eq!(delay, Duration::MAX);
    }

    #[test]
    fn endpoint_handles_trailing_slash() {
        let client = DgdClient::new(ClientConfig {
            base_url: "http://localhost:9000/".to_string(),
            ..ClientConfig::default()
        })
        .unwrap();
        assert_eq!(
            client.endpoint(CHAT_STREAM_PATH),
            "http://localhost:9000/api/chat/stream"
        );
        assert_eq!(client.base_url(), "http://localhost:9000/");
    }

    #[test]
    fn new_client_does_not_panic() {
        let _client = DgdClient::new(ClientConfig::default()).unwrap();
    }
}
