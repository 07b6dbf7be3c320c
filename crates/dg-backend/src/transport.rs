//! The seam between the streaming core and whatever delivers chunks.

use std::pin::Pin;

use dg_protocol::{ChatRequest, StreamChunk};
use futures::Stream;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("connection error: {0}")]
    Connection(String),
}

/// Chunks in delivery order. The stream ends after a chunk with `done` or
/// `error` set, on a transport failure, or once the cancel token fires.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, TransportError>> + Send>>;

/// Something that can open a streamed chat response.
pub trait ChatTransport: Send + Sync + 'static {
    /// Submit `request` and return its chunks. When `cancel` fires the
    /// transport must close its connection and stop yielding.
    fn open_stream(&self, request: ChatRequest, cancel: CancellationToken) -> ChunkStream;
}
