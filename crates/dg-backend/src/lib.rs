//! dg-backend: Transport to the DGD chat backend.
//!
//! Provides the [`ChatTransport`] seam, an SSE-based HTTP client for the real
//! backend, and a scriptable mock for tests.

pub mod client;
pub mod mock;
pub mod sse;
pub mod transport;

pub use client::{ClientConfig, DgdClient, RetryPolicy, API_BASE_ENV, DEFAULT_API_BASE};
pub use mock::{MockConfig, MockResponse, MockTransport};
pub use transport::{ChatTransport, ChunkStream, TransportError};
