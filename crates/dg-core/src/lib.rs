//! dg-core: Streaming chat core for the DGD backend.
//!
//! Consumes streamed replies into finished messages under a single-stream
//! controller. Also hosts the `dgchat` CLI's config, logging and output.
//! Exposed as a library for integration testing.

pub mod config;
pub mod logging;
pub mod output;
pub mod stream;
