//! dg-protocol: Shared types for the DGD chat client.
//!
//! Wire types exchanged with the backend and the decoded stream events used
//! by the streaming core.

pub mod chat;
pub mod message;

pub use chat::{ChatRequest, ChatResponse, ErrorResponse, Message, Role, StreamChunk};
pub use message::StreamEvent;
