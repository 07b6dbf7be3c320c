//! Streaming chat consumption: decode chunks, accumulate the reply,
//! finalize it, and drive the whole thing under a controller.

pub mod accumulator;
pub mod controller;
pub mod decoder;
pub mod error;
pub mod finalizer;
pub mod gate;
pub mod state;

pub use accumulator::{Accumulator, UNKNOWN_AGENT};
pub use controller::{NoopListener, StreamController, StreamListener, StreamSnapshot};
pub use decoder::decode;
pub use error::StreamError;
pub use finalizer::{finalize, generate_message_id};
pub use gate::CancellationGate;
pub use state::{StreamState, Transition};
