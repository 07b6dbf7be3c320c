//! Structured events decoded from stream chunks.

/// One classified piece of a stream chunk.
///
/// A single chunk can decode into several events (metadata, then a delta,
/// then the terminal marker), always in that order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Text to append to the running message.
    Delta(String),

    /// Agent classification carried alongside content.
    MetaUpdate {
        agent_type: Option<String>,
        mode: Option<String>,
    },

    /// The stream has delivered everything.
    Terminal,

    /// The backend reported a failure; nothing else in the chunk applies.
    ErrorSignal(String),
}
