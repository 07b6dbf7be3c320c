//! Running state of the in-flight message.

use dg_protocol::StreamEvent;

/// Agent type reported when the backend never named one.
pub const UNKNOWN_AGENT: &str = "unknown";

/// Append-only content buffer plus the last agent metadata seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Accumulator {
    content: String,
    agent_type: Option<String>,
    mode: Option<String>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the buffer. Terminal and error events carry no
    /// state and are ignored here.
    pub fn apply(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Delta(text) => self.content.push_str(text),
            StreamEvent::MetaUpdate { agent_type, mode } => {
                if let Some(agent_type) = agent_type.as_deref().filter(|s| !s.is_empty()) {
                    self.agent_type = Some(agent_type.to_string());
                }
                if let Some(mode) = mode.as_deref().filter(|s| !s.is_empty()) {
                    self.mode = Some(mode.to_string());
                }
            }
            StreamEvent::Terminal | StreamEvent::ErrorSignal(_) => {}
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn agent_type(&self) -> &str {
        self.agent_type.as_deref().unwrap_or(UNKNOWN_AGENT)
    }

    pub fn mode(&self) -> Option<&str> {
        self.mode.as_deref()
    }

    pub fn reset(&mut self) {
        self.content.clear();
        self.agent_type = None;
        self.mode = None;
    }
}
