//! Builds the finished message once a stream completes.

use chrono::{DateTime, Utc};
use dg_protocol::{Message, Role};
use uuid::Uuid;

use super::accumulator::Accumulator;

const ID_SUFFIX_LEN: usize = 8;

/// Build the assistant message for a completed stream, stamped now.
pub fn finalize(acc: &Accumulator, session_id: &str) -> Message {
    finalize_at(acc, session_id, Utc::now())
}

pub fn finalize_at(acc: &Accumulator, session_id: &str, now: DateTime<Utc>) -> Message {
    Message {
        id: generate_message_id(now),
        session_id: session_id.to_string(),
        role: Role::Assistant,
        content: acc.content().to_string(),
        created_at: now,
        agent_type: acc.agent_type().to_string(),
        mode: acc.mode().map(str::to_string),
    }
}

/// `msg_<unix millis>_<random>`. The backend assigns no id to streamed
/// replies.
pub fn generate_message_id(now: DateTime<Utc>) -> String {
    let suffix: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(ID_SUFFIX_LEN)
        .collect();
    format!("msg_{}_{}", now.timestamp_millis(), suffix)
}
