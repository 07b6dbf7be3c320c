//! Classifies raw chunks into stream events.

use dg_protocol::{StreamChunk, StreamEvent};

/// Decode one chunk into the events it carries, in application order.
///
/// An error chunk yields only [`StreamEvent::ErrorSignal`]. Otherwise the
/// result is an optional metadata update, then the (possibly empty) delta,
/// then [`StreamEvent::Terminal`] if the chunk is marked done.
pub fn decode(chunk: &StreamChunk) -> Vec<StreamEvent> {
    if let Some(message) = non_empty(&chunk.error) {
        return vec![StreamEvent::ErrorSignal(message.to_string())];
    }

    let mut events = Vec::with_capacity(3);

    let agent_type = non_empty(&chunk.agent_type).map(str::to_string);
    let mode = non_empty(&chunk.mode).map(str::to_string);
    if agent_type.is_some() || mode.is_some() {
        events.push(StreamEvent::MetaUpdate { agent_type, mode });
    }

    events.push(StreamEvent::Delta(chunk.content.clone()));

    if chunk.done {
        events.push(StreamEvent::Terminal);
    }

    events
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_a_delta() {
        assert_eq!(
            decode(&StreamChunk::text("Hel")),
            vec![StreamEvent::Delta("Hel".to_string())]
        );
    }

    #[test]
    fn empty_content_is_still_a_delta() {
        assert_eq!(
            decode(&StreamChunk::text("")),
            vec![StreamEvent::Delta(String::new())]
        );
    }

    #[test]
    fn terminal_comes_after_metadata_and_delta() {
        let chunk = StreamChunk::text("!")
            .with_agent_type("dojo")
            .with_mode("mirror")
            .finished();

        assert_eq!(
            decode(&chunk),
            vec![
                StreamEvent::MetaUpdate {
                    agent_type: Some("dojo".to_string()),
                    mode: Some("mirror".to_string()),
                },
                StreamEvent::Delta("!".to_string()),
                StreamEvent::Terminal,
            ]
        );
    }

    #[test]
    fn error_overrides_everything_else() {
        let mut chunk = StreamChunk::text("ignored").with_agent_type("dojo").finished();
        chunk.error = Some("rate limited".to_string());

        assert_eq!(
            decode(&chunk),
            vec![StreamEvent::ErrorSignal("rate limited".to_string())]
        );
    }

    #[test]
    fn empty_error_field_is_not_an_error() {
        let mut chunk = StreamChunk::text("ok");
        chunk.error = Some(String::new());
        assert_eq!(decode(&chunk), vec![StreamEvent::Delta("ok".to_string())]);
    }

    #[test]
    fn partial_metadata_only_carries_present_fields() {
        let chunk = StreamChunk::text("").with_agent_type("scout");
        assert_eq!(
            decode(&chunk)[0],
            StreamEvent::MetaUpdate {
                agent_type: Some("scout".to_string()),
                mode: None,
            }
        );

        let mut chunk = StreamChunk::text("").with_mode("");
        chunk.agent_type = Some(String::new());
        assert_eq!(decode(&chunk), vec![StreamEvent::Delta(String::new())]);
    }

    #[test]
    fn only_the_last_event_can_end_the_stream() {
        let chunk = StreamChunk::text("x").with_mode("mirror").finished();
        let events = decode(&chunk);
        let (last, rest) = events.split_last().unwrap();
        assert_eq!(*last, StreamEvent::Terminal);
        assert!(rest
            .iter()
            .all(|e| !matches!(e, StreamEvent::Terminal | StreamEvent::ErrorSignal(_))));
    }
}
