//! Controller-level stream lifecycle.

/// Where a controller is in the lifecycle of its current stream.
///
/// `Completed`, `Errored` and `Cancelled` are transient: the controller
/// passes through them and settles back to `Idle` in the same step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StreamState {
    #[default]
    Idle,
    Streaming,
    Completed,
    Errored,
    Cancelled,
}

/// Inputs that move the lifecycle forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Start,
    Complete,
    Fail,
    Cancel,
    /// Resolve a transient outcome back to `Idle`.
    Settle,
}

impl StreamState {
    /// The state reached by applying `transition`, or `None` if it is not
    /// legal from here.
    pub fn next(self, transition: Transition) -> Option<StreamState> {
        use StreamState::*;
        match (self, transition) {
            (Idle, Transition::Start) => Some(Streaming),
            (Streaming, Transition::Complete) => Some(Completed),
            (Streaming, Transition::Fail) => Some(Errored),
            (Streaming, Transition::Cancel) => Some(Cancelled),
            (Completed | Errored | Cancelled, Transition::Settle) => Some(Idle),
            _ => None,
        }
    }

    pub fn is_streaming(self) -> bool {
        self == StreamState::Streaming
    }

    pub fn is_transient(self) -> bool {
        matches!(
            self,
            StreamState::Completed | StreamState::Errored | StreamState::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path() {
        let state = StreamState::default();
        assert_eq!(state, StreamState::Idle);

        let state = state.next(Transition::Start).unwrap();
        assert!(state.is_streaming());

        let state = state.next(Transition::Complete).unwrap();
        assert_eq!(state, StreamState::Completed);
        assert!(state.is_transient());

        assert_eq!(state.next(Transition::Settle), Some(StreamState::Idle));
    }

    #[test]
    fn every_outcome_settles_to_idle() {
        for (transition, outcome) in [
            (Transition::Complete, StreamState::Completed),
            (Transition::Fail, StreamState::Errored),
            (Transition::Cancel, StreamState::Cancelled),
        ] {
            let reached = StreamState::Streaming.next(transition).unwrap();
            assert_eq!(reached, outcome);
            assert_eq!(reached.next(Transition::Settle), Some(StreamState::Idle));
        }
    }

    #[test]
    fn start_only_from_idle() {
        assert_eq!(StreamState::Streaming.next(Transition::Start), None);
        assert_eq!(StreamState::Completed.next(Transition::Start), None);
        assert_eq!(StreamState::Cancelled.next(Transition::Start), None);
    }

    #[test]
    fn outcomes_require_an_active_stream() {
        for transition in [Transition::Complete, Transition::Fail, Transition::Cancel] {
            assert_eq!(StreamState::Idle.next(transition), None);
            assert_eq!(StreamState::Errored.next(transition), None);
        }
        assert_eq!(StreamState::Idle.next(Transition::Settle), None);
        assert_eq!(StreamState::Streaming.next(Transition::Settle), None);
    }
}
