//! Orchestrates one chat stream at a time.
//!
//! A [`StreamController`] opens a stream on its transport, drives the
//! decode loop on a spawned task and publishes a [`StreamSnapshot`] through
//! a watch channel so a UI can render partial content. Exactly one of
//! [`StreamListener::on_message_complete`] or [`StreamListener::on_error`]
//! fires per stream unless it is cancelled first, in which case neither does.
//!
//! Terminal outcomes are committed inside the watch channel's write lock and
//! `cancel` sets the gate under the same lock, so a cancel racing a
//! completion resolves to exactly one of the two.

use std::sync::Arc;

use dg_backend::{ChatTransport, ChunkStream};
use dg_protocol::{ChatRequest, Message, StreamEvent};
use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::accumulator::Accumulator;
use super::decoder::decode;
use super::error::StreamError;
use super::finalizer::finalize;
use super::gate::CancellationGate;
use super::state::{StreamState, Transition};

/// Receives the outcome of each stream.
///
/// Called from the stream task, outside any controller lock.
pub trait StreamListener: Send + Sync {
    fn on_message_complete(&self, _message: Message) {}
    fn on_error(&self, _error: &StreamError) {}
}

/// Listener that ignores every outcome.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl StreamListener for NoopListener {}

/// What observers see of the controller.
#[derive(Debug, Clone, Default)]
pub struct StreamSnapshot {
    pub state: StreamState,
    /// Increments on every accepted `start`.
    pub stream_id: u64,
    /// Partial content of the active stream. Empty whenever idle.
    pub content: String,
    /// The failure of the most recent stream, until the next start or reset.
    pub error: Option<Arc<StreamError>>,
    /// The transient state the most recent stream passed through on its way
    /// back to idle.
    pub last_outcome: Option<StreamState>,
}

impl StreamSnapshot {
    pub fn is_streaming(&self) -> bool {
        self.state.is_streaming()
    }
}

pub struct StreamController<T: ChatTransport> {
    transport: Arc<T>,
    listener: Arc<dyn StreamListener>,
    snapshot: Arc<watch::Sender<StreamSnapshot>>,
    gate: Option<CancellationGate>,
    task: Option<JoinHandle<()>>,
    next_stream_id: u64,
}

impl<T: ChatTransport> StreamController<T> {
    pub fn new(transport: T, listener: Arc<dyn StreamListener>) -> Self {
        Self::with_shared_transport(Arc::new(transport), listener)
    }

    pub fn with_shared_transport(transport: Arc<T>, listener: Arc<dyn StreamListener>) -> Self {
        let (snapshot, _) = watch::channel(StreamSnapshot::default());
        Self {
            transport,
            listener,
            snapshot: Arc::new(snapshot),
            gate: None,
            task: None,
            next_stream_id: 0,
        }
    }

    /// Begin streaming a reply to `message`.
    ///
    /// Returns `false` without touching the transport if a stream is already
    /// active. Must be called from within a tokio runtime.
    pub fn start(
        &mut self,
        message: impl Into<String>,
        session_id: impl Into<String>,
        perspectives: Option<Vec<String>>,
    ) -> bool {
        let session_id = session_id.into();
        let stream_id = self.next_stream_id + 1;

        let accepted = self.snapshot.send_if_modified(|snap| {
            let Some(next) = snap.state.next(Transition::Start) else {
                return false;
            };
            snap.state = next;
            snap.stream_id = stream_id;
            snap.content.clear();
            snap.error = None;
            snap.last_outcome = None;
            true
        });

        if !accepted {
            warn!(session_id = %session_id, "stream already active, ignoring new message");
            return false;
        }
        self.next_stream_id = stream_id;

        let gate = CancellationGate::new();
        let request = ChatRequest::streaming(session_id.clone(), message).with_perspectives(perspectives);
        info!(stream_id, session_id = %session_id, "starting stream");
        let chunks = self.transport.open_stream(request, gate.token());

        let run = StreamRun {
            stream_id,
            session_id,
            gate: gate.clone(),
            snapshot: Arc::clone(&self.snapshot),
            listener: Arc::clone(&self.listener),
        };
        self.gate = Some(gate);
        self.task = Some(tokio::spawn(run.drive(chunks)));
        true
    }

    /// Abort the active stream. Neither callback fires for it and the
    /// controller is immediately ready for a new `start`.
    ///
    /// Returns `false` if there was nothing to cancel.
    pub fn cancel(&mut self) -> bool {
        let Some(gate) = self.gate.take() else {
            return false;
        };

        let cancelled = self.snapshot.send_if_modified(|snap| {
            gate.cancel();
            let Some(outcome) = snap.state.next(Transition::Cancel) else {
                return false;
            };
            debug_assert!(outcome.is_transient());
            snap.state = outcome.next(Transition::Settle).unwrap_or_default();
            snap.last_outcome = Some(outcome);
            snap.content.clear();
            true
        });

        if cancelled {
            info!(stream_id = self.next_stream_id, "stream cancelled");
        }
        cancelled
    }

    /// Clear partial content and the last error. A no-op while a stream is
    /// active.
    pub fn reset(&mut self) {
        self.snapshot.send_if_modified(|snap| {
            if snap.state.is_streaming() {
                return false;
            }
            let changed = !snap.content.is_empty() || snap.error.is_some();
            snap.content.clear();
            snap.error = None;
            changed
        });
    }

    pub fn is_streaming(&self) -> bool {
        self.snapshot.borrow().is_streaming()
    }

    pub fn state(&self) -> StreamState {
        self.snapshot.borrow().state
    }

    pub fn partial_content(&self) -> String {
        self.snapshot.borrow().content.clone()
    }

    pub fn last_error(&self) -> Option<Arc<StreamError>> {
        self.snapshot.borrow().error.clone()
    }

    pub fn snapshot(&self) -> StreamSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Watch every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<StreamSnapshot> {
        self.snapshot.subscribe()
    }

    /// Wait for the most recent stream task to exit.
    pub async fn finished(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "stream task ended abnormally");
            }
        }
    }
}

impl<T: ChatTransport> Drop for StreamController<T> {
    fn drop(&mut self) {
        if let Some(gate) = &self.gate {
            gate.cancel();
        }
    }
}

/// State owned by one spawned stream task.
struct StreamRun {
    stream_id: u64,
    session_id: String,
    gate: CancellationGate,
    snapshot: Arc<watch::Sender<StreamSnapshot>>,
    listener: Arc<dyn StreamListener>,
}

impl StreamRun {
    async fn drive(self, mut chunks: ChunkStream) {
        let mut acc = Accumulator::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = self.gate.cancelled() => {
                    debug!(stream_id = self.stream_id, "decode loop stopped by cancel");
                    return;
                }
                next = chunks.next() => next,
            };

            if self.gate.is_cancelled() {
                return;
            }

            let chunk = match next {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => {
                    self.fail(StreamError::Transport(e));
                    return;
                }
                None => {
                    self.fail(StreamError::Incomplete);
                    return;
                }
            };

            for event in decode(&chunk) {
                match event {
                    StreamEvent::ErrorSignal(message) => {
                        self.fail(StreamError::Protocol(message));
                        return;
                    }
                    StreamEvent::Terminal => {
                        self.complete(&mut acc);
                        return;
                    }
                    event => acc.apply(&event),
                }
            }

            self.publish(&acc);
        }
    }

    /// Whether this run may still write to the shared snapshot.
    fn owns(&self, snap: &StreamSnapshot) -> bool {
        snap.stream_id == self.stream_id && snap.state.is_streaming() && !self.gate.is_cancelled()
    }

    fn publish(&self, acc: &Accumulator) {
        self.snapshot.send_if_modified(|snap| {
            if !self.owns(snap) || snap.content == acc.content() {
                return false;
            }
            snap.content.clear();
            snap.content.push_str(acc.content());
            true
        });
    }

    /// Move to `transition`'s outcome and straight on to idle. Returns
    /// whether this run committed the outcome.
    fn settle(&self, transition: Transition, error: Option<Arc<StreamError>>) -> bool {
        self.snapshot.send_if_modified(|snap| {
            if !self.owns(snap) {
                return false;
            }
            let Some(outcome) = snap.state.next(transition) else {
                return false;
            };
            debug_assert!(outcome.is_transient());
            snap.state = outcome.next(Transition::Settle).unwrap_or_default();
            snap.last_outcome = Some(outcome);
            snap.content.clear();
            snap.error = error;
            true
        })
    }

    fn complete(&self, acc: &mut Accumulator) {
        let message = finalize(acc, &self.session_id);
        acc.reset();

        if self.settle(Transition::Complete, None) {
            info!(
                stream_id = self.stream_id,
                message_id = %message.id,
                agent_type = %message.agent_type,
                "stream complete"
            );
            self.listener.on_message_complete(message);
        }
    }

    fn fail(&self, error: StreamError) {
        let error = Arc::new(error);
        if self.settle(Transition::Fail, Some(Arc::clone(&error))) {
            warn!(stream_id = self.stream_id, error = %error, "stream failed");
            self.listener.on_error(&error);
        }
    }
}
