use tokio_util::sync::CancellationToken;

/// Cooperative cancellation for one stream.
///
/// The controller sets it; the decode loop checks it before every chunk and
/// the transport watches a clone of the underlying token to close its
/// connection. Setting it more than once has no further effect.
#[derive(Debug, Clone, Default)]
pub struct CancellationGate {
    token: CancellationToken,
}

impl CancellationGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the gate is set.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Token handed to the transport for this stream.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}
