use dg_backend::TransportError;
use thiserror::Error;

/// Why a stream failed. Cancellation is not an error and never shows up here.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The backend put an error message in a chunk.
    #[error("{0}")]
    Protocol(String),
    #[error("stream closed before completion")]
    Incomplete,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_error_displays_backend_message() {
        let err = StreamError::Protocol("rate limited".to_string());
        assert_eq!(err.to_string(), "rate limited");
    }

    #[test]
    fn transport_error_is_transparent() {
        let err = StreamError::from(TransportError::Connection("reset".to_string()));
        assert_eq!(err.to_string(), "connection error: reset");
    }
}
