use std::time::Duration;

use dcpspi_frame::FramingError;
use dcpspi_transport::TransportError;

/// Failures contained within a single transaction.
///
/// The engine aborts the transaction, logs the error and returns to idle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransactionError {
    /// Malformed frame from the bus or a host channel.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// The host did not answer a slave read request in time.
    #[error("no answer from host within {0:?}")]
    Timeout(Duration),
}

/// Errors that end the event loop.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Bus, request line or host channel failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Transport(TransportError::Io(err))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
