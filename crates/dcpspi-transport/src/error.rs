use std::path::PathBuf;

/// Errors that can occur in transport setup and I/O.
///
/// Every variant is fatal for the daemon: setup variants abort startup,
/// [`TransportError::Io`] and [`TransportError::Closed`] end the event loop.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to create a named pipe.
    #[error("failed to create named pipe {path}: {source}")]
    CreateFifo {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The path exists but is something other than a named pipe.
    #[error("{path} exists and is not a named pipe")]
    NotAFifo { path: PathBuf },

    /// Failed to open a device or pipe.
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to apply device configuration.
    #[error("failed to configure {path}: {source}")]
    Configure {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An I/O error occurred on the bus, the request line or a channel.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The reader stopped draining a channel.
    #[error("{what} not writable within {timeout:?}")]
    WriteTimeout {
        what: &'static str,
        timeout: std::time::Duration,
    },

    /// The other end went away while a frame was in flight.
    #[error("{0} closed")]
    Closed(&'static str),
}

pub type Result<T> = std::result::Result<T, TransportError>;
