/// Errors that can occur while building, escaping or parsing frames.
///
/// All of these are local to a single transaction: the engine aborts the
/// transaction and keeps serving.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FramingError {
    /// An escape byte was the last byte, or was followed by a byte that is
    /// not a recognized escape follower.
    #[error("dangling or invalid escape sequence")]
    DanglingEscape,

    /// Fewer bytes were available than the frame declares.
    #[error("truncated frame ({available} of {needed} bytes)")]
    Truncated { needed: usize, available: usize },

    /// The declared payload exceeds the protocol maximum.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The command code is not part of the protocol.
    #[error("unknown command code 0x{0:02x}")]
    UnknownCommand(u8),

    /// A valid command arrived from a side that must not send it.
    #[error("unexpected {0} command")]
    UnexpectedCommand(crate::command::Command),

    /// The synchronization header does not start with the command marker.
    #[error("invalid synchronization marker 0x{0:02x}")]
    InvalidMarker(u8),

    /// A byte arena ran out of room.
    #[error("buffer overflow ({requested} bytes requested, {available} of {capacity} free)")]
    Overflow {
        requested: usize,
        available: usize,
        capacity: usize,
    },
}

pub type Result<T> = std::result::Result<T, FramingError>;
