//! DCP framing for the SPI wire.
//!
//! Two nested headers travel on the bus:
//! - A 6-byte synchronization header carrying a serial (origin + sequence)
//!   and the raw command frame length
//! - A 4-byte command header (command, register, payload length) followed
//!   by up to 256 payload bytes
//!
//! The command frame is escape-stuffed on the wire so the reserved byte
//! `0x27` never appears unescaped. Host channels carry the same command
//! frames raw.

pub mod arena;
pub mod codec;
pub mod command;
pub mod error;
pub mod sync;

pub use arena::ByteArena;
pub use codec::{
    decode, encode, encode_into, encoded_len, escape_into_arena, Unescaper, ESCAPED_ESCAPE,
    ESCAPE_CHARACTER,
};
pub use command::{
    build_command_header, parse_command_header, Command, CommandFrame, CommandHeader,
    COMMAND_HEADER_SIZE, MAX_COMMAND_FRAME_SIZE, MAX_PAYLOAD_SIZE,
};
pub use error::{FramingError, Result};
pub use sync::{
    decode_sync_frame, encode_sync_frame, write_sync_frame, Origin, SerialGenerator, SyncHeader,
    MASTER_SERIAL_INVALID, MASTER_SERIAL_MAX, MASTER_SERIAL_MIN, SLAVE_SERIAL_INVALID,
    SLAVE_SERIAL_MAX, SLAVE_SERIAL_MIN, SYNC_HEADER_SIZE, SYNC_MARKER_COMMAND,
};
