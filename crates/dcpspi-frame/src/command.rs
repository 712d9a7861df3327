use std::fmt;

use bytes::Bytes;

use crate::error::{FramingError, Result};

/// Command header: command (1) + register (1) + length (2 LE) = 4 bytes.
pub const COMMAND_HEADER_SIZE: usize = 4;

/// Largest payload a single command frame may carry.
pub const MAX_PAYLOAD_SIZE: usize = 256;

/// Largest raw command frame (header + payload).
pub const MAX_COMMAND_FRAME_SIZE: usize = COMMAND_HEADER_SIZE + MAX_PAYLOAD_SIZE;

/// DCP command codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    WriteRegister = 0,
    ReadRegister = 1,
    MultiWriteRegister = 2,
    MultiReadRegister = 3,
}

impl Command {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Self::WriteRegister),
            1 => Ok(Self::ReadRegister),
            2 => Ok(Self::MultiWriteRegister),
            3 => Ok(Self::MultiReadRegister),
            other => Err(FramingError::UnknownCommand(other)),
        }
    }

    /// Write commands carry their payload directly behind the header.
    pub fn is_write(self) -> bool {
        matches!(self, Self::WriteRegister | Self::MultiWriteRegister)
    }

    /// Read commands carry no payload and expect an answer.
    pub fn is_read(self) -> bool {
        !self.is_write()
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::WriteRegister => "write-register",
            Self::ReadRegister => "read-register",
            Self::MultiWriteRegister => "multi-write-register",
            Self::MultiReadRegister => "multi-read-register",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for Command {
    type Error = FramingError;

    fn try_from(code: u8) -> Result<Self> {
        Self::from_code(code)
    }
}

/// Parsed command header.
///
/// Wire format (raw, before escaping):
/// ```text
/// ┌──────────┬──────────┬───────────────┐
/// │ Command  │ Register │ Length        │
/// │ (1B)     │ (1B)     │ (2B LE)       │
/// └──────────┴──────────┴───────────────┘
/// ```
/// For write commands `Length` is the number of payload bytes that follow;
/// for read commands it is the size of the requested answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHeader {
    pub command: Command,
    pub register: u8,
    pub payload_len: u16,
}

impl CommandHeader {
    pub fn new(command: Command, register: u8, payload_len: usize) -> Result<Self> {
        check_payload_len(payload_len)?;
        Ok(Self {
            command,
            register,
            payload_len: payload_len as u16,
        })
    }

    pub fn to_bytes(&self) -> [u8; COMMAND_HEADER_SIZE] {
        let len = self.payload_len.to_le_bytes();
        [self.command.code(), self.register, len[0], len[1]]
    }

    /// Number of payload bytes that follow this header on a byte stream.
    pub fn following_len(&self) -> usize {
        if self.command.is_write() {
            self.payload_len as usize
        } else {
            0
        }
    }

    /// Total raw frame size as seen on a byte stream.
    pub fn frame_len(&self) -> usize {
        COMMAND_HEADER_SIZE + self.following_len()
    }
}

/// Build the 4 raw header bytes for a command.
pub fn build_command_header(
    command: Command,
    register: u8,
    payload_len: usize,
) -> Result<[u8; COMMAND_HEADER_SIZE]> {
    CommandHeader::new(command, register, payload_len).map(|header| header.to_bytes())
}

/// Parse the first 4 raw bytes of a command frame.
pub fn parse_command_header(bytes: &[u8]) -> Result<CommandHeader> {
    if bytes.len() < COMMAND_HEADER_SIZE {
        return Err(FramingError::Truncated {
            needed: COMMAND_HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let command = Command::from_code(bytes[0])?;
    let payload_len = u16::from_le_bytes([bytes[2], bytes[3]]);
    check_payload_len(payload_len as usize)?;

    Ok(CommandHeader {
        command,
        register: bytes[1],
        payload_len,
    })
}

fn check_payload_len(len: usize) -> Result<()> {
    if len > MAX_PAYLOAD_SIZE {
        return Err(FramingError::PayloadTooLarge {
            size: len,
            max: MAX_PAYLOAD_SIZE,
        });
    }
    Ok(())
}

/// A complete raw command frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    pub header: CommandHeader,
    pub payload: Bytes,
}

impl CommandFrame {
    /// Build a write frame; the payload length goes into the header.
    pub fn write(command: Command, register: u8, payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        if command.is_read() {
            return Err(FramingError::UnexpectedCommand(command));
        }
        let header = CommandHeader::new(command, register, payload.len())?;
        Ok(Self { header, payload })
    }

    /// Build a read request for `answer_len` bytes.
    pub fn read(command: Command, register: u8, answer_len: usize) -> Result<Self> {
        if command.is_write() {
            return Err(FramingError::UnexpectedCommand(command));
        }
        let header = CommandHeader::new(command, register, answer_len)?;
        Ok(Self {
            header,
            payload: Bytes::new(),
        })
    }

    /// Parse a complete raw frame. Trailing bytes are an error.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let header = parse_command_header(raw)?;
        let needed = header.frame_len();
        if raw.len() < needed {
            return Err(FramingError::Truncated {
                needed,
                available: raw.len(),
            });
        }
        if raw.len() > needed {
            return Err(FramingError::PayloadTooLarge {
                size: raw.len() - COMMAND_HEADER_SIZE,
                max: header.following_len(),
            });
        }

        Ok(Self {
            header,
            payload: Bytes::copy_from_slice(&raw[COMMAND_HEADER_SIZE..]),
        })
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let mut raw = Vec::with_capacity(COMMAND_HEADER_SIZE + self.payload.len());
        raw.extend_from_slice(&self.header.to_bytes());
        raw.extend_from_slice(&self.payload);
        raw
    }
}
