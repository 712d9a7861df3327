use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::arena::ByteArena;
use crate::codec::{encode_into, escape_into_arena, Unescaper};
use crate::error::{FramingError, Result};

/// Synchronization header: marker (1) + reserved (1) + serial (2 LE) + length (2 LE).
pub const SYNC_HEADER_SIZE: usize = 6;

/// Marker byte of a synchronization header wrapping a command.
pub const SYNC_MARKER_COMMAND: u8 = b'c';

pub const SLAVE_SERIAL_INVALID: u16 = 0x0000;
pub const SLAVE_SERIAL_MIN: u16 = 0x0001;
pub const SLAVE_SERIAL_MAX: u16 = 0x7fff;
pub const MASTER_SERIAL_INVALID: u16 = 0x8000;
pub const MASTER_SERIAL_MIN: u16 = 0x8001;
pub const MASTER_SERIAL_MAX: u16 = 0xffff;

/// Which side started a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// The peripheral, through the request line.
    Slave,
    /// The host, through the inbound channel.
    Master,
}

impl Origin {
    /// Inclusive serial range assigned to this origin.
    pub fn serial_range(self) -> std::ops::RangeInclusive<u16> {
        match self {
            Origin::Slave => SLAVE_SERIAL_MIN..=SLAVE_SERIAL_MAX,
            Origin::Master => MASTER_SERIAL_MIN..=MASTER_SERIAL_MAX,
        }
    }

    /// Origin owning a live serial; `None` for the sentinels.
    pub fn of_serial(serial: u16) -> Option<Self> {
        match serial {
            SLAVE_SERIAL_INVALID | MASTER_SERIAL_INVALID => None,
            SLAVE_SERIAL_MIN..=SLAVE_SERIAL_MAX => Some(Origin::Slave),
            _ => Some(Origin::Master),
        }
    }
}

/// Hands out serials per origin, wrapping inside the origin's range.
#[derive(Debug, Clone)]
pub struct SerialGenerator {
    next_slave: u16,
    next_master: u16,
}

impl Default for SerialGenerator {
    fn default() -> Self {
        Self {
            next_slave: SLAVE_SERIAL_MIN,
            next_master: MASTER_SERIAL_MIN,
        }
    }
}

impl SerialGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next serial for `origin`.
    pub fn next(&mut self, origin: Origin) -> u16 {
        let (counter, min, max) = match origin {
            Origin::Slave => (&mut self.next_slave, SLAVE_SERIAL_MIN, SLAVE_SERIAL_MAX),
            Origin::Master => (&mut self.next_master, MASTER_SERIAL_MIN, MASTER_SERIAL_MAX),
        };

        let serial = *counter;
        *counter = if serial >= max { min } else { serial + 1 };
        serial
    }
}

/// Parsed synchronization header.
///
/// Wire format (never escaped):
/// ```text
/// ┌──────────┬──────────┬───────────┬───────────┐
/// │ Marker   │ Reserved │ Serial    │ Length    │
/// │ 'c'      │ 0x00     │ (2B LE)   │ (2B LE)   │
/// └──────────┴──────────┴───────────┴───────────┘
/// ```
/// `Length` counts the raw command frame bytes; the escaped command frame
/// follows the header directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncHeader {
    pub serial: u16,
    pub length: u16,
}

impl SyncHeader {
    /// Allocate a serial for `origin` and describe `raw_len` command bytes.
    pub fn next(serials: &mut SerialGenerator, origin: Origin, raw_len: usize) -> Result<Self> {
        let length = u16::try_from(raw_len).map_err(|_| FramingError::PayloadTooLarge {
            size: raw_len,
            max: u16::MAX as usize,
        })?;
        Ok(Self {
            serial: serials.next(origin),
            length,
        })
    }

    pub fn to_bytes(&self) -> [u8; SYNC_HEADER_SIZE] {
        let serial = self.serial.to_le_bytes();
        let length = self.length.to_le_bytes();
        [
            SYNC_MARKER_COMMAND,
            0x00,
            serial[0],
            serial[1],
            length[0],
            length[1],
        ]
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < SYNC_HEADER_SIZE {
            return Err(FramingError::Truncated {
                needed: SYNC_HEADER_SIZE,
                available: bytes.len(),
            });
        }
        if bytes[0] != SYNC_MARKER_COMMAND {
            return Err(FramingError::InvalidMarker(bytes[0]));
        }

        Ok(Self {
            serial: u16::from_le_bytes([bytes[2], bytes[3]]),
            length: u16::from_le_bytes([bytes[4], bytes[5]]),
        })
    }

    pub fn origin(&self) -> Option<Origin> {
        Origin::of_serial(self.serial)
    }
}

/// Append a synchronization header and the escaped `raw` frame to `dst`.
pub fn encode_sync_frame(header: SyncHeader, raw: &[u8], dst: &mut BytesMut) {
    dst.reserve(SYNC_HEADER_SIZE);
    dst.put_slice(&header.to_bytes());
    encode_into(raw, dst);
}

/// Write a synchronization header and the escaped `raw` frame into `arena`.
pub fn write_sync_frame(header: SyncHeader, raw: &[u8], arena: &mut ByteArena) -> Result<()> {
    arena.extend_from_slice(&header.to_bytes())?;
    escape_into_arena(raw, arena)?;
    trace!(serial = header.serial, len = header.length, wire = arena.len(), "sync frame built");
    Ok(())
}

/// Split a wire sequence into its synchronization header and raw command frame.
///
/// Fails with [`FramingError::Truncated`] if the header declares more raw
/// bytes than the wire provides.
pub fn decode_sync_frame(wire: &[u8]) -> Result<(SyncHeader, Bytes)> {
    let header = SyncHeader::parse(wire)?;
    let needed = header.length as usize;

    let mut unescaper = Unescaper::new();
    let mut raw = BytesMut::with_capacity(needed);
    for &byte in &wire[SYNC_HEADER_SIZE..] {
        if raw.len() == needed {
            break;
        }
        if let Some(b) = unescaper.feed(byte)? {
            raw.put_u8(b);
        }
    }

    unescaper.finish()?;
    if raw.len() < needed {
        return Err(FramingError::Truncated {
            needed,
            available: raw.len(),
        });
    }

    Ok((header, raw.freeze()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ESCAPE_CHARACTER;

    #[test]
    fn serials_start_at_range_minimum() {
        let mut serials = SerialGenerator::new();
        assert_eq!(serials.next(Origin::Slave), 0x0001);
        assert_eq!(serials.next(Origin::Master), 0x8001);
        assert_eq!(serials.next(Origin::Slave), 0x0002);
        assert_eq!(serials.next(Origin::Master), 0x8002);
    }

    #[test]
    fn serials_wrap_inside_their_range() {
        let mut serials = SerialGenerator::new();
        let mut last_slave = 0;
        let mut last_master = 0;

        // Two full cycles of each range.
        for _ in 0..(2 * 0x7fff) {
            let slave = serials.next(Origin::Slave);
            let master = serials.next(Origin::Master);

            assert!(Origin::Slave.serial_range().contains(&slave));
            assert!(Origin::Master.serial_range().contains(&master));
            assert_ne!(slave, SLAVE_SERIAL_INVALID);
            assert_ne!(master, MASTER_SERIAL_INVALID);

            last_slave = slave;
            last_master = master;
        }

        assert_eq!(last_slave, SLAVE_SERIAL_MAX);
        assert_eq!(last_master, MASTER_SERIAL_MAX);
        assert_eq!(serials.next(Origin::Slave), SLAVE_SERIAL_MIN);
        assert_eq!(serials.next(Origin::Master), MASTER_SERIAL_MIN);
    }

    #[test]
    fn origin_of_serial() {
        assert_eq!(Origin::of_serial(0x0000), None);
        assert_eq!(Origin::of_serial(0x8000), None);
        assert_eq!(Origin::of_serial(0x0001), Some(Origin::Slave));
        assert_eq!(Origin::of_serial(0x7fff), Some(Origin::Slave));
        assert_eq!(Origin::of_serial(0x8001), Some(Origin::Master));
        assert_eq!(Origin::of_serial(0xffff), Some(Origin::Master));
    }

    #[test]
    fn header_layout() {
        let header = SyncHeader {
            serial: 0x8123,
            length: 12,
        };
        assert_eq!(header.to_bytes(), [b'c', 0x00, 0x23, 0x81, 12, 0]);
        assert_eq!(SyncHeader::parse(&header.to_bytes()).unwrap(), header);
        assert_eq!(header.origin(), Some(Origin::Master));
    }

    #[test]
    fn parse_rejects_bad_marker() {
        let err = SyncHeader::parse(&[b'x', 0, 1, 0, 0, 0]).unwrap_err();
        assert_eq!(err, FramingError::InvalidMarker(b'x'));
    }

    #[test]
    fn sync_frame_length_counts_raw_bytes() {
        let mut serials = SerialGenerator::new();
        let raw = [0x00, ESCAPE_CHARACTER, 0x02, 0x00, 0xaa, ESCAPE_CHARACTER];
        let header = SyncHeader::next(&mut serials, Origin::Master, raw.len()).unwrap();

        let mut wire = BytesMut::new();
        encode_sync_frame(header, &raw, &mut wire);
        assert_eq!(wire.len(), SYNC_HEADER_SIZE + raw.len() + 2);

        let (decoded_header, decoded) = decode_sync_frame(&wire).unwrap();
        assert_eq!(decoded_header.length as usize, raw.len());
        assert_eq!(decoded_header.serial, MASTER_SERIAL_MIN);
        assert_eq!(decoded.as_ref(), &raw);
    }

    #[test]
    fn arena_and_bytes_encoders_agree() {
        let raw = [ESCAPE_CHARACTER, 1, 2, 3];
        let header = SyncHeader {
            serial: 5,
            length: raw.len() as u16,
        };

        let mut wire = BytesMut::new();
        encode_sync_frame(header, &raw, &mut wire);

        let mut arena = ByteArena::with_capacity(64);
        write_sync_frame(header, &raw, &mut arena).unwrap();
        assert_eq!(arena.filled(), wire.as_ref());
    }

    #[test]
    fn decode_reports_truncation() {
        let header = SyncHeader {
            serial: 0x8001,
            length: 10,
        };
        let mut wire = BytesMut::new();
        encode_sync_frame(header, &[1, 2, 3], &mut wire);

        let err = decode_sync_frame(&wire).unwrap_err();
        assert_eq!(
            err,
            FramingError::Truncated {
                needed: 10,
                available: 3,
            }
        );
    }

    #[test]
    fn decode_reports_dangling_escape_at_end() {
        let mut wire = SyncHeader {
            serial: 0x0001,
            length: 2,
        }
        .to_bytes()
        .to_vec();
        wire.extend_from_slice(&[0x01, ESCAPE_CHARACTER]);

        assert_eq!(
            decode_sync_frame(&wire).unwrap_err(),
            FramingError::DanglingEscape
        );
    }
}
