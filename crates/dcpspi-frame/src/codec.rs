use bytes::{BufMut, Bytes, BytesMut};

use crate::arena::ByteArena;
use crate::error::{FramingError, Result};

/// Reserved byte value on the SPI wire.
pub const ESCAPE_CHARACTER: u8 = 0x27;

/// Byte following [`ESCAPE_CHARACTER`] to encode a literal escape character.
pub const ESCAPED_ESCAPE: u8 = 0x01;

/// Number of wire bytes needed to carry `raw` after escape stuffing.
pub fn encoded_len(raw: &[u8]) -> usize {
    raw.len() + raw.iter().filter(|&&b| b == ESCAPE_CHARACTER).count()
}

/// Escape `raw` for the wire.
///
/// Wire format:
/// ```text
/// raw:   .. 0x27 ..
/// wire:  .. 0x27 0x01 ..
/// ```
/// Every other byte passes through unchanged.
pub fn encode(raw: &[u8]) -> Bytes {
    let mut dst = BytesMut::with_capacity(encoded_len(raw));
    encode_into(raw, &mut dst);
    dst.freeze()
}

/// Escape `raw` and append the result to `dst`.
pub fn encode_into(raw: &[u8], dst: &mut BytesMut) {
    dst.reserve(encoded_len(raw));
    for &byte in raw {
        dst.put_u8(byte);
        if byte == ESCAPE_CHARACTER {
            dst.put_u8(ESCAPED_ESCAPE);
        }
    }
}

/// Escape `raw` into a fixed-capacity arena.
///
/// Either the whole escaped sequence fits and is appended, or
/// [`FramingError::Overflow`] is returned and the arena is left as it was.
pub fn escape_into_arena(raw: &[u8], arena: &mut ByteArena) -> Result<()> {
    let needed = encoded_len(raw);
    if needed > arena.remaining() {
        return Err(FramingError::Overflow {
            requested: needed,
            available: arena.remaining(),
            capacity: arena.capacity(),
        });
    }

    for &byte in raw {
        arena.push(byte)?;
        if byte == ESCAPE_CHARACTER {
            arena.push(ESCAPED_ESCAPE)?;
        }
    }
    Ok(())
}

/// Remove escape stuffing from a complete wire sequence.
pub fn decode(wire: &[u8]) -> Result<Bytes> {
    let mut unescaper = Unescaper::new();
    let mut dst = BytesMut::with_capacity(wire.len());

    for &byte in wire {
        if let Some(raw) = unescaper.feed(byte)? {
            dst.put_u8(raw);
        }
    }

    unescaper.finish()?;
    Ok(dst.freeze())
}

/// Incremental unescaper for byte streams without message boundaries.
///
/// Wire bytes arrive in arbitrary chunks; an escape character at the end of
/// one chunk is completed by the first byte of the next.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unescaper {
    pending_escape: bool,
}

impl Unescaper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one wire byte, yielding a raw byte when one is complete.
    pub fn feed(&mut self, byte: u8) -> Result<Option<u8>> {
        if self.pending_escape {
            self.pending_escape = false;
            return match byte {
                ESCAPED_ESCAPE => Ok(Some(ESCAPE_CHARACTER)),
                _ => Err(FramingError::DanglingEscape),
            };
        }

        if byte == ESCAPE_CHARACTER {
            self.pending_escape = true;
            Ok(None)
        } else {
            Ok(Some(byte))
        }
    }

    /// Whether the last fed byte started an escape sequence.
    pub fn is_pending(&self) -> bool {
        self.pending_escape
    }

    /// Check that the stream did not end inside an escape sequence.
    pub fn finish(&self) -> Result<()> {
        if self.pending_escape {
            Err(FramingError::DanglingEscape)
        } else {
            Ok(())
        }
    }

    pub fn reset(&mut self) {
        self.pending_escape = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_bytes_pass_through() {
        let raw = [0x00, 0x01, 0x26, 0x28, 0xff];
        assert_eq!(encode(&raw).as_ref(), &raw);
        assert_eq!(decode(&raw).unwrap().as_ref(), &raw);
    }

    #[test]
    fn escape_character_is_stuffed() {
        let wire = encode(&[0x10, ESCAPE_CHARACTER, 0x20]);
        assert_eq!(wire.as_ref(), &[0x10, 0x27, 0x01, 0x20]);
    }

    #[test]
    fn decode_inverts_encode() {
        let cases: Vec<Vec<u8>> = vec![
            vec![],
            vec![ESCAPE_CHARACTER],
            vec![ESCAPE_CHARACTER, ESCAPE_CHARACTER],
            vec![ESCAPE_CHARACTER, 0x01],
            vec![0x01, ESCAPE_CHARACTER],
            vec![ESCAPE_CHARACTER, 0x00, 0x00, ESCAPE_CHARACTER],
            (0..=255u8).collect(),
            vec![ESCAPE_CHARACTER; 300],
        ];

        for raw in cases {
            let wire = encode(&raw);
            assert_eq!(wire.len(), encoded_len(&raw));
            assert_eq!(decode(&wire).unwrap().as_ref(), raw.as_slice());
        }
    }

    #[test]
    fn decode_inverts_encode_for_pseudo_random_sequences() {
        // xorshift keeps the sequences reproducible; a bias towards the escape
        // character makes runs and boundary positions common.
        let mut state = 0x2545_f491_u32;
        for len in 0..200usize {
            let raw: Vec<u8> = (0..len)
                .map(|_| {
                    state ^= state << 13;
                    state ^= state >> 17;
                    state ^= state << 5;
                    if state % 4 == 0 {
                        ESCAPE_CHARACTER
                    } else {
                        state as u8
                    }
                })
                .collect();
            assert_eq!(decode(&encode(&raw)).unwrap().as_ref(), raw.as_slice());
        }
    }

    #[test]
    fn trailing_escape_is_dangling() {
        let err = decode(&[0x01, 0x05, 0x00, ESCAPE_CHARACTER]).unwrap_err();
        assert_eq!(err, FramingError::DanglingEscape);
    }

    #[test]
    fn unknown_escape_follower_is_rejected() {
        let err = decode(&[ESCAPE_CHARACTER, 0x02]).unwrap_err();
        assert_eq!(err, FramingError::DanglingEscape);

        let err = decode(&[ESCAPE_CHARACTER, ESCAPE_CHARACTER]).unwrap_err();
        assert_eq!(err, FramingError::DanglingEscape);
    }

    #[test]
    fn unescaper_spans_chunks() {
        let mut unescaper = Unescaper::new();
        assert_eq!(unescaper.feed(ESCAPE_CHARACTER).unwrap(), None);
        assert!(unescaper.is_pending());
        assert!(unescaper.finish().is_err());
        assert_eq!(unescaper.feed(ESCAPED_ESCAPE).unwrap(), Some(ESCAPE_CHARACTER));
        assert!(!unescaper.is_pending());
        assert!(unescaper.finish().is_ok());
    }

    #[test]
    fn escape_into_arena_is_all_or_nothing() {
        let mut arena = ByteArena::with_capacity(4);
        arena.push(0xaa).unwrap();

        let err = escape_into_arena(&[ESCAPE_CHARACTER, ESCAPE_CHARACTER], &mut arena).unwrap_err();
        assert!(matches!(err, FramingError::Overflow { requested: 4, .. }));
        assert_eq!(arena.filled(), &[0xaa]);

        escape_into_arena(&[0x01, ESCAPE_CHARACTER], &mut arena).unwrap();
        assert_eq!(arena.filled(), &[0xaa, 0x01, 0x27, 0x01]);
    }
}
