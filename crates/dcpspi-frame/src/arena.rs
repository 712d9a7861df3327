use crate::error::{FramingError, Result};

/// Fixed-capacity byte buffer with a write end and a read cursor.
///
/// The backing block is allocated once and never grows. Every write checks
/// the remaining room and reports [`FramingError::Overflow`] instead of
/// reallocating.
///
/// Invariants: `cursor <= length <= capacity`.
pub struct ByteArena {
    backing: Box<[u8]>,
    length: usize,
    cursor: usize,
}

impl ByteArena {
    /// Allocate an arena holding at most `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            backing: vec![0u8; capacity].into_boxed_slice(),
            length: 0,
            cursor: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.backing.len()
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Read position inside the written bytes.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Free room behind the written bytes.
    pub fn remaining(&self) -> usize {
        self.backing.len() - self.length
    }

    /// All bytes written since the last reset.
    pub fn filled(&self) -> &[u8] {
        &self.backing[..self.length]
    }

    /// Written bytes not consumed through the read cursor yet.
    pub fn unread(&self) -> &[u8] {
        &self.backing[self.cursor..self.length]
    }

    /// Append a single byte.
    pub fn push(&mut self, byte: u8) -> Result<()> {
        self.ensure_room(1)?;
        self.backing[self.length] = byte;
        self.length += 1;
        Ok(())
    }

    /// Append a slice; nothing is written if the slice does not fit.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_room(bytes.len())?;
        self.backing[self.length..self.length + bytes.len()].copy_from_slice(bytes);
        self.length += bytes.len();
        Ok(())
    }

    /// Borrow `len` bytes of free room for a direct read into the arena.
    ///
    /// Follow with [`ByteArena::commit`] for the number of bytes actually filled.
    pub fn spare_mut(&mut self, len: usize) -> Result<&mut [u8]> {
        self.ensure_room(len)?;
        Ok(&mut self.backing[self.length..self.length + len])
    }

    /// Mark `count` bytes of previously borrowed spare room as written.
    pub fn commit(&mut self, count: usize) {
        debug_assert!(count <= self.remaining());
        self.length += count.min(self.remaining());
    }

    /// Take the next unread byte.
    pub fn next_unread(&mut self) -> Option<u8> {
        if self.cursor < self.length {
            let byte = self.backing[self.cursor];
            self.cursor += 1;
            Some(byte)
        } else {
            None
        }
    }

    /// Move the read cursor forward, stopping at the written length.
    pub fn advance(&mut self, count: usize) {
        self.cursor = (self.cursor + count).min(self.length);
    }

    /// Forget all contents. Capacity is unchanged.
    pub fn reset(&mut self) {
        self.length = 0;
        self.cursor = 0;
    }

    fn ensure_room(&self, requested: usize) -> Result<()> {
        if requested > self.remaining() {
            return Err(FramingError::Overflow {
                requested,
                available: self.remaining(),
                capacity: self.capacity(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for ByteArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteArena")
            .field("capacity", &self.capacity())
            .field("length", &self.length)
            .field("cursor", &self.cursor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_extend_within_capacity() {
        let mut arena = ByteArena::with_capacity(4);
        arena.push(1).unwrap();
        arena.extend_from_slice(&[2, 3, 4]).unwrap();

        assert_eq!(arena.filled(), &[1, 2, 3, 4]);
        assert_eq!(arena.remaining(), 0);
    }

    #[test]
    fn overflow_is_reported_and_leaves_contents_untouched() {
        let mut arena = ByteArena::with_capacity(3);
        arena.extend_from_slice(&[9, 9]).unwrap();

        let err = arena.extend_from_slice(&[1, 2]).unwrap_err();
        assert_eq!(
            err,
            FramingError::Overflow {
                requested: 2,
                available: 1,
                capacity: 3,
            }
        );
        assert_eq!(arena.filled(), &[9, 9]);
        assert!(arena.push(7).is_ok());
        assert!(matches!(arena.push(8), Err(FramingError::Overflow { .. })));
    }

    #[test]
    fn spare_room_and_commit() {
        let mut arena = ByteArena::with_capacity(8);
        let spare = arena.spare_mut(3).unwrap();
        spare[..2].copy_from_slice(b"ok");
        arena.commit(2);

        assert_eq!(arena.filled(), b"ok");
        assert!(arena.spare_mut(7).is_err());
        assert_eq!(arena.spare_mut(6).unwrap().len(), 6);
    }

    #[test]
    fn cursor_never_passes_length() {
        let mut arena = ByteArena::with_capacity(8);
        arena.extend_from_slice(b"abc").unwrap();

        assert_eq!(arena.next_unread(), Some(b'a'));
        arena.advance(10);
        assert_eq!(arena.cursor(), 3);
        assert_eq!(arena.next_unread(), None);
        assert!(arena.unread().is_empty());
    }

    #[test]
    fn reset_keeps_capacity() {
        let mut arena = ByteArena::with_capacity(16);
        arena.extend_from_slice(&[0x27; 10]).unwrap();
        arena.advance(4);
        arena.reset();

        assert!(arena.is_empty());
        assert_eq!(arena.cursor(), 0);
        assert_eq!(arena.capacity(), 16);
        assert_eq!(arena.remaining(), 16);
    }
}
