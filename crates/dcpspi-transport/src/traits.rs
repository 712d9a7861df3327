use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::time::{Duration, Instant};

use crate::error::{Result, TransportError};
use crate::poll::{Interest, PollSet};

/// The synchronous serial bus towards the slave device.
///
/// The master clocks every transfer, so reads never wait for the slave:
/// `read` returns the bytes clocked in, and `Ok(0)` when the slave has
/// nothing to send (or no hardware is attached).
pub trait SerialBus: Read + Write {
    /// Short name for diagnostics.
    fn label(&self) -> &str;
}

/// A pollable descriptor plus the readiness condition to wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitHandle {
    pub fd: RawFd,
    pub interest: Interest,
}

/// The digital line the slave raises to request a transaction.
///
/// Implementations report the instantaneous level only; edges are derived
/// by the caller from successive levels.
pub trait RequestLine {
    /// Current (optionally debounced) level; `true` means active.
    fn current_level(&mut self) -> std::io::Result<bool>;

    /// Descriptor that becomes ready when the level changes, if any.
    fn wait_handle(&self) -> Option<WaitHandle>;

    /// Filter short glitches out of subsequent level reads.
    fn enable_debouncing(&mut self) {}
}

/// Read whatever is available, retrying on `Interrupted`.
///
/// Returns `Ok(None)` if the read would block and `Ok(Some(0))` at end of
/// stream.
pub fn read_some<R: Read + ?Sized>(inner: &mut R, buf: &mut [u8]) -> Result<Option<usize>> {
    loop {
        match inner.read(buf) {
            Ok(n) => return Ok(Some(n)),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(None),
            Err(err) => return Err(TransportError::Io(err)),
        }
    }
}

/// Write all of `buf` and flush (blocking).
pub fn write_fully<W: Write + ?Sized>(inner: &mut W, buf: &[u8], what: &'static str) -> Result<()> {
    let mut offset = 0usize;
    while offset < buf.len() {
        match inner.write(&buf[offset..]) {
            Ok(0) => return Err(TransportError::Closed(what)),
            Ok(n) => offset += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
            Err(err) => return Err(TransportError::Io(err)),
        }
    }

    loop {
        match inner.flush() {
            Ok(()) => return Ok(()),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
            Err(err) => return Err(TransportError::Io(err)),
        }
    }
}

/// Write all of `buf` to a descriptor-backed sink, giving up after `timeout`.
///
/// Every write waits for `POLLOUT` first, so a reader that stopped draining
/// yields [`TransportError::WriteTimeout`] instead of a blocked caller.
pub fn write_fully_within<W: Write + AsRawFd + ?Sized>(
    inner: &mut W,
    buf: &[u8],
    what: &'static str,
    timeout: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    let mut offset = 0usize;

    while offset < buf.len() {
        let mut poll = PollSet::new();
        let token = poll.register(inner.as_raw_fd(), Interest::Writable);
        poll.wait(deadline.saturating_duration_since(Instant::now()))?;

        if !poll.is_ready(token) {
            if Instant::now() >= deadline {
                return Err(TransportError::WriteTimeout { what, timeout });
            }
            continue;
        }

        match inner.write(&buf[offset..]) {
            Ok(0) => return Err(TransportError::Closed(what)),
            Ok(n) => offset += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
            Err(err) => return Err(TransportError::Io(err)),
        }
    }

    loop {
        match inner.flush() {
            Ok(()) => return Ok(()),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(TransportError::Io(err)),
        }
    }
}
