use std::os::fd::RawFd;
use std::time::Duration;

use tracing::trace;

use crate::error::{Result, TransportError};

/// Readiness condition for a registered descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    /// Data can be read (`POLLIN`).
    Readable,
    /// Exceptional condition, as raised by sysfs GPIO value files (`POLLPRI`).
    Priority,
    /// Room to write (`POLLOUT`).
    Writable,
}

impl Interest {
    fn events(self) -> libc::c_short {
        match self {
            Interest::Readable => libc::POLLIN,
            Interest::Priority => libc::POLLPRI | libc::POLLERR,
            Interest::Writable => libc::POLLOUT,
        }
    }
}

/// Token returned by [`PollSet::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token(usize);

/// A one-shot set of descriptors for a single `poll(2)` call.
#[derive(Default)]
pub struct PollSet {
    fds: Vec<libc::pollfd>,
}

impl std::fmt::Debug for PollSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fds: Vec<RawFd> = self.fds.iter().map(|pfd| pfd.fd).collect();
        f.debug_struct("PollSet").field("fds", &fds).finish()
    }
}

impl PollSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, fd: RawFd, interest: Interest) -> Token {
        self.fds.push(libc::pollfd {
            fd,
            events: interest.events(),
            revents: 0,
        });
        Token(self.fds.len() - 1)
    }

    pub fn is_empty(&self) -> bool {
        self.fds.is_empty()
    }

    /// Wait until a registered descriptor is ready or `timeout` expires.
    ///
    /// Returns the number of ready descriptors; `0` on timeout or when a
    /// signal interrupted the wait. With nothing registered this just sleeps.
    pub fn wait(&mut self, timeout: Duration) -> Result<usize> {
        for pfd in &mut self.fds {
            pfd.revents = 0;
        }

        // SAFETY: `fds` points to `len` initialized pollfd structures that stay
        // alive and unaliased for the duration of the call.
        let rc = unsafe {
            libc::poll(
                self.fds.as_mut_ptr(),
                self.fds.len() as libc::nfds_t,
                timeout_millis(timeout),
            )
        };

        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                trace!("poll interrupted by signal");
                return Ok(0);
            }
            return Err(TransportError::Io(err));
        }

        Ok(rc as usize)
    }

    /// Whether the descriptor behind `token` reported any event.
    ///
    /// Hang-up and error conditions count as ready so the following read
    /// surfaces them.
    pub fn is_ready(&self, token: Token) -> bool {
        self.fds.get(token.0).is_some_and(|pfd| pfd.revents != 0)
    }
}

/// Convert to poll milliseconds, rounding sub-millisecond waits up.
fn timeout_millis(timeout: Duration) -> libc::c_int {
    let mut millis = timeout.as_millis();
    if timeout.subsec_nanos() % 1_000_000 != 0 {
        millis += 1;
    }
    millis.min(libc::c_int::MAX as u128) as libc::c_int
}
