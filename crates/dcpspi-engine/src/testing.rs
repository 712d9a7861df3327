//! In-memory bus and request line for engine tests.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dcpspi_transport::{Interest, RequestLine, SerialBus, WaitHandle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusOp {
    Read(Vec<u8>),
    Write(Vec<u8>),
}

/// Bus replaying queued slave bytes and recording every transfer.
#[derive(Debug, Default)]
pub struct ScriptedBus {
    pub incoming: VecDeque<u8>,
    pub log: Vec<BusOp>,
}

impl ScriptedBus {
    /// Queue wire bytes for the engine to clock in.
    pub fn feed(&mut self, wire: &[u8]) {
        self.incoming.extend(wire.iter().copied());
    }

    /// Everything written to the bus, one entry per write.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.log
            .iter()
            .filter_map(|op| match op {
                BusOp::Write(bytes) => Some(bytes.clone()),
                BusOp::Read(_) => None,
            })
            .collect()
    }
}

impl Read for ScriptedBus {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = buf.len().min(self.incoming.len());
        for (slot, byte) in buf.iter_mut().zip(self.incoming.drain(..n)) {
            *slot = byte;
        }
        if n > 0 {
            self.log.push(BusOp::Read(buf[..n].to_vec()));
        }
        Ok(n)
    }
}

impl Write for ScriptedBus {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.log.push(BusOp::Write(buf.to_vec()));
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl SerialBus for ScriptedBus {
    fn label(&self) -> &str {
        "scripted"
    }
}

/// Request line whose level the test sets directly.
#[derive(Debug, Default)]
pub struct ScriptedLine {
    pub level: bool,
}

impl RequestLine for ScriptedLine {
    fn current_level(&mut self) -> std::io::Result<bool> {
        Ok(self.level)
    }

    fn wait_handle(&self) -> Option<WaitHandle> {
        None
    }
}

/// Request line with a real pollable descriptor, raised from another thread.
///
/// The descriptor turns readable when the line is raised, the way a sysfs
/// value file reports an edge.
#[derive(Debug)]
pub struct SignalledLine {
    level: Arc<AtomicBool>,
    wake: UnixStream,
}

/// The raising side of a [`SignalledLine`].
#[derive(Debug)]
pub struct LineTrigger {
    level: Arc<AtomicBool>,
    wake: UnixStream,
}

impl SignalledLine {
    pub fn new() -> (Self, LineTrigger) {
        let (wake, trigger_end) = UnixStream::pair().expect("socket pair");
        let level = Arc::new(AtomicBool::new(false));
        (
            Self {
                level: level.clone(),
                wake,
            },
            LineTrigger {
                level,
                wake: trigger_end,
            },
        )
    }
}

impl LineTrigger {
    pub fn raise(&mut self) {
        self.level.store(true, Ordering::SeqCst);
        self.wake.write_all(b"1").expect("wake byte");
    }
}

impl RequestLine for SignalledLine {
    fn current_level(&mut self) -> std::io::Result<bool> {
        Ok(self.level.load(Ordering::SeqCst))
    }

    fn wait_handle(&self) -> Option<WaitHandle> {
        Some(WaitHandle {
            fd: self.wake.as_raw_fd(),
            interest: Interest::Readable,
        })
    }
}
