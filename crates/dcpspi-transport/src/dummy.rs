//! Stand-ins used when no hardware is attached.

use std::io::{Read, Write};

use tracing::trace;

use crate::traits::{RequestLine, SerialBus, WaitHandle};

/// Bus without a slave: reads yield nothing, writes are discarded.
#[derive(Debug, Default)]
pub struct DummyBus;

impl Read for DummyBus {
    fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
        Ok(0)
    }
}

impl Write for DummyBus {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        trace!(len = buf.len(), "dummy bus discarding bytes");
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl SerialBus for DummyBus {
    fn label(&self) -> &str {
        "dummy"
    }
}

/// Request line that is never raised.
#[derive(Debug, Default)]
pub struct InactiveLine;

impl RequestLine for InactiveLine {
    fn current_level(&mut self) -> std::io::Result<bool> {
        Ok(false)
    }

    fn wait_handle(&self) -> Option<WaitHandle> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dummy_bus_swallows_writes() {
        let mut bus = DummyBus;
        assert_eq!(bus.write(b"\x63\x00\x01\x80\x04\x00").unwrap(), 6);
        let mut buf = [0u8; 4];
        assert_eq!(bus.read(&mut buf).unwrap(), 0);
        assert_eq!(bus.label(), "dummy");
    }

    #[test]
    fn inactive_line_stays_low() {
        let mut line = InactiveLine;
        line.enable_debouncing();
        assert!(!line.current_level().unwrap());
        assert!(line.wait_handle().is_none());
    }
}
