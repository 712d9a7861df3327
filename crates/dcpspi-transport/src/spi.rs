use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{Result, TransportError};
use crate::traits::SerialBus;

/// `_IOW(SPI_IOC_MAGIC, 4, __u32)` with the asm-generic ioctl layout.
const SPI_IOC_WR_MAX_SPEED_HZ: u32 = 0x4004_6b04;

/// Linux `spidev` character device in half-duplex mode.
///
/// `read` clocks in as many bytes as requested, `write` clocks out the
/// given bytes.
pub struct SpiDevice {
    file: File,
    path: PathBuf,
}

impl SpiDevice {
    /// Open the spidev node at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| TransportError::Open {
                path: path.clone(),
                source,
            })?;

        info!(?path, "opened SPI device");
        Ok(Self { file, path })
    }

    /// Set the maximum bus clock. `0` keeps the driver default.
    pub fn set_speed_hz(&self, hz: u32) -> Result<()> {
        if hz == 0 {
            return Ok(());
        }

        // SAFETY: the ioctl reads one u32 through the pointer, which refers to
        // a live local for the duration of the call; the fd is owned by `file`.
        let rc = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                SPI_IOC_WR_MAX_SPEED_HZ as _,
                &hz as *const u32,
            )
        };
        if rc < 0 {
            return Err(TransportError::Configure {
                path: self.path.clone(),
                source: std::io::Error::last_os_error(),
            });
        }

        info!(path = ?self.path, hz, "set SPI clock");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Read for SpiDevice {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for SpiDevice {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

impl SerialBus for SpiDevice {
    fn label(&self) -> &str {
        "spidev"
    }
}

impl std::fmt::Debug for SpiDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpiDevice").field("path", &self.path).finish()
    }
}
