use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// Named pipe connecting the daemon to the host process.
///
/// The pipe is created if missing and opened read-write, so the daemon
/// never sees end of stream while the host reconnects. The path is removed
/// again on drop, unless something else replaced it in the meantime.
pub struct NamedPipe {
    file: File,
    path: PathBuf,
    created_inode: (u64, u64),
}

impl NamedPipe {
    /// Default permission mode for created pipes.
    pub const DEFAULT_FIFO_MODE: u32 = 0o660;

    /// Create (if needed) and open the pipe at `path`.
    pub fn create_and_open(path: impl AsRef<Path>) -> Result<Self> {
        Self::create_and_open_with_mode(path, Self::DEFAULT_FIFO_MODE)
    }

    /// Create (if needed) and open the pipe at `path` with explicit mode.
    pub fn create_and_open_with_mode(path: impl AsRef<Path>, mode: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        match std::fs::symlink_metadata(&path) {
            Ok(metadata) if metadata.file_type().is_fifo() => {
                debug!(?path, "reusing existing named pipe");
            }
            Ok(_) => return Err(TransportError::NotAFifo { path }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => mkfifo(&path, mode)?,
            Err(source) => return Err(TransportError::CreateFifo { path, source }),
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| TransportError::Open {
                path: path.clone(),
                source,
            })?;

        let metadata = file.metadata().map_err(|source| TransportError::Open {
            path: path.clone(),
            source,
        })?;

        info!(?path, "opened named pipe");

        Ok(Self {
            file,
            path,
            created_inode: (metadata.dev(), metadata.ino()),
        })
    }

    /// The path this pipe lives at.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn mkfifo(path: &Path, mode: u32) -> Result<()> {
    let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| {
        TransportError::CreateFifo {
            path: path.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "path contains an interior NUL byte",
            ),
        }
    })?;

    // SAFETY: `c_path` is a valid NUL-terminated string for the duration of the call.
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), mode as libc::mode_t) };
    if rc != 0 {
        return Err(TransportError::CreateFifo {
            path: path.to_path_buf(),
            source: std::io::Error::last_os_error(),
        });
    }

    // mkfifo(3) applies the umask.
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(|source| {
        let _ = std::fs::remove_file(path);
        TransportError::CreateFifo {
            path: path.to_path_buf(),
            source,
        }
    })?;

    debug!(?path, mode = format_args!("{mode:o}"), "created named pipe");
    Ok(())
}

impl Read for NamedPipe {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for NamedPipe {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

impl AsFd for NamedPipe {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl AsRawFd for NamedPipe {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl Drop for NamedPipe {
    fn drop(&mut self) {
        let (expected_dev, expected_ino) = self.created_inode;
        if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
            if metadata.file_type().is_fifo()
                && metadata.dev() == expected_dev
                && metadata.ino() == expected_ino
            {
                debug!(path = ?self.path, "removing named pipe");
                let _ = std::fs::remove_file(&self.path);
            } else {
                debug!(
                    path = ?self.path,
                    "named pipe identity changed; skipping cleanup"
                );
            }
        }
    }
}

impl std::fmt::Debug for NamedPipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedPipe")
            .field("path", &self.path)
            .field("fd", &self.file.as_raw_fd())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("dcpspi-fifo-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn create_write_read_and_cleanup() {
        let dir = unique_temp_dir("roundtrip");
        let path = dir.join("pipe");

        let mut pipe = NamedPipe::create_and_open(&path).unwrap();
        let metadata = std::fs::symlink_metadata(&path).unwrap();
        assert!(metadata.file_type().is_fifo());
        let mode = metadata.permissions().mode() & 0o777;
        assert_eq!(mode, NamedPipe::DEFAULT_FIFO_MODE, "created fifo mode is {mode:o}");

        // Another opener plays the host side.
        let mut host = OpenOptions::new().write(true).open(&path).unwrap();
        host.write_all(b"\x00\x10\x00\x00").unwrap();

        let mut buf = [0u8; 4];
        pipe.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [0x00, 0x10, 0x00, 0x00]);

        drop(host);
        drop(pipe);
        assert!(!path.exists(), "pipe should be removed on drop");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn reuses_existing_fifo() {
        let dir = unique_temp_dir("reuse");
        let path = dir.join("pipe");

        mkfifo(&path, 0o600).unwrap();
        let pipe = NamedPipe::create_and_open(&path).unwrap();
        assert_eq!(pipe.path(), path.as_path());

        drop(pipe);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn created_mode_ignores_restrictive_umask() {
        let dir = unique_temp_dir("umask");
        let path = dir.join("pipe");

        // SAFETY: umask only swaps the process file mode mask.
        let previous = unsafe { libc::umask(0o027) };
        let result = NamedPipe::create_and_open(&path);
        unsafe { libc::umask(previous) };

        let pipe = result.unwrap();
        let mode = std::fs::symlink_metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o660, "created fifo mode is {mode:o}");

        drop(pipe);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn explicit_mode_is_applied_exactly() {
        let dir = unique_temp_dir("mode");
        let path = dir.join("pipe");

        let pipe = NamedPipe::create_and_open_with_mode(&path, 0o666).unwrap();
        let mode = std::fs::symlink_metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o666);

        drop(pipe);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn rejects_existing_regular_file() {
        let dir = unique_temp_dir("regular");
        let path = dir.join("not-a-pipe");
        std::fs::write(&path, b"regular-file").unwrap();

        let result = NamedPipe::create_and_open(&path);
        assert!(matches!(result, Err(TransportError::NotAFifo { .. })));
        assert!(path.exists(), "regular file must survive");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn drop_does_not_remove_replaced_path() {
        let dir = unique_temp_dir("replaced");
        let path = dir.join("pipe");

        let pipe = NamedPipe::create_and_open(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        std::fs::write(&path, b"replacement-file").unwrap();

        drop(pipe);
        assert!(path.exists(), "drop must not remove a replaced path");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_parent_directory_is_reported() {
        let result = NamedPipe::create_and_open("/nonexistent-dcpspi-dir/pipe");
        assert!(matches!(result, Err(TransportError::CreateFifo { .. })));
    }
}
