use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::poll::Interest;
use crate::traits::{RequestLine, WaitHandle};

/// Default sysfs GPIO root.
pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// Consecutive equal samples required for a debounced level.
const DEBOUNCE_STABLE_SAMPLES: u32 = 3;
/// Upper bound on samples per debounced read.
const DEBOUNCE_MAX_SAMPLES: u32 = 64;
const DEBOUNCE_INTERVAL: Duration = Duration::from_micros(50);

/// Request line on a sysfs GPIO input.
///
/// The pin is exported (unless it already is), configured as input with
/// interrupts on both edges, and unexported again on drop if this process
/// exported it. Level changes wake `poll(2)` with `POLLPRI`.
pub struct SysfsGpio {
    number: u32,
    root: PathBuf,
    value: File,
    exported_here: bool,
    debounce: bool,
}

impl SysfsGpio {
    /// Open GPIO `number` below [`SYSFS_GPIO_ROOT`].
    pub fn open(number: u32) -> Result<Self> {
        Self::open_in(SYSFS_GPIO_ROOT, number)
    }

    /// Open GPIO `number` below an explicit sysfs root.
    pub fn open_in(root: impl AsRef<Path>, number: u32) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let pin_dir = root.join(format!("gpio{number}"));

        let exported_here = if pin_dir.exists() {
            false
        } else {
            write_attr(&root.join("export"), &number.to_string())?;
            true
        };

        let value = match configure_input(&pin_dir) {
            Ok(value) => value,
            Err(err) => {
                if exported_here {
                    unexport(&root, number);
                }
                return Err(err);
            }
        };

        info!(gpio = number, "opened request line");

        Ok(Self {
            number,
            root,
            value,
            exported_here,
            debounce: false,
        })
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    fn sample(&mut self) -> std::io::Result<bool> {
        self.value.seek(SeekFrom::Start(0))?;
        let mut buf = [0u8; 2];
        let n = self.value.read(&mut buf)?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "empty GPIO value",
            ));
        }
        Ok(buf[0] == b'1')
    }

    fn sample_debounced(&mut self) -> std::io::Result<bool> {
        let mut level = self.sample()?;
        let mut stable = 1;

        for _ in 1..DEBOUNCE_MAX_SAMPLES {
            if stable >= DEBOUNCE_STABLE_SAMPLES {
                return Ok(level);
            }
            std::thread::sleep(DEBOUNCE_INTERVAL);
            let next = self.sample()?;
            if next == level {
                stable += 1;
            } else {
                level = next;
                stable = 1;
            }
        }

        warn!(gpio = self.number, "request line did not settle");
        Ok(level)
    }
}

/// Input with interrupts on both edges; returns the open value file.
fn configure_input(pin_dir: &Path) -> Result<File> {
    write_attr(&pin_dir.join("direction"), "in")?;
    write_attr(&pin_dir.join("edge"), "both")?;

    let value_path = pin_dir.join("value");
    OpenOptions::new()
        .read(true)
        .open(&value_path)
        .map_err(|source| TransportError::Open {
            path: value_path,
            source,
        })
}

fn unexport(root: &Path, number: u32) {
    debug!(gpio = number, "unexporting request line");
    let _ = std::fs::write(root.join("unexport"), number.to_string());
}

fn write_attr(path: &Path, value: &str) -> Result<()> {
    std::fs::write(path, value).map_err(|source| TransportError::Configure {
        path: path.to_path_buf(),
        source,
    })
}

impl RequestLine for SysfsGpio {
    fn current_level(&mut self) -> std::io::Result<bool> {
        if self.debounce {
            self.sample_debounced()
        } else {
            self.sample()
        }
    }

    fn wait_handle(&self) -> Option<WaitHandle> {
        Some(WaitHandle {
            fd: self.value.as_raw_fd(),
            interest: Interest::Priority,
        })
    }

    fn enable_debouncing(&mut self) {
        debug!(gpio = self.number, "software debouncing enabled");
        self.debounce = true;
    }
}

impl Drop for SysfsGpio {
    fn drop(&mut self) {
        if self.exported_here {
            unexport(&self.root, self.number);
        }
    }
}

impl std::fmt::Debug for SysfsGpio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SysfsGpio")
            .field("number", &self.number)
            .field("debounce", &self.debounce)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_sysfs(tag: &str, number: u32, value: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!("dcpspi-gpio-{tag}-{}", std::process::id()));
        let pin = root.join(format!("gpio{number}"));
        std::fs::create_dir_all(&pin).unwrap();
        std::fs::write(pin.join("value"), value).unwrap();
        root
    }

    #[test]
    fn configures_pin_and_reads_level() {
        let root = fake_sysfs("level", 4, "0\n");
        let mut gpio = SysfsGpio::open_in(&root, 4).unwrap();

        assert_eq!(
            std::fs::read_to_string(root.join("gpio4/direction")).unwrap(),
            "in"
        );
        assert_eq!(std::fs::read_to_string(root.join("gpio4/edge")).unwrap(), "both");
        assert!(!gpio.current_level().unwrap());

        std::fs::write(root.join("gpio4/value"), "1\n").unwrap();
        assert!(gpio.current_level().unwrap());

        let handle = gpio.wait_handle().unwrap();
        assert_eq!(handle.interest, Interest::Priority);

        drop(gpio);
        assert!(
            !root.join("unexport").exists(),
            "pre-exported pin must stay exported"
        );
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn debounced_read_of_stable_level() {
        let root = fake_sysfs("debounce", 17, "1\n");
        let mut gpio = SysfsGpio::open_in(&root, 17).unwrap();
        gpio.enable_debouncing();

        assert!(gpio.current_level().unwrap());

        drop(gpio);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn failed_setup_unexports_pin_it_exported() {
        let root =
            std::env::temp_dir().join(format!("dcpspi-gpio-unwind-{}", std::process::id()));
        std::fs::create_dir_all(&root).unwrap();

        // The fake sysfs never creates gpio9/, so configuring it fails.
        let result = SysfsGpio::open_in(&root, 9);
        assert!(matches!(result, Err(TransportError::Configure { .. })));
        assert_eq!(std::fs::read_to_string(root.join("export")).unwrap(), "9");
        assert_eq!(
            std::fs::read_to_string(root.join("unexport")).unwrap(),
            "9",
            "pin exported during a failed setup must be unexported"
        );

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn failed_setup_leaves_foreign_export_alone() {
        let root = fake_sysfs("foreign", 5, "0\n");
        std::fs::remove_file(root.join("gpio5/value")).unwrap();

        let result = SysfsGpio::open_in(&root, 5);
        assert!(matches!(result, Err(TransportError::Open { .. })));
        assert!(!root.join("unexport").exists());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn exported_pin_is_unexported_on_drop() {
        let root = fake_sysfs("drop", 6, "0\n");
        let gpio = SysfsGpio {
            number: 6,
            root: root.clone(),
            value: File::open(root.join("gpio6/value")).unwrap(),
            exported_here: true,
            debounce: false,
        };

        drop(gpio);
        assert_eq!(std::fs::read_to_string(root.join("unexport")).unwrap(), "6");
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn missing_root_is_a_configure_error() {
        let result = SysfsGpio::open_in("/nonexistent-dcpspi-sysfs", 4);
        assert!(matches!(result, Err(TransportError::Configure { .. })));
    }
}
