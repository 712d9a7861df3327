//! DCP-over-SPI bridge.
//!
//! dcpspi moves DCP command frames between two named pipes on the host side
//! and an SPI slave that requests transactions through a GPIO line.
//!
//! # Crate Structure
//!
//! - [`transport`] — SPI device, sysfs GPIO, named pipes, `poll(2)` and dummy stand-ins
//! - [`frame`] — escape codec, command and synchronization headers, byte arenas
//! - [`engine`] — transaction state machine and event loop

/// Re-export transport types.
pub mod transport {
    pub use dcpspi_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use dcpspi_frame::*;
}

/// Re-export engine types.
pub mod engine {
    pub use dcpspi_engine::*;
}
