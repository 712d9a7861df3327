//! Transports underneath the dcpspi transaction engine.
//!
//! - [`SerialBus`] — the master-clocked SPI bus towards the slave
//! - [`RequestLine`] — the slave's request input, pollable for level changes
//! - [`NamedPipe`] — the two host channels
//! - [`PollSet`] — the single `poll(2)` wait the event loop suspends in
//!
//! Dummy implementations stand in for the bus and the request line when
//! running without hardware.

pub mod dummy;
pub mod error;
pub mod fifo;
pub mod gpio;
pub mod poll;
pub mod spi;
pub mod traits;

pub use dummy::{DummyBus, InactiveLine};
pub use error::{Result, TransportError};
pub use fifo::NamedPipe;
pub use gpio::{SysfsGpio, SYSFS_GPIO_ROOT};
pub use poll::{Interest, PollSet, Token};
pub use spi::SpiDevice;
pub use traits::{read_some, write_fully, write_fully_within, RequestLine, SerialBus, WaitHandle};
