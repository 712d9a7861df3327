use std::fmt;
use std::time::Instant;

use dcpspi_frame::{ByteArena, CommandHeader, Unescaper, MAX_COMMAND_FRAME_SIZE, SYNC_HEADER_SIZE};

/// Capacity of the raw (host side) buffer.
pub const DCP_BUFFER_SIZE: usize = SYNC_HEADER_SIZE + MAX_COMMAND_FRAME_SIZE;

/// Capacity of the wire (bus side) buffer: a synchronization header plus a
/// command frame in which every byte needs escaping.
pub const SPI_BUFFER_SIZE: usize = SYNC_HEADER_SIZE + 2 * MAX_COMMAND_FRAME_SIZE;

/// Position of the engine inside a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    SlaveHeader,
    SlavePayload,
    SlaveAwaitingHostAnswer,
    SlaveAnswerToBus,
    MasterHeader,
    MasterPayload,
    MasterToBus,
}

impl TransactionState {
    /// States that only touch the master-clocked bus and never wait.
    pub fn is_bus_driven(self) -> bool {
        matches!(
            self,
            Self::SlaveHeader | Self::SlavePayload | Self::SlaveAnswerToBus | Self::MasterToBus
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::SlaveHeader => "slave-header",
            Self::SlavePayload => "slave-payload",
            Self::SlaveAwaitingHostAnswer => "slave-awaiting-host-answer",
            Self::SlaveAnswerToBus => "slave-answer-to-bus",
            Self::MasterHeader => "master-header",
            Self::MasterPayload => "master-payload",
            Self::MasterToBus => "master-to-bus",
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which side started the transaction in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    None,
    SlaveInitiated,
    MasterInitiated,
}

/// The single transaction owned by the engine.
///
/// `dcp_buffer` holds raw command frames (host side), `spi_buffer` holds
/// escaped bytes (bus side). Both are emptied between transactions.
#[derive(Debug)]
pub struct Transaction {
    pub(crate) dcp_buffer: ByteArena,
    pub(crate) spi_buffer: ByteArena,
    pub(crate) state: TransactionState,
    pub(crate) direction: Direction,
    /// Header of the slave read request being answered.
    pub(crate) request: Option<CommandHeader>,
    pub(crate) unescaper: Unescaper,
    pub(crate) deadline: Option<Instant>,
}

impl Transaction {
    /// Transaction with buffers sized for the largest legal frame.
    pub fn new() -> Self {
        Self::with_buffers(
            ByteArena::with_capacity(DCP_BUFFER_SIZE),
            ByteArena::with_capacity(SPI_BUFFER_SIZE),
        )
    }

    /// Transaction over caller-provided buffers.
    pub fn with_buffers(dcp_buffer: ByteArena, spi_buffer: ByteArena) -> Self {
        let mut transaction = Self {
            dcp_buffer,
            spi_buffer,
            state: TransactionState::Idle,
            direction: Direction::None,
            request: None,
            unescaper: Unescaper::new(),
            deadline: None,
        };
        transaction.reset();
        transaction
    }

    /// Drop everything and return to idle.
    pub fn reset(&mut self) {
        self.dcp_buffer.reset();
        self.spi_buffer.reset();
        self.state = TransactionState::Idle;
        self.direction = Direction::None;
        self.request = None;
        self.unescaper.reset();
        self.deadline = None;
    }

    pub(crate) fn begin(&mut self, direction: Direction, state: TransactionState) {
        self.reset();
        self.direction = direction;
        self.state = state;
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn is_idle(&self) -> bool {
        self.state == TransactionState::Idle
    }

    pub fn dcp_buffer(&self) -> &ByteArena {
        &self.dcp_buffer
    }

    pub fn spi_buffer(&self) -> &ByteArena {
        &self.spi_buffer
    }

    /// Deadline for the host's answer while awaiting one.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}
