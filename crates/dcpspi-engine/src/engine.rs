use std::io::{Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::time::{Duration, Instant};

use dcpspi_frame::{
    parse_command_header, write_sync_frame, CommandHeader, FramingError, Origin, SerialGenerator,
    SyncHeader, COMMAND_HEADER_SIZE,
};
use dcpspi_transport::{
    read_some, write_fully, write_fully_within, RequestLine, SerialBus, TransportError, WaitHandle,
};
use tracing::{debug, error, info, trace, warn};

use crate::config::EngineConfig;
use crate::error::{Result, TransactionError};
use crate::transaction::{Direction, Transaction, TransactionState};

const BUS: &str = "serial bus";
const INBOUND: &str = "inbound host channel";
const OUTBOUND: &str = "outbound host channel";

/// Which waited-on handles fired before a step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    pub request_line: bool,
    pub inbound: bool,
}

/// Result of a single engine step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// A transition happened (or nothing was ready); keep stepping.
    Continue,
    /// A transaction finished and the engine is idle again.
    Completed(Origin),
    /// A transaction was dropped; the engine is idle again.
    Aborted(TransactionError),
    /// The host closed the inbound channel while nothing was in flight.
    Stop,
}

/// What the event loop should wait for before the next step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPlan {
    /// Step again right away.
    Immediate,
    /// Wait for any of the handles, at most `timeout`.
    Poll {
        request_line: Option<WaitHandle>,
        inbound: RawFd,
        timeout: Duration,
    },
}

/// Edge detection state for the request line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestLineState {
    pub previous_level: bool,
    /// A rising edge was seen and no slave transaction has started for it yet.
    pub pending: bool,
}

/// Counters reported at shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub slave_transactions: u64,
    pub master_transactions: u64,
    pub framing_errors: u64,
    pub timeouts: u64,
}

enum StepError {
    Transaction(TransactionError),
    Transport(TransportError),
}

impl From<TransactionError> for StepError {
    fn from(err: TransactionError) -> Self {
        StepError::Transaction(err)
    }
}

impl From<FramingError> for StepError {
    fn from(err: FramingError) -> Self {
        StepError::Transaction(TransactionError::Framing(err))
    }
}

impl From<TransportError> for StepError {
    fn from(err: TransportError) -> Self {
        StepError::Transport(err)
    }
}

type StepResult<T = StepOutcome> = std::result::Result<T, StepError>;

/// The transaction state machine.
///
/// Moves one DCP command frame at a time between the SPI bus (`bus`) and the
/// host channels (`inbound`, `outbound`), with the slave requesting
/// transactions through `line`. Transactions never overlap: a slave request
/// seen while a master transaction is in flight is remembered until the
/// engine is idle, and inbound host data is left unread during slave
/// transactions. When both sides want to start in the same step, the slave
/// goes first.
pub struct Engine<B, L, I, O> {
    bus: B,
    line: L,
    inbound: I,
    outbound: O,
    transaction: Transaction,
    serials: SerialGenerator,
    line_state: RequestLineState,
    config: EngineConfig,
    stats: EngineStats,
}

impl<B, L, I, O> Engine<B, L, I, O>
where
    B: SerialBus,
    L: RequestLine,
    I: Read + AsRawFd,
    O: Write + AsRawFd,
{
    /// Create an engine with default-sized transaction buffers.
    pub fn new(bus: B, line: L, inbound: I, outbound: O, config: EngineConfig) -> Result<Self> {
        Self::with_transaction(bus, line, inbound, outbound, config, Transaction::new())
    }

    /// Create an engine over an explicitly provided transaction.
    pub fn with_transaction(
        bus: B,
        mut line: L,
        inbound: I,
        outbound: O,
        config: EngineConfig,
        mut transaction: Transaction,
    ) -> Result<Self> {
        let previous_level = line.current_level()?;
        transaction.reset();

        debug!(bus = bus.label(), previous_level, "transaction engine ready");

        Ok(Self {
            bus,
            line,
            inbound,
            outbound,
            transaction,
            serials: SerialGenerator::new(),
            line_state: RequestLineState {
                previous_level,
                pending: false,
            },
            config,
            stats: EngineStats::default(),
        })
    }

    /// Decide what to wait for before the next step.
    pub fn wait_plan(&self, now: Instant) -> WaitPlan {
        let state = self.transaction.state;
        if state.is_bus_driven() || (state == TransactionState::Idle && self.line_state.pending) {
            return WaitPlan::Immediate;
        }

        let mut timeout = self.config.poll_interval;
        if let Some(deadline) = self.transaction.deadline {
            timeout = timeout.min(deadline.saturating_duration_since(now));
        }

        WaitPlan::Poll {
            request_line: self.line.wait_handle(),
            inbound: self.inbound.as_raw_fd(),
            timeout,
        }
    }

    /// Advance the state machine by one transition.
    ///
    /// Transaction-local failures come back as [`StepOutcome::Aborted`];
    /// only transport failures are returned as errors.
    pub fn step(&mut self, readiness: Readiness, now: Instant) -> Result<StepOutcome> {
        self.sample_request_line()?;

        let state = self.transaction.state;
        trace!(%state, ?readiness, "step");

        let result = match state {
            TransactionState::Idle => self.start_transaction(readiness),
            TransactionState::SlaveHeader => self.read_slave_header(now),
            TransactionState::SlavePayload => self.read_slave_payload(),
            TransactionState::SlaveAwaitingHostAnswer => self.await_host_answer(readiness, now),
            TransactionState::SlaveAnswerToBus => self.send_to_bus(Origin::Slave),
            TransactionState::MasterHeader => self.read_master_header(readiness),
            TransactionState::MasterPayload => self.read_master_payload(readiness),
            TransactionState::MasterToBus => self.send_to_bus(Origin::Master),
        };

        match result {
            Ok(outcome) => Ok(outcome),
            Err(StepError::Transaction(err)) => {
                match err {
                    TransactionError::Framing(_) => self.stats.framing_errors += 1,
                    TransactionError::Timeout(_) => self.stats.timeouts += 1,
                }
                warn!(%state, error = %err, "transaction aborted");
                self.transaction.reset();
                Ok(StepOutcome::Aborted(err))
            }
            Err(StepError::Transport(err)) => {
                error!(%state, error = %err, "transport failure");
                Err(err.into())
            }
        }
    }

    fn sample_request_line(&mut self) -> Result<()> {
        let level = self.line.current_level()?;
        if level && !self.line_state.previous_level && !self.line_state.pending {
            trace!("slave request edge");
            self.line_state.pending = true;
        }
        self.line_state.previous_level = level;
        Ok(())
    }

    fn start_transaction(&mut self, readiness: Readiness) -> StepResult {
        if self.line_state.pending {
            self.line_state.pending = false;
            self.transaction
                .begin(Direction::SlaveInitiated, TransactionState::SlaveHeader);
            debug!("slave transaction started");
        } else if readiness.inbound {
            self.transaction
                .begin(Direction::MasterInitiated, TransactionState::MasterHeader);
            debug!("master transaction started");
        }
        Ok(StepOutcome::Continue)
    }

    fn read_slave_header(&mut self, now: Instant) -> StepResult {
        self.fill_from_bus(COMMAND_HEADER_SIZE)?;
        let header = parse_command_header(self.transaction.dcp_buffer.filled())?;
        debug!(
            command = %header.command,
            register = header.register,
            len = header.payload_len,
            "slave command"
        );

        if header.command.is_write() {
            if header.following_len() > 0 {
                self.transaction.state = TransactionState::SlavePayload;
                return Ok(StepOutcome::Continue);
            }
            self.forward_to_host()?;
            return Ok(self.finish(Origin::Slave));
        }

        self.forward_to_host()?;
        self.transaction.request = Some(header);
        self.transaction.dcp_buffer.reset();
        self.transaction.deadline = Some(now + self.config.answer_timeout);
        self.transaction.state = TransactionState::SlaveAwaitingHostAnswer;
        Ok(StepOutcome::Continue)
    }

    fn read_slave_payload(&mut self) -> StepResult {
        let header = parse_command_header(self.transaction.dcp_buffer.filled())?;
        self.fill_from_bus(header.frame_len())?;
        self.forward_to_host()?;
        Ok(self.finish(Origin::Slave))
    }

    fn await_host_answer(&mut self, readiness: Readiness, now: Instant) -> StepResult {
        if readiness.inbound {
            let target = match self.buffered_header()? {
                Some(header) => header.frame_len(),
                None => COMMAND_HEADER_SIZE,
            };

            match self.read_inbound(target)? {
                None => {}
                Some(0) => return Err(TransportError::Closed(INBOUND).into()),
                Some(_) => {
                    if let Some(header) = self.buffered_header()? {
                        if self.transaction.dcp_buffer.len() == header.frame_len() {
                            debug!(
                                request = ?self.transaction.request,
                                len = header.frame_len(),
                                "host answer complete"
                            );
                            self.transaction.deadline = None;
                            self.transaction.state = TransactionState::SlaveAnswerToBus;
                            return Ok(StepOutcome::Continue);
                        }
                    }
                }
            }
        }

        match self.transaction.deadline {
            Some(deadline) if now >= deadline => {
                Err(TransactionError::Timeout(self.config.answer_timeout).into())
            }
            _ => Ok(StepOutcome::Continue),
        }
    }

    fn read_master_header(&mut self, readiness: Readiness) -> StepResult {
        if !readiness.inbound {
            return Ok(StepOutcome::Continue);
        }

        match self.read_inbound(COMMAND_HEADER_SIZE)? {
            None => return Ok(StepOutcome::Continue),
            Some(0) if self.transaction.dcp_buffer.is_empty() => {
                info!("inbound host channel closed");
                self.transaction.reset();
                return Ok(StepOutcome::Stop);
            }
            Some(0) => return Err(TransportError::Closed(INBOUND).into()),
            Some(_) => {}
        }

        let Some(header) = self.buffered_header()? else {
            return Ok(StepOutcome::Continue);
        };
        if header.command.is_read() {
            return Err(FramingError::UnexpectedCommand(header.command).into());
        }

        debug!(
            command = %header.command,
            register = header.register,
            len = header.payload_len,
            "master command"
        );
        self.transaction.state = if header.following_len() > 0 {
            TransactionState::MasterPayload
        } else {
            TransactionState::MasterToBus
        };
        Ok(StepOutcome::Continue)
    }

    fn read_master_payload(&mut self, readiness: Readiness) -> StepResult {
        if !readiness.inbound {
            return Ok(StepOutcome::Continue);
        }

        let header = parse_command_header(self.transaction.dcp_buffer.filled())?;
        match self.read_inbound(header.frame_len())? {
            None => {}
            Some(0) => return Err(TransportError::Closed(INBOUND).into()),
            Some(_) => {
                if self.transaction.dcp_buffer.len() == header.frame_len() {
                    self.transaction.state = TransactionState::MasterToBus;
                }
            }
        }
        Ok(StepOutcome::Continue)
    }

    fn send_to_bus(&mut self, origin: Origin) -> StepResult {
        let Self {
            bus,
            transaction,
            serials,
            ..
        } = self;

        let raw = transaction.dcp_buffer.filled();
        let header = SyncHeader::next(serials, origin, raw.len())?;
        transaction.spi_buffer.reset();
        write_sync_frame(header, raw, &mut transaction.spi_buffer)?;
        write_fully(bus, transaction.spi_buffer.filled(), BUS)?;

        debug!(
            serial = format_args!("0x{:04x}", header.serial),
            len = header.length,
            wire = transaction.spi_buffer.len(),
            "frame sent to slave"
        );
        Ok(self.finish(origin))
    }

    /// Clock in and unescape bus bytes until `target` raw bytes are buffered.
    ///
    /// Never requests more wire bytes than raw bytes are missing, so the
    /// next frame on the bus stays untouched.
    fn fill_from_bus(&mut self, target: usize) -> StepResult<()> {
        let Self {
            bus, transaction, ..
        } = self;

        while transaction.dcp_buffer.len() < target {
            let want = target - transaction.dcp_buffer.len();
            transaction.spi_buffer.reset();
            let read = read_some(bus, transaction.spi_buffer.spare_mut(want)?)?.unwrap_or(0);
            transaction.spi_buffer.commit(read);

            if read == 0 {
                transaction.unescaper.finish()?;
                return Err(FramingError::Truncated {
                    needed: target,
                    available: transaction.dcp_buffer.len(),
                }
                .into());
            }

            while let Some(byte) = transaction.spi_buffer.next_unread() {
                if let Some(raw) = transaction.unescaper.feed(byte)? {
                    transaction.dcp_buffer.push(raw)?;
                }
            }
        }
        Ok(())
    }

    /// One read from the inbound channel, never past `target` buffered bytes.
    fn read_inbound(&mut self, target: usize) -> StepResult<Option<usize>> {
        let missing = target.saturating_sub(self.transaction.dcp_buffer.len());
        let spare = self.transaction.dcp_buffer.spare_mut(missing)?;
        let read = read_some(&mut self.inbound, spare)?;
        if let Some(n) = read {
            self.transaction.dcp_buffer.commit(n);
        }
        Ok(read)
    }

    /// Header of the frame in `dcp_buffer`, once its 4 bytes are there.
    fn buffered_header(&self) -> StepResult<Option<CommandHeader>> {
        let buffered = self.transaction.dcp_buffer.filled();
        if buffered.len() < COMMAND_HEADER_SIZE {
            return Ok(None);
        }
        Ok(Some(parse_command_header(buffered)?))
    }

    fn forward_to_host(&mut self) -> StepResult<()> {
        let raw = self.transaction.dcp_buffer.filled();
        write_fully_within(&mut self.outbound, raw, OUTBOUND, self.config.write_timeout)?;
        trace!(len = raw.len(), "forwarded to host");
        Ok(())
    }

    fn finish(&mut self, origin: Origin) -> StepOutcome {
        match origin {
            Origin::Slave => self.stats.slave_transactions += 1,
            Origin::Master => self.stats.master_transactions += 1,
        }
        self.transaction.reset();
        StepOutcome::Completed(origin)
    }

    pub fn state(&self) -> TransactionState {
        self.transaction.state
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn line_state(&self) -> RequestLineState {
        self.line_state
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[cfg(test)]
    pub(crate) fn bus(&self) -> &B {
        &self.bus
    }

    #[cfg(test)]
    pub(crate) fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    #[cfg(test)]
    pub(crate) fn line_mut(&mut self) -> &mut L {
        &mut self.line
    }
}
