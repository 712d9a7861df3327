use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::time::Instant;

use dcpspi_transport::{Interest, PollSet, RequestLine, SerialBus};
use tracing::{debug, info};

use crate::engine::{Engine, EngineStats, Readiness, StepOutcome, WaitPlan};
use crate::error::Result;
use crate::shutdown::ShutdownSignal;

/// Why [`EventLoop::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Shutdown was requested through the [`ShutdownSignal`].
    Shutdown,
    /// The host closed the inbound channel.
    HostClosed,
}

/// Drives an [`Engine`] from a single `poll(2)` wait.
///
/// Each iteration waits on the request line and the inbound host channel
/// (or not at all while the engine has bus work), then runs one step.
/// The shutdown flag is checked between steps, so a wait never outlasts
/// the configured poll interval once shutdown was requested.
pub struct EventLoop<B, L, I, O> {
    engine: Engine<B, L, I, O>,
    shutdown: ShutdownSignal,
}

impl<B, L, I, O> EventLoop<B, L, I, O>
where
    B: SerialBus,
    L: RequestLine,
    I: Read + AsRawFd,
    O: Write + AsRawFd,
{
    pub fn new(engine: Engine<B, L, I, O>, shutdown: ShutdownSignal) -> Self {
        Self { engine, shutdown }
    }

    /// Wait for the next event (if needed) and advance the engine once.
    pub fn step(&mut self) -> Result<StepOutcome> {
        let readiness = match self.engine.wait_plan(Instant::now()) {
            WaitPlan::Immediate => Readiness::default(),
            WaitPlan::Poll {
                request_line,
                inbound,
                timeout,
            } => {
                let mut poll = PollSet::new();
                let line_token =
                    request_line.map(|handle| poll.register(handle.fd, handle.interest));
                let inbound_token = poll.register(inbound, Interest::Readable);

                poll.wait(timeout)?;

                Readiness {
                    request_line: line_token.is_some_and(|token| poll.is_ready(token)),
                    inbound: poll.is_ready(inbound_token),
                }
            }
        };

        self.engine.step(readiness, Instant::now())
    }

    /// Step until shutdown is requested, the host goes away or a transport
    /// fails.
    pub fn run(&mut self) -> Result<StopReason> {
        info!("Accepting traffic");

        let reason = loop {
            if self.shutdown.is_requested() {
                break StopReason::Shutdown;
            }
            match self.step()? {
                StepOutcome::Stop => break StopReason::HostClosed,
                StepOutcome::Completed(origin) => debug!(?origin, "transaction completed"),
                StepOutcome::Continue | StepOutcome::Aborted(_) => {}
            }
        };

        let stats = self.engine.stats();
        info!(
            ?reason,
            slave = stats.slave_transactions,
            master = stats.master_transactions,
            framing_errors = stats.framing_errors,
            timeouts = stats.timeouts,
            "event loop stopped"
        );
        Ok(reason)
    }

    pub fn stats(&self) -> EngineStats {
        self.engine.stats()
    }

    pub fn engine(&self) -> &Engine<B, L, I, O> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine<B, L, I, O> {
        &mut self.engine
    }
}
