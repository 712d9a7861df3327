//! Transaction engine for the DCP-over-SPI bridge.
//!
//! The [`Engine`] moves one command frame at a time between the SPI bus
//! and the two host channels. The slave asks for a transaction through
//! its request line; the host starts one by writing a command frame.
//! Transactions are strictly serialized, and the slave wins a tie.
//!
//! ```text
//!          request line            inbound channel
//!               │                        │
//!               ▼                        ▼
//!   ┌─────── Idle ─────────────────────────────────┐
//!   │ SlaveHeader → SlavePayload ──────────────────┤ (write)
//!   │      └─→ SlaveAwaitingHostAnswer             │ (read)
//!   │               └─→ SlaveAnswerToBus ──────────┤
//!   │ MasterHeader → MasterPayload → MasterToBus ──┘
//!   └──────────────────────────────────────────────
//! ```
//!
//! [`EventLoop`] drives the engine from a single `poll(2)` wait and stops
//! on a [`ShutdownSignal`].

pub mod config;
pub mod engine;
pub mod error;
pub mod event_loop;
pub mod shutdown;
pub mod transaction;

#[cfg(test)]
mod testing;

pub use config::{
    EngineConfig, DEFAULT_ANSWER_TIMEOUT, DEFAULT_POLL_INTERVAL, DEFAULT_WRITE_TIMEOUT,
};
pub use engine::{Engine, EngineStats, Readiness, RequestLineState, StepOutcome, WaitPlan};
pub use error::{EngineError, Result, TransactionError};
pub use event_loop::{EventLoop, StopReason};
pub use shutdown::ShutdownSignal;
pub use transaction::{Direction, Transaction, TransactionState, DCP_BUFFER_SIZE, SPI_BUFFER_SIZE};
