use std::time::Duration;

/// Default deadline for the host to answer a slave read request.
pub const DEFAULT_ANSWER_TIMEOUT: Duration = Duration::from_secs(1);

/// Default bound on a single write to the outbound host channel.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Default upper bound for a single idle wait.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Runtime configuration for the transaction engine and its event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// How long a slave read request waits for the host's answer.
    pub answer_timeout: Duration,
    /// Upper bound for one wait; also bounds shutdown latency.
    pub poll_interval: Duration,
    /// How long a frame for the host may wait for room in the outbound
    /// channel before the daemon gives up.
    pub write_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            answer_timeout: DEFAULT_ANSWER_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}
