mod daemon;
mod exit;
mod logging;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::exit::{CliError, CliResult, FAILURE, SUCCESS};
use crate::logging::{init_logging, LogFormat, LogLevel, LogSink};

/// Value of `--spidev` that runs without SPI and GPIO hardware.
pub const DUMMY_DEVICE: &str = "-";

#[derive(Parser, Debug)]
#[command(
    name = "dcpspi",
    version,
    about = "Bridge DCP command frames between named pipes and an SPI slave"
)]
pub struct Cli {
    /// Named pipe the host writes DCP frames to.
    #[arg(long, value_name = "PATH", env = "DCPSPI_IFIFO", default_value = "/tmp/dcp_to_spi")]
    pub ififo: PathBuf,

    /// Named pipe the host reads DCP frames from.
    #[arg(long, value_name = "PATH", env = "DCPSPI_OFIFO", default_value = "/tmp/spi_to_dcp")]
    pub ofifo: PathBuf,

    /// SPI device; "-" runs without SPI and GPIO hardware.
    #[arg(long, value_name = "PATH", env = "DCPSPI_SPIDEV", default_value = "/dev/spidev0.0")]
    pub spidev: String,

    /// SPI clock in Hz; 0 keeps the driver default.
    #[arg(long, value_name = "HZ", default_value_t = 0)]
    pub spiclk: u32,

    /// GPIO number of the slave's request line.
    #[arg(long, value_name = "NUM", env = "DCPSPI_GPIO", default_value_t = 4)]
    pub gpio: u32,

    /// Debounce the request line in software.
    #[arg(long)]
    pub debounce: bool,

    /// Stay in the foreground.
    #[arg(long)]
    pub fg: bool,

    /// Deadline for host answers to slave reads (e.g. 1s, 500ms).
    #[arg(long, value_name = "DUR", value_parser = parse_duration, default_value = "1s")]
    pub answer_timeout: Duration,

    /// Upper bound for an idle wait (e.g. 100ms).
    #[arg(long, value_name = "DUR", value_parser = parse_duration, default_value = "100ms")]
    pub poll_interval: Duration,

    /// How long a frame may wait for the host to drain the outbound pipe.
    #[arg(long, value_name = "DUR", value_parser = parse_duration, default_value = "1s")]
    pub write_timeout: Duration,

    /// Log output format.
    #[arg(long, value_name = "FORMAT", default_value = "text")]
    pub log_format: LogFormat,

    /// Minimum log level.
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    pub log_level: LogLevel,
}

impl Cli {
    pub fn is_dummy(&self) -> bool {
        self.spidev == DUMMY_DEVICE
    }
}

/// Parse `<digits><unit>` where unit is `ms`, `s` or `m`; a bare number
/// counts as seconds.
fn parse_duration(input: &str) -> CliResult<Duration> {
    let text = input.trim();
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (digits, unit) = text.split_at(split);

    let amount: u64 = digits
        .parse()
        .map_err(|_| CliError::failure(format!("'{text}' is not a duration")))?;
    let duration = match unit {
        "ms" => Duration::from_millis(amount),
        "" | "s" => Duration::from_secs(amount),
        "m" => Duration::from_secs(amount.saturating_mul(60)),
        other => {
            return Err(CliError::failure(format!(
                "unknown duration unit '{other}' in '{text}'"
            )))
        }
    };

    if duration.is_zero() {
        return Err(CliError::failure(format!("'{text}' is not a positive duration")));
    }
    Ok(duration)
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() { FAILURE } else { SUCCESS };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    let sink = if cli.fg { LogSink::Stderr } else { LogSink::Syslog };
    init_logging(cli.log_format, cli.log_level, sink);

    match daemon::run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}
