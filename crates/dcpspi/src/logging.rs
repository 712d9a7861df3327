use std::ffi::CString;
use std::io::Write;

use clap::ValueEnum;
use tracing::{Level, Metadata};
use tracing_subscriber::fmt::MakeWriter;

const SYSLOG_IDENT: &std::ffi::CStr = c"dcpspi";

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> tracing::level_filters::LevelFilter {
        use tracing::level_filters::LevelFilter;
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Where log records go.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LogSink {
    /// Foreground runs log to the terminal.
    Stderr,
    /// A daemonized process has no terminal; records go to the system log
    /// under the `daemon` facility.
    Syslog,
}

/// Install the global subscriber for the chosen sink.
pub fn init_logging(format: LogFormat, level: LogLevel, sink: LogSink) {
    match sink {
        LogSink::Stderr => {
            let builder = tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_max_level(level.as_filter())
                .with_ansi(false)
                .with_target(false);
            match format {
                LogFormat::Text => {
                    let _ = builder.try_init();
                }
                LogFormat::Json => {
                    let _ = builder.json().try_init();
                }
            }
        }
        LogSink::Syslog => {
            // SAFETY: the ident is a static C string, as openlog(3) requires.
            unsafe { libc::openlog(SYSLOG_IDENT.as_ptr(), libc::LOG_PID, libc::LOG_DAEMON) };

            // syslogd stamps every record itself.
            let builder = tracing_subscriber::fmt()
                .with_writer(Syslog)
                .with_max_level(level.as_filter())
                .with_ansi(false)
                .with_target(false)
                .without_time();
            match format {
                LogFormat::Text => {
                    let _ = builder.try_init();
                }
                LogFormat::Json => {
                    let _ = builder.json().try_init();
                }
            }
        }
    }
}

/// Writer factory handing each formatted event to syslog(3).
#[derive(Copy, Clone, Debug, Default)]
pub struct Syslog;

impl<'a> MakeWriter<'a> for Syslog {
    type Writer = SyslogRecord;

    fn make_writer(&'a self) -> Self::Writer {
        SyslogRecord::new(libc::LOG_INFO)
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        SyslogRecord::new(priority(meta.level()))
    }
}

/// One formatted event, submitted when dropped.
#[derive(Debug)]
pub struct SyslogRecord {
    priority: libc::c_int,
    buf: Vec<u8>,
}

impl SyslogRecord {
    fn new(priority: libc::c_int) -> Self {
        Self {
            priority,
            buf: Vec::new(),
        }
    }
}

impl Write for SyslogRecord {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Drop for SyslogRecord {
    fn drop(&mut self) {
        for line in record_lines(&self.buf) {
            // SAFETY: both pointers are NUL-terminated and outlive the call;
            // the message is passed as an argument, never as the format.
            unsafe { libc::syslog(self.priority, c"%s".as_ptr(), line.as_ptr()) };
        }
    }
}

fn priority(level: &Level) -> libc::c_int {
    match *level {
        Level::ERROR => libc::LOG_ERR,
        Level::WARN => libc::LOG_WARNING,
        Level::INFO => libc::LOG_INFO,
        Level::DEBUG | Level::TRACE => libc::LOG_DEBUG,
    }
}

/// Split a formatted event into syslog messages: one per non-empty line,
/// interior NULs dropped.
fn record_lines(buf: &[u8]) -> Vec<CString> {
    buf.split(|&byte| byte == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let clean: Vec<u8> = line.iter().copied().filter(|&byte| byte != 0).collect();
            CString::new(clean).ok()
        })
        .collect()
}
