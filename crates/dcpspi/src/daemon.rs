use std::path::{Path, PathBuf};

use dcpspi_engine::{Engine, EngineConfig, EventLoop, ShutdownSignal, StopReason};
use dcpspi_transport::{
    DummyBus, InactiveLine, NamedPipe, RequestLine, SerialBus, SpiDevice, SysfsGpio,
};
use tracing::{debug, info};

use crate::exit::{engine_error, transport_error, CliError, CliResult, SUCCESS};
use crate::Cli;

/// Open everything, run the event loop until a signal arrives, tear down.
///
/// Resources are owned by the engine (or by this frame while it is being
/// set up), so an early return releases whatever was already opened.
pub fn run(cli: Cli) -> CliResult<i32> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        os = std::env::consts::OS,
        arch = std::env::consts::ARCH,
        "dcpspi starting"
    );

    let config = EngineConfig {
        answer_timeout: cli.answer_timeout,
        poll_interval: cli.poll_interval,
        write_timeout: cli.write_timeout,
    };

    let inbound = NamedPipe::create_and_open(absolute(&cli.ififo)?)
        .map_err(|err| transport_error("cannot open inbound pipe", err))?;
    let outbound = NamedPipe::create_and_open(absolute(&cli.ofifo)?)
        .map_err(|err| transport_error("cannot open outbound pipe", err))?;

    if cli.is_dummy() {
        info!("no SPI device, running in dummy mode");
        return serve(&cli, DummyBus, InactiveLine, inbound, outbound, config);
    }

    let bus = SpiDevice::open(&cli.spidev)
        .map_err(|err| transport_error("cannot open SPI device", err))?;
    bus.set_speed_hz(cli.spiclk)
        .map_err(|err| transport_error("cannot set SPI clock", err))?;

    let mut line = SysfsGpio::open(cli.gpio)
        .map_err(|err| transport_error("cannot set up request line", err))?;
    if cli.debounce {
        line.enable_debouncing();
    }

    serve(&cli, bus, line, inbound, outbound, config)
}

fn serve<B, L>(
    cli: &Cli,
    bus: B,
    line: L,
    inbound: NamedPipe,
    outbound: NamedPipe,
    config: EngineConfig,
) -> CliResult<i32>
where
    B: SerialBus,
    L: RequestLine,
{
    let engine = Engine::new(bus, line, inbound, outbound, config)
        .map_err(|err| engine_error("cannot start transaction engine", err))?;

    if !cli.fg {
        daemonize()?;
    }

    let shutdown = ShutdownSignal::new();
    install_signal_handler(shutdown.clone())?;

    let mut event_loop = EventLoop::new(engine, shutdown);
    let result = event_loop.run();
    info!("Terminated, shutting down");

    match result {
        Ok(StopReason::Shutdown) => Ok(SUCCESS),
        Ok(StopReason::HostClosed) => {
            debug!("host went away");
            Ok(SUCCESS)
        }
        Err(err) => Err(engine_error("event loop failed", err)),
    }
}

/// Pipe paths must survive the working directory change of `daemon(3)`.
fn absolute(path: &Path) -> CliResult<PathBuf> {
    std::path::absolute(path)
        .map_err(|err| CliError::failure(format!("invalid path {}: {err}", path.display())))
}

fn daemonize() -> CliResult<()> {
    // Keep stderr so the subscriber still has somewhere to write.
    // SAFETY: no threads have been spawned yet; daemon(3) forks and the
    // parent exits without running any Rust code.
    let rc = unsafe { libc::daemon(0, 1) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        return Err(CliError::failure(format!("cannot daemonize: {err}")));
    }
    debug!(pid = std::process::id(), "detached from terminal");
    Ok(())
}

fn install_signal_handler(shutdown: ShutdownSignal) -> CliResult<()> {
    ctrlc::set_handler(move || shutdown.request())
        .map_err(|err| CliError::failure(format!("signal handler setup failed: {err}")))
}
