use clap::Parser;
use std::process::ExitCode;

use brserve::args::Args;
use brserve::config::Config;
use brserve::error::StartupError;
use brserve::logging::setup_logging;
use brserve::server::Server;
#[cfg(unix)]
use brserve::signals::Signal;
use brserve::supervisor::Supervisor;

fn main() -> ExitCode {
    let args = Args::parse();
    setup_logging();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Fatal error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// What ends the main thread's wait.
#[cfg(unix)]
enum Event {
    Signal(Signal),
    ServerStopped(String),
}

#[cfg(unix)]
fn run(args: Args) -> Result<(), StartupError> {
    use brserve::signals::ShutdownSignals;
    use std::sync::mpsc;
    use std::thread;

    // Installed first so a signal during startup is queued, not fatal.
    let mut signals = ShutdownSignals::install().map_err(StartupError::Signals)?;

    let config = Config::from_args(&args)?;
    let server = Server::bind(config.clone())?;

    let supervisor = config.backend.as_ref().and_then(|backend| {
        match Supervisor::spawn(backend, config.exit_policy, config.shutdown_timeout) {
            Ok(supervisor) => Some(supervisor),
            Err(e) => {
                log::error!("[BACKEND] Failed to start backend {}: {}", backend, e);
                None
            }
        }
    });

    let (tx, events) = mpsc::channel();

    let signal_tx = tx.clone();
    thread::Builder::new()
        .name("signals".into())
        .spawn(move || {
            if let Some(signal) = signals.wait() {
                let _ = signal_tx.send(Event::Signal(signal));
            }
        })?;

    server.spawn_watched(move |reason| {
        let _ = tx.send(Event::ServerStopped(reason));
    })?;

    match events.recv() {
        Ok(Event::Signal(signal)) => {
            log::info!("Received {}, shutting down", signal);
            stop_backend(supervisor, signal);
            Ok(())
        }
        Ok(Event::ServerStopped(reason)) => {
            stop_backend(supervisor, Signal::Terminate);
            Err(StartupError::ServerStopped(reason))
        }
        Err(_) => {
            stop_backend(supervisor, Signal::Terminate);
            Err(StartupError::ServerStopped("event channel closed".into()))
        }
    }
}

#[cfg(unix)]
fn stop_backend(supervisor: Option<Supervisor>, signal: Signal) {
    if let Some(supervisor) = supervisor {
        match supervisor.shutdown(signal) {
            Some(code) => log::info!("[BACKEND] Backend stopped with code {}", code),
            None => log::info!("[BACKEND] Backend stopped"),
        }
    }
}

#[cfg(not(unix))]
fn run(args: Args) -> Result<(), StartupError> {
    let config = Config::from_args(&args)?;
    let server = Server::bind(config.clone())?;
    let _supervisor = match &config.backend {
        Some(backend) => {
            match Supervisor::spawn(backend, config.exit_policy, config.shutdown_timeout) {
                Ok(supervisor) => Some(supervisor),
                Err(e) => {
                    log::error!("[BACKEND] Failed to start backend {}: {}", backend, e);
                    None
                }
            }
        }
        None => None,
    };
    server.run()?;
    Err(StartupError::ServerStopped("accept loop ended".into()))
}
