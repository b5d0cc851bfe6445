//! Launches the backend next to the asset server and stops it on shutdown.
//!
//! The child inherits stdout/stderr. A monitor thread polls it and reports
//! the exit; [`Supervisor::shutdown`] forwards the received signal, waits up
//! to the configured timeout and kills the child if it is still running.

use std::io;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use crate::signals::Signal;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const KILL_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl std::fmt::Display for BackendCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// What to do when the backend exits without being asked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitPolicy {
    /// Log it and keep serving assets.
    Continue,
    /// Log it and terminate the server with status 1.
    Exit,
}

pub struct Supervisor {
    child: Arc<Mutex<Child>>,
    stopping: Arc<AtomicBool>,
    exited: Receiver<Option<i32>>,
    timeout: Duration,
}

impl Supervisor {
    pub fn spawn(
        command: &BackendCommand,
        policy: ExitPolicy,
        timeout: Duration,
    ) -> io::Result<Self> {
        log::info!("[BACKEND] Starting backend: {}", command);
        if let Some(dir) = &command.cwd {
            log::info!("[BACKEND] Backend directory: {}", dir.display());
        }

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        if let Some(dir) = &command.cwd {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn()?;
        log::info!("[BACKEND] Backend running with pid {}", child.id());

        let child = Arc::new(Mutex::new(child));
        let stopping = Arc::new(AtomicBool::new(false));
        let (tx, exited) = mpsc::channel();

        {
            let child = Arc::clone(&child);
            let stopping = Arc::clone(&stopping);
            thread::Builder::new()
                .name("backend-monitor".into())
                .spawn(move || {
                    let status = monitor(&child);
                    let code = status.as_ref().ok().and_then(ExitStatus::code);
                    match &status {
                        Ok(status) => {
                            log::info!("[BACKEND] Backend process exited with {}", status)
                        }
                        Err(e) => log::error!("[BACKEND] Lost track of backend: {}", e),
                    }
                    let _ = tx.send(code);

                    if !stopping.load(Ordering::SeqCst) && policy == ExitPolicy::Exit {
                        log::error!("[BACKEND] Backend exited unexpectedly, shutting down");
                        std::process::exit(1);
                    }
                })?;
        }

        Ok(Self {
            child,
            stopping,
            exited,
            timeout,
        })
    }

    /// Forwards `signal` to the backend and waits for it to exit. Escalates
    /// to a hard kill after the timeout. Returns the child's exit code if it
    /// had one.
    pub fn shutdown(self, signal: Signal) -> Option<i32> {
        self.stopping.store(true, Ordering::SeqCst);
        log::info!("[BACKEND] Shutting down backend ({})...", signal);

        {
            let mut child = lock(&self.child);
            match child.try_wait() {
                Ok(Some(_)) => {}
                _ => {
                    if let Err(e) = send_signal(&mut child, signal) {
                        log::warn!("[BACKEND] Failed to signal backend: {}", e);
                    }
                }
            }
        }

        match self.exited.recv_timeout(self.timeout) {
            Ok(code) => return code,
            Err(RecvTimeoutError::Disconnected) => return None,
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "[BACKEND] Backend still running after {}, killing it",
                    humantime::format_duration(self.timeout)
                );
            }
        }

        {
            let mut child = lock(&self.child);
            if let Ok(None) = child.try_wait() {
                if let Err(e) = child.kill() {
                    log::warn!("[BACKEND] Failed to kill backend: {}", e);
                }
            }
        }
        self.exited.recv_timeout(KILL_GRACE).ok().flatten()
    }
}

fn lock(child: &Mutex<Child>) -> std::sync::MutexGuard<'_, Child> {
    child.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Polls instead of blocking in `wait` so the lock stays free for
/// `shutdown`, and the pid is never signalled after it has been reaped.
fn monitor(child: &Mutex<Child>) -> io::Result<ExitStatus> {
    loop {
        if let Some(status) = lock(child).try_wait()? {
            return Ok(status);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(unix)]
fn send_signal(child: &mut Child, signal: Signal) -> io::Result<()> {
    let pid = libc::pid_t::try_from(child.id())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    // SAFETY: the child has not been reaped (checked under the lock), so
    // the pid still refers to it.
    let rc = unsafe { libc::kill(pid, signal.as_raw()) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn send_signal(child: &mut Child, _signal: Signal) -> io::Result<()> {
    child.kill()
}
