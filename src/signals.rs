//! Shutdown signal handling.
//!
//! SIGINT and SIGTERM are registered with `signal-hook` and read back
//! synchronously through its iterator, so the default "terminate now"
//! action never runs and shutdown happens on our own thread.

use std::fmt;
#[cfg(unix)]
use std::io;

#[cfg(unix)]
use signal_hook::consts::{SIGINT, SIGTERM};
#[cfg(unix)]
use signal_hook::iterator::Signals;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Interrupt,
    Terminate,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Interrupt => write!(f, "SIGINT"),
            Signal::Terminate => write!(f, "SIGTERM"),
        }
    }
}

#[cfg(unix)]
impl Signal {
    pub fn as_raw(self) -> libc::c_int {
        match self {
            Signal::Interrupt => SIGINT,
            Signal::Terminate => SIGTERM,
        }
    }

    fn from_raw(raw: libc::c_int) -> Option<Self> {
        match raw {
            SIGINT => Some(Signal::Interrupt),
            SIGTERM => Some(Signal::Terminate),
            _ => None,
        }
    }
}

#[cfg(unix)]
pub struct ShutdownSignals {
    signals: Signals,
}

#[cfg(unix)]
impl ShutdownSignals {
    /// Registers the handlers. Signals that arrive before [`wait`] is
    /// called are queued, not lost.
    ///
    /// [`wait`]: ShutdownSignals::wait
    pub fn install() -> io::Result<Self> {
        let signals = Signals::new([SIGINT, SIGTERM])?;
        log::debug!("Installed handlers for SIGINT and SIGTERM");
        Ok(Self { signals })
    }

    /// Blocks until SIGINT or SIGTERM arrives. `None` only if the signal
    /// iterator was closed.
    pub fn wait(&mut self) -> Option<Signal> {
        self.signals.forever().find_map(Signal::from_raw)
    }
}
