use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;
use std::time::SystemTime;

pub fn setup_logging() {
    Builder::new()
        .filter_level(LevelFilter::Info) // Set default level
        .parse_env("RUST_LOG") // Allow override through env var
        .format(|buf, record| {
            let timestamp = SystemTime::now();
            let level = record.level();

            let (color, reset) = if atty::is(atty::Stream::Stderr) {
                let color = match level {
                    log::Level::Error => "\x1B[31m", // Red
                    log::Level::Warn => "\x1B[33m",  // Yellow
                    log::Level::Info => "\x1B[32m",  // Green
                    log::Level::Debug => "\x1B[36m", // Cyan
                    log::Level::Trace => "\x1B[35m", // Magenta
                };
                (color, "\x1B[0m")
            } else {
                ("", "")
            };

            // Only include file and line for debug/trace levels
            if level >= log::Level::Debug {
                writeln!(
                    buf,
                    "{}{:>5}{} [{}] {} - {}:{}",
                    color,
                    level,
                    reset,
                    humantime::format_rfc3339_millis(timestamp),
                    record.args(),
                    record.file().unwrap_or("unknown"),
                    record.line().unwrap_or(0)
                )
            } else {
                writeln!(
                    buf,
                    "{}{:>5}{} [{}] {}",
                    color,
                    level,
                    reset,
                    humantime::format_rfc3339_millis(timestamp),
                    record.args()
                )
            }
        })
        .init();
}

#[macro_export]
macro_rules! log_request {
    ($peer:expr, $request:expr) => {
        log::info!(
            "→ {} {} {}",
            $peer,
            $request.method,
            $request.target
        )
    };
}

#[macro_export]
macro_rules! log_response {
    ($status:expr, $duration:expr, $sent:expr) => {
        log::info!("← {} ({:?}) - {} bytes", $status, $duration, $sent)
    };
}

#[macro_export]
macro_rules! log_error {
    ($error:expr, $context:expr) => {
        log::error!("❌ {} - {}", $context, $error)
    };
}

// Trait for types that can be logged
pub trait Loggable {
    fn log_description(&self) -> String;
}

impl<T: std::fmt::Display + ?Sized> Loggable for T {
    fn log_description(&self) -> String {
        self.to_string()
    }
}

pub trait LoggingExt: Loggable {
    fn log_operation<F, T, E>(&self, operation: &str, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: std::fmt::Display;
}

impl<S: ?Sized + Loggable> LoggingExt for S {
    fn log_operation<F, T, E>(&self, operation: &str, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: std::fmt::Display,
    {
        log::debug!("Starting {} on {}", operation, self.log_description());
        match f() {
            Ok(result) => {
                log::debug!("Completed {} on {}", operation, self.log_description());
                Ok(result)
            }
            Err(e) => {
                log::error!("Failed {} on {}: {}", operation, self.log_description(), e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn log_operation_passes_results_through() {
        let ok: Result<u8, io::Error> = "target".log_operation("noop", || Ok(7));
        assert_eq!(ok.unwrap(), 7);

        let err: Result<u8, io::Error> = "target".log_operation("fail", || {
            Err(io::Error::new(io::ErrorKind::Other, "boom"))
        });
        assert_eq!(err.unwrap_err().to_string(), "boom");
    }
}
