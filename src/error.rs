use std::io;
use thiserror::Error;

/// Failures while answering a single request.
///
/// Everything except `Io` is raised before the response head goes out, so
/// the connection handler can still turn it into a status line and a
/// plain-text body. `Io` means the exchange broke mid-stream (usually the
/// peer went away) and the connection is simply dropped.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("compressed asset not found: {0}")]
    AssetNotFound(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("method {0} not allowed")]
    MethodNotAllowed(String),

    #[error("upstream {upstream} unreachable: {source}")]
    UpstreamUnreachable {
        upstream: String,
        #[source]
        source: io::Error,
    },

    #[error("internal error: {0}")]
    Internal(io::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ServeError {
    pub fn status(&self) -> u16 {
        match self {
            ServeError::AssetNotFound(_) | ServeError::NotFound(_) => 404,
            ServeError::BadRequest(_) => 400,
            ServeError::MethodNotAllowed(_) => 405,
            ServeError::UpstreamUnreachable { .. } => 502,
            ServeError::Internal(_) | ServeError::Io(_) => 500,
        }
    }

    pub fn body(&self) -> &'static str {
        match self {
            ServeError::AssetNotFound(_) => "File not found",
            ServeError::NotFound(_) => "Not Found",
            ServeError::BadRequest(_) => "Bad Request",
            ServeError::MethodNotAllowed(_) => "Method Not Allowed",
            ServeError::UpstreamUnreachable { .. } => "Bad Gateway",
            ServeError::Internal(_) | ServeError::Io(_) => "Internal Server Error",
        }
    }

    /// Whether a response can still be written for this error.
    pub fn is_reportable(&self) -> bool {
        !matches!(self, ServeError::Io(_))
    }
}

/// Anything that stops the process from coming up, or takes the listener
/// down afterwards. `main` logs it and exits with status 1.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to install signal handling: {0}")]
    Signals(#[source] io::Error),

    #[error("server stopped: {0}")]
    ServerStopped(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}
