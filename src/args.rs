use clap::Parser;
use regex::Regex;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Document root
    #[arg(short = 'd', long, env = "SERVE_DIR", default_value = "frontend")]
    pub serve_dir: PathBuf,

    /// Entry document served for unmatched paths, relative to the document root
    #[arg(long, default_value = "index.html")]
    pub index: PathBuf,

    /// Upstream origin for the proxy, e.g. http://127.0.0.1:8000
    #[arg(short, long, env = "UPSTREAM_URL")]
    pub upstream: Option<String>,

    /// Read/write timeout on upstream connections
    #[arg(long, default_value = "60s", value_parser = humantime::parse_duration)]
    pub upstream_timeout: Duration,

    /// Path prefix forwarded to the upstream
    #[arg(long, default_value = "/api")]
    pub proxy_prefix: String,

    /// max-age in seconds for static files (the entry document is never cached)
    #[arg(long, default_value_t = 0)]
    pub max_age: u32,

    /// Paths matching any of these patterns get a 404 instead of the entry document
    #[arg(long = "fallback-exclude", value_name = "REGEX", value_parser = Regex::new)]
    pub fallback_exclude: Vec<Regex>,

    /// Working directory for the backend process
    #[arg(long)]
    pub backend_dir: Option<PathBuf>,

    /// How long to wait for the backend after forwarding a shutdown signal
    #[arg(long, default_value = "5s", value_parser = humantime::parse_duration)]
    pub shutdown_timeout: Duration,

    /// Exit when the backend process exits on its own
    #[arg(long)]
    pub exit_with_backend: bool,

    /// Backend command line, given after `--`
    #[arg(last = true, value_name = "BACKEND")]
    pub backend: Vec<String>,
}

impl Args {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
