use std::path::PathBuf;
use std::time::Duration;

use crate::args::Args;
use crate::error::StartupError;
use crate::file_serving::spa::SpaConfig;
use crate::file_serving::DocumentRoot;
use crate::proxy::Upstream;
use crate::routing::Router;
use crate::supervisor::{BackendCommand, ExitPolicy};

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub prefix: String,
    pub upstream: Upstream,
}

/// Validated runtime configuration. Immutable once the server is up.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: String,
    pub root: DocumentRoot,
    pub proxy: Option<ProxyConfig>,
    pub backend: Option<BackendCommand>,
    pub exit_policy: ExitPolicy,
    pub shutdown_timeout: Duration,
}

impl Config {
    pub fn from_args(args: &Args) -> Result<Self, StartupError> {
        if args.index.is_absolute() || args.index.as_os_str().is_empty() {
            return Err(StartupError::Config(format!(
                "entry document {} must be a path relative to the document root",
                args.index.display()
            )));
        }

        let spa = SpaConfig::new(args.index.clone(), args.fallback_exclude.clone());
        let root = DocumentRoot::open(&args.serve_dir, spa, args.max_age).map_err(|e| {
            StartupError::Config(format!(
                "document root {}: {}",
                args.serve_dir.display(),
                e
            ))
        })?;
        if !root.entry_document().is_file() {
            log::warn!(
                "Entry document {} does not exist; unmatched paths will 404",
                root.entry_document().display()
            );
        }

        let proxy = match &args.upstream {
            Some(url) => {
                if !args.proxy_prefix.starts_with('/') {
                    return Err(StartupError::Config(format!(
                        "proxy prefix {} must start with '/'",
                        args.proxy_prefix
                    )));
                }
                let mut upstream = Upstream::parse(url).map_err(StartupError::Config)?;
                upstream.timeout = args.upstream_timeout;
                Some(ProxyConfig {
                    prefix: args.proxy_prefix.clone(),
                    upstream,
                })
            }
            None => None,
        };

        let backend = match args.backend.split_first() {
            Some((program, rest)) => Some(BackendCommand {
                program: program.clone(),
                args: rest.to_vec(),
                cwd: args.backend_dir.clone(),
            }),
            None => {
                if args.backend_dir.is_some() {
                    log::warn!("--backend-dir given without a backend command; ignoring it");
                }
                None
            }
        };
        if let Some(dir) = backend.as_ref().and_then(|b| b.cwd.as_ref()) {
            if !dir.is_dir() {
                return Err(StartupError::Config(format!(
                    "backend directory {} does not exist",
                    dir.display()
                )));
            }
        }

        Ok(Self {
            listen_addr: args.listen_addr(),
            root,
            proxy,
            backend,
            exit_policy: if args.exit_with_backend {
                ExitPolicy::Exit
            } else {
                ExitPolicy::Continue
            },
            shutdown_timeout: args.shutdown_timeout,
        })
    }

    pub fn router(&self) -> Router {
        Router::new(self.proxy.as_ref().map(|p| p.prefix.as_str()))
    }

    pub fn serve_dir(&self) -> PathBuf {
        self.root.base().to_path_buf()
    }
}
