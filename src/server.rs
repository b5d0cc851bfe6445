use log::{debug, info, warn};
use std::io::{self, BufReader};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::error::{ServeError, StartupError};
use crate::file_serving::handlers::handle_file_request;
use crate::http::{write_plain, Request};
use crate::proxy::handlers::handle_proxy_request;
use crate::routing::{Route, Router};
use crate::{log_error, log_request, log_response};

/// How long a client may take to send its request (and, for the proxy,
/// each piece of its body).
const CLIENT_READ_TIMEOUT: Duration = Duration::from_secs(30);

struct Shared {
    config: Config,
    router: Router,
}

pub struct Server {
    listener: TcpListener,
    shared: Arc<Shared>,
}

impl Server {
    pub fn bind(config: Config) -> Result<Self, StartupError> {
        let listener =
            TcpListener::bind(&config.listen_addr).map_err(|source| StartupError::Bind {
                addr: config.listen_addr.clone(),
                source,
            })?;
        let router = config.router();
        Ok(Self {
            listener,
            shared: Arc::new(Shared { config, router }),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections forever, one thread per connection.
    pub fn run(self) -> io::Result<()> {
        let config = &self.shared.config;
        info!("Server listening on {}", self.local_addr()?);
        info!("Serving directory: {}", config.serve_dir().display());
        if let Some(proxy) = &config.proxy {
            info!("Forwarding {}/* to: {}", proxy.prefix.trim_end_matches('/'), proxy.upstream);
        }

        for stream in self.listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    continue;
                }
            };
            let shared = Arc::clone(&self.shared);

            let spawned = thread::Builder::new()
                .name("connection".into())
                .spawn(move || {
                    if let Err(e) = handle_connection(stream, &shared) {
                        debug!("Connection ended with error: {}", e);
                    }
                });
            if let Err(e) = spawned {
                log_error!(e, "Failed to spawn connection thread");
            }
        }

        Ok(())
    }

    /// Runs [`Server::run`] on an `accept` thread. If that thread ever
    /// finishes, by error or panic, `on_stop` is called with the reason.
    pub fn spawn_watched<F>(self, on_stop: F) -> io::Result<()>
    where
        F: FnOnce(String) + Send + 'static,
    {
        let accept = thread::Builder::new()
            .name("accept".into())
            .spawn(move || self.run())?;
        watch(accept, on_stop)
    }
}

fn watch<F>(accept: JoinHandle<io::Result<()>>, on_stop: F) -> io::Result<()>
where
    F: FnOnce(String) + Send + 'static,
{
    thread::Builder::new()
        .name("accept-watch".into())
        .spawn(move || {
            let reason = match accept.join() {
                Ok(Ok(())) => "accept loop ended".to_string(),
                Ok(Err(e)) => e.to_string(),
                Err(_) => "accept thread panicked".to_string(),
            };
            on_stop(reason);
        })?;
    Ok(())
}

fn handle_connection(client: TcpStream, shared: &Shared) -> io::Result<()> {
    let start_time = Instant::now();
    let peer = client.peer_addr().ok();
    client.set_read_timeout(Some(CLIENT_READ_TIMEOUT))?;

    let mut reader = BufReader::new(client.try_clone()?);
    let mut writer = client;

    let request = match Request::read_from(&mut reader) {
        Ok(Some(request)) => request,
        Ok(None) => {
            debug!("Connection closed before a request was sent");
            return Ok(());
        }
        Err(e) => return respond_with_error(&mut writer, &e, false, start_time),
    };

    let peer_display = peer.map_or_else(|| "-".to_string(), |p| p.to_string());
    log_request!(peer_display, request);

    let route = match shared.router.route(&request.method, request.path()) {
        Ok(route) => route,
        Err(e) => return respond_with_error(&mut writer, &e, request.is_head(), start_time),
    };
    debug!("Route for {}: {:?}", request.path(), route);

    let result = match route {
        Route::Proxy => match &shared.config.proxy {
            Some(proxy) => {
                handle_proxy_request(&mut reader, &mut writer, &request, &proxy.upstream, peer)
            }
            None => Err(ServeError::NotFound(request.target.clone())),
        },
        Route::Asset(family) => {
            handle_file_request(&mut writer, &shared.config.root, &request, Some(family))
        }
        Route::Static => handle_file_request(&mut writer, &shared.config.root, &request, None),
        Route::MethodNotAllowed => Err(ServeError::MethodNotAllowed(request.method.clone())),
    };

    match result {
        Ok(served) => {
            log_response!(served.status, start_time.elapsed(), served.bytes);
            Ok(())
        }
        Err(e) => respond_with_error(&mut writer, &e, request.is_head(), start_time),
    }
}

fn respond_with_error(
    writer: &mut TcpStream,
    error: &ServeError,
    head_only: bool,
    start_time: Instant,
) -> io::Result<()> {
    if !error.is_reportable() {
        debug!("Aborted mid-response: {}", error);
        return Ok(());
    }

    match error {
        ServeError::UpstreamUnreachable { .. } | ServeError::Internal(_) => {
            log_error!(error, "Request failed")
        }
        _ => debug!("Request rejected: {}", error),
    }

    let extra: &[(&str, &str)] = match error {
        ServeError::MethodNotAllowed(_) => &[("Allow", "GET, HEAD")],
        _ => &[],
    };
    let sent = write_plain(writer, error.status(), error.body(), extra, head_only)?;
    log_response!(error.status(), start_time.elapsed(), sent);
    Ok(())
}
