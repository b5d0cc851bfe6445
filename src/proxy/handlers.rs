use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use super::headers::{
    body_framing, parse_response_headers, parse_status, relay_response_head,
    response_framing, rewrite_request_headers, BodyFraming,
};
use super::transfer::forward_body;
use super::Upstream;
use crate::error::ServeError;
use crate::http::{Request, Served};
use crate::logging::LoggingExt;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_RESPONSE_HEAD_BYTES: u64 = 64 * 1024;

/// Forwards one request to the upstream and relays the response.
///
/// `client_reader` must be the reader the request head was parsed from, so
/// any body bytes it already buffered are forwarded too. Failures before
/// the first response byte reaches the client come back as
/// `UpstreamUnreachable`; later failures as `Io`.
pub fn handle_proxy_request<R: BufRead, W: Write>(
    client_reader: &mut R,
    client: &mut W,
    request: &Request,
    upstream: &Upstream,
    peer: Option<SocketAddr>,
) -> Result<Served, ServeError> {
    let start_time = Instant::now();
    log::debug!("→ Proxying {} {} to {}", request.method, request.target, upstream);

    let unreachable = |source: io::Error| ServeError::UpstreamUnreachable {
        upstream: upstream.to_string(),
        source,
    };

    let mut server = connect(&upstream.addr, upstream.timeout).map_err(|e| {
        log::error!("Failed to connect to backend {}: {}", upstream, e);
        unreachable(e)
    })?;
    log::debug!("Connected to backend server in {:?}", start_time.elapsed());

    if request
        .header("expect")
        .is_some_and(|v| v.eq_ignore_ascii_case("100-continue"))
    {
        client.write_all(b"HTTP/1.1 100 Continue\r\n\r\n")?;
        client.flush()?;
    }

    let client_ip = peer.map(|p| p.ip().to_string());
    upstream
        .log_operation("forward_request", || {
            send_request(client_reader, &mut server, request, upstream, client_ip.as_deref())
        })
        .map_err(unreachable)?;

    let mut server_reader = BufReader::new(server);
    let raw_head = read_response_head(&mut server_reader).map_err(unreachable)?;
    let (status_line, headers) = parse_response_headers(&raw_head);
    let status = parse_status(status_line).ok_or_else(|| {
        unreachable(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("malformed status line: {}", status_line),
        ))
    })?;
    log::debug!("← {} from backend", status_line);

    let framing = response_framing(status, &request.method, &headers);
    log::debug!("Response framing: {:?}", framing);

    client.write_all(&relay_response_head(&raw_head))?;
    let bytes = forward_body(&mut server_reader, client, framing)?;

    log::debug!("← Completed proxy request in {:?}", start_time.elapsed());
    Ok(Served { status, bytes })
}

fn connect(addr: &str, io_timeout: Duration) -> io::Result<TcpStream> {
    let mut last_err = None;
    for candidate in addr.to_socket_addrs()? {
        match TcpStream::connect_timeout(&candidate, CONNECT_TIMEOUT) {
            Ok(stream) => {
                stream.set_read_timeout(Some(io_timeout))?;
                stream.set_write_timeout(Some(io_timeout))?;
                return Ok(stream);
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, format!("{} did not resolve", addr))
    }))
}

fn send_request<R: BufRead>(
    client_reader: &mut R,
    server: &mut TcpStream,
    request: &Request,
    upstream: &Upstream,
    client_ip: Option<&str>,
) -> io::Result<()> {
    let headers = rewrite_request_headers(&request.headers, upstream, client_ip);

    let mut head = Vec::with_capacity(512);
    write!(
        head,
        "{} {} {}\r\n",
        request.method,
        upstream.target_for(&request.target),
        request.version
    )?;
    for (key, value) in &headers {
        write!(head, "{}: {}\r\n", key, value)?;
    }
    head.extend_from_slice(b"\r\n");
    server.write_all(&head)?;

    // Forward request body if present
    let framing = body_framing(&request.headers).unwrap_or(BodyFraming::None);
    let sent = forward_body(client_reader, server, framing)?;
    if sent > 0 {
        log::debug!("Forwarded request body of {} bytes", sent);
    }
    Ok(())
}

fn read_response_head<R: BufRead>(reader: &mut R) -> io::Result<String> {
    let mut limited = reader.take(MAX_RESPONSE_HEAD_BYTES);
    let mut head = String::new();
    loop {
        let before = head.len();
        let n = limited.read_line(&mut head)?;
        if n == 0 || !head.ends_with('\n') {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "upstream closed before sending a complete response head",
            ));
        }
        if head[before..].trim().is_empty() {
            return Ok(head);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};
    use std::net::TcpListener;
    use std::thread;

    fn request(raw: &str) -> (Cursor<Vec<u8>>, Request) {
        let mut reader = Cursor::new(raw.as_bytes().to_vec());
        let request = Request::read_from(&mut reader).unwrap().unwrap();
        (reader, request)
    }

    /// Accepts one connection, captures what was sent, replies with `reply`.
    fn one_shot_upstream(reply: &'static str) -> (Upstream, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let head = read_response_head(&mut reader).unwrap();
            let mut body = vec![0; content_length(&head)];
            reader.read_exact(&mut body).unwrap();
            let mut stream = stream;
            stream.write_all(reply.as_bytes()).unwrap();
            format!("{}{}", head, String::from_utf8(body).unwrap())
        });
        (Upstream::parse(&format!("http://{}", addr)).unwrap(), handle)
    }

    fn content_length(head: &str) -> usize {
        head.lines()
            .find_map(|l| {
                l.to_lowercase()
                    .strip_prefix("content-length:")
                    .map(|v| v.trim().parse().unwrap())
            })
            .unwrap_or(0)
    }

    #[test]
    fn relays_status_and_body() {
        let (upstream, handle) = one_shot_upstream(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 14\r\n\r\n{\"balance\":42}",
        );
        let (mut reader, req) = request(
            "GET /api/user/balance?user_id=42 HTTP/1.1\r\nHost: game.example.com\r\n\r\n",
        );
        let mut out = Vec::new();
        let served = handle_proxy_request(&mut reader, &mut out, &req, &upstream, None).unwrap();
        assert_eq!(served, Served { status: 200, bytes: 14 });

        let seen = handle.join().unwrap();
        assert!(seen.starts_with("GET /api/user/balance?user_id=42 HTTP/1.1\r\n"));
        assert!(seen.contains(&format!("Host: {}\r\n", upstream.host_header)));
        assert!(seen.contains("X-Forwarded-Host: game.example.com\r\n"));

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Type: application/json\r\n"));
        assert!(text.ends_with("{\"balance\":42}"));
    }

    #[test]
    fn forwards_request_body() {
        let (upstream, handle) =
            one_shot_upstream("HTTP/1.1 204 No Content\r\n\r\n");
        let (mut reader, req) = request(
            "POST /api/user/spend HTTP/1.1\r\nHost: x\r\nContent-Length: 11\r\n\r\n{\"coins\":5}",
        );
        let mut out = Vec::new();
        handle_proxy_request(&mut reader, &mut out, &req, &upstream, None).unwrap();
        assert!(handle.join().unwrap().ends_with("\r\n\r\n{\"coins\":5}"));
        assert!(String::from_utf8(out).unwrap().starts_with("HTTP/1.1 204 No Content\r\n"));
    }

    #[test]
    fn refused_connection_is_upstream_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let upstream = Upstream::parse(&format!("http://{}", addr)).unwrap();
        let (mut reader, req) = request("GET /api/x HTTP/1.1\r\nHost: x\r\n\r\n");
        let mut out = Vec::new();
        let err = handle_proxy_request(&mut reader, &mut out, &req, &upstream, None).unwrap_err();
        assert_eq!(err.status(), 502);
        assert!(out.is_empty());
    }

    #[test]
    fn upstream_closing_early_is_upstream_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            read_response_head(&mut reader).unwrap();
        });
        let upstream = Upstream::parse(&format!("http://{}", addr)).unwrap();
        let (mut reader, req) = request("GET /api/x HTTP/1.1\r\nHost: x\r\n\r\n");
        let err = handle_proxy_request(&mut reader, &mut Vec::new(), &req, &upstream, None)
            .unwrap_err();
        handle.join().unwrap();
        assert!(matches!(err, ServeError::UpstreamUnreachable { .. }));
    }

    #[test]
    fn silent_upstream_times_out_as_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            // Read the request, then never answer
            let mut reader = BufReader::new(stream);
            read_response_head(&mut reader).unwrap();
            thread::sleep(Duration::from_secs(2));
        });
        let mut upstream = Upstream::parse(&format!("http://{}", addr)).unwrap();
        upstream.timeout = Duration::from_millis(200);
        let (mut reader, req) = request("GET /api/x HTTP/1.1\r\nHost: x\r\n\r\n");

        let started = Instant::now();
        let err = handle_proxy_request(&mut reader, &mut Vec::new(), &req, &upstream, None)
            .unwrap_err();
        assert!(matches!(err, ServeError::UpstreamUnreachable { .. }));
        assert!(started.elapsed() < Duration::from_secs(2));
        handle.join().unwrap();
    }
}
