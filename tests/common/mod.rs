//! Shared helpers: start a server on an ephemeral port and talk raw HTTP/1.1.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::Path;
use std::thread;

use brserve::args::Args;
use brserve::config::Config;
use brserve::server::Server;
use clap::Parser;

pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Starts a server for `root` with extra CLI flags and returns its address.
pub fn start_server(root: &Path, extra: &[&str]) -> SocketAddr {
    let mut argv = vec![
        "brserve",
        "--host",
        "127.0.0.1",
        "--port",
        "0",
        "--serve-dir",
        root.to_str().unwrap(),
    ];
    argv.extend_from_slice(extra);
    let args = Args::try_parse_from(argv).unwrap();
    let config = Config::from_args(&args).unwrap();
    let server = Server::bind(config).unwrap();
    let addr = server.local_addr().unwrap();
    thread::spawn(move || server.run());
    addr
}

/// Sends `raw` verbatim and reads until the server closes the connection.
pub fn send_raw(addr: SocketAddr, raw: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.write_all(raw).unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).unwrap();
    out
}

pub fn request(addr: SocketAddr, method: &str, target: &str) -> Response {
    let raw = format!(
        "{} {} HTTP/1.1\r\nHost: localhost\r\nAccept-Encoding: gzip, deflate, br\r\n\r\n",
        method, target
    );
    parse_response(&send_raw(addr, raw.as_bytes()))
}

pub fn get(addr: SocketAddr, target: &str) -> Response {
    request(addr, "GET", target)
}

pub fn parse_response(raw: &[u8]) -> Response {
    let split = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response has no header terminator");
    let head = std::str::from_utf8(&raw[..split]).unwrap();
    let mut lines = head.split("\r\n");
    let status = lines
        .next()
        .unwrap()
        .split_whitespace()
        .nth(1)
        .unwrap()
        .parse()
        .unwrap();
    let headers = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();
    Response {
        status,
        headers,
        body: raw[split + 4..].to_vec(),
    }
}
