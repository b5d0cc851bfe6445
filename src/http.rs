use std::io::{self, BufRead, Read, Write};

use crate::error::ServeError;

/// Upper bound on request line plus headers.
const MAX_HEAD_BYTES: u64 = 64 * 1024;

/// A parsed HTTP/1.x request head. The body, if any, stays in the reader.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub target: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
}

impl Request {
    /// Reads a request head. Returns `Ok(None)` when the peer closed the
    /// connection without sending anything.
    pub fn read_from<R: BufRead>(reader: &mut R) -> Result<Option<Self>, ServeError> {
        let mut head = reader.by_ref().take(MAX_HEAD_BYTES);

        let mut first_line = String::new();
        if read_head_line(&mut head, &mut first_line)? == 0 {
            return Ok(None);
        }

        let mut parts = first_line.split_whitespace();
        let (method, target, version) = match (parts.next(), parts.next(), parts.next(), parts.next())
        {
            (Some(m), Some(t), Some(v), None) => (m, t, v),
            _ => {
                return Err(ServeError::BadRequest(format!(
                    "malformed request line: {}",
                    first_line.trim()
                )))
            }
        };
        if !version.starts_with("HTTP/1.") {
            return Err(ServeError::BadRequest(format!("unsupported version {}", version)));
        }
        if !target.starts_with('/') {
            return Err(ServeError::BadRequest(format!("unsupported target {}", target)));
        }

        let mut headers = Vec::new();
        let mut line = String::new();
        loop {
            line.clear();
            if read_head_line(&mut head, &mut line)? == 0 {
                return Err(ServeError::BadRequest("truncated request head".into()));
            }
            if line.trim().is_empty() {
                break;
            }
            log::trace!("Header line: {}", line.trim());
            match line.split_once(':') {
                Some((name, value)) => {
                    headers.push((name.trim().to_string(), value.trim().to_string()))
                }
                None => {
                    return Err(ServeError::BadRequest(format!(
                        "malformed header line: {}",
                        line.trim()
                    )))
                }
            }
        }

        Ok(Some(Request {
            method: method.to_string(),
            target: target.to_string(),
            version: version.to_string(),
            headers,
        }))
    }

    /// Target without the query string.
    pub fn path(&self) -> &str {
        self.target
            .split_once('?')
            .map_or(self.target.as_str(), |(path, _)| path)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_head(&self) -> bool {
        self.method == "HEAD"
    }
}

/// Reads one CRLF/LF terminated line. A line cut short by the size limit
/// or by EOF is reported as a bad request.
fn read_head_line<R: BufRead>(reader: &mut R, buf: &mut String) -> Result<usize, ServeError> {
    let n = reader.read_line(buf).map_err(|e| match e.kind() {
        io::ErrorKind::InvalidData => ServeError::BadRequest("request head is not UTF-8".into()),
        _ => ServeError::Io(e),
    })?;
    if n > 0 && !buf.ends_with('\n') {
        return Err(ServeError::BadRequest(
            "request head too large or truncated".into(),
        ));
    }
    Ok(n)
}

pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        100 => "Continue",
        200 => "OK",
        204 => "No Content",
        304 => "Not Modified",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        _ => "",
    }
}

/// Outcome of a request that produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Served {
    pub status: u16,
    /// Body bytes written to the client.
    pub bytes: u64,
}

/// Status line and headers of a locally generated response.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: u16,
    pub headers: Vec<(String, String)>,
}

impl ResponseHead {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// Writes the head in a single `write_all` so small responses do not
    /// trickle out header by header.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let mut buf = Vec::with_capacity(256);
        write!(
            buf,
            "HTTP/1.1 {} {}\r\n",
            self.status,
            reason_phrase(self.status)
        )?;
        for (key, value) in &self.headers {
            write!(buf, "{}: {}\r\n", key, value)?;
        }
        buf.extend_from_slice(b"Connection: close\r\n\r\n");
        writer.write_all(&buf)
    }
}

/// Writes a complete plain-text response and returns the body length sent.
pub fn write_plain<W: Write>(
    writer: &mut W,
    status: u16,
    body: &str,
    extra_headers: &[(&str, &str)],
    head_only: bool,
) -> io::Result<u64> {
    let mut head = ResponseHead::new(status)
        .header("Content-Type", "text/plain; charset=utf-8")
        .header("Content-Length", body.len().to_string());
    for (name, value) in extra_headers {
        head = head.header(name, *value);
    }
    head.write_to(writer)?;
    if head_only {
        writer.flush()?;
        return Ok(0);
    }
    writer.write_all(body.as_bytes())?;
    writer.flush()?;
    Ok(body.len() as u64)
}
