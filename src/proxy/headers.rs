use log::debug;

use super::Upstream;

/// Hop-by-hop headers that describe the client connection, not the request.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "upgrade",
    "expect",
];

/// Builds the header list sent upstream: `Host` is rewritten to the
/// upstream's authority, hop-by-hop headers are dropped and the usual
/// `X-Forwarded-*` headers are appended.
pub fn rewrite_request_headers(
    headers: &[(String, String)],
    upstream: &Upstream,
    client_ip: Option<&str>,
) -> Vec<(String, String)> {
    let original_host = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("host"))
        .map(|(_, v)| v.clone());
    let prior_forwarded_for = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("x-forwarded-for"))
        .map(|(_, v)| v.clone());

    let mut rewritten: Vec<(String, String)> = headers
        .iter()
        .filter(|(k, _)| {
            let key = k.to_lowercase();
            key != "host" && key != "x-forwarded-for" && !HOP_BY_HOP.contains(&key.as_str())
        })
        .cloned()
        .collect();

    rewritten.insert(0, ("Host".to_string(), upstream.host_header.clone()));

    if let Some(ip) = client_ip {
        let forwarded_for = match prior_forwarded_for {
            Some(prior) => format!("{}, {}", prior, ip),
            None => ip.to_string(),
        };
        rewritten.push(("X-Forwarded-For".to_string(), forwarded_for));
    } else if let Some(prior) = prior_forwarded_for {
        rewritten.push(("X-Forwarded-For".to_string(), prior));
    }
    if let Some(host) = original_host {
        if !headers
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case("x-forwarded-host"))
        {
            rewritten.push(("X-Forwarded-Host".to_string(), host));
        }
    }
    if !headers
        .iter()
        .any(|(k, _)| k.eq_ignore_ascii_case("x-forwarded-proto"))
    {
        rewritten.push(("X-Forwarded-Proto".to_string(), "http".to_string()));
    }
    rewritten.push(("Connection".to_string(), "close".to_string()));

    debug!("Rewrote {} request headers for {}", rewritten.len(), upstream);
    rewritten
}

pub fn parse_response_headers(headers: &str) -> (&str, Vec<(String, String)>) {
    debug!("Parsing response headers");

    let mut lines = headers.lines();
    let status_line = lines.next().unwrap_or("").trim_end();
    debug!("Status line: {}", status_line);

    let headers = lines
        .filter_map(|line| match line.split_once(':') {
            Some((key, value)) => {
                let key = key.trim().to_lowercase();
                let value = value.trim().to_string();
                debug!("Header: {} = {}", key, value);
                Some((key, value))
            }
            None => {
                if !line.trim().is_empty() {
                    debug!("Skipping invalid header line: {}", line);
                }
                None
            }
        })
        .collect();

    (status_line, headers)
}

/// Status code from an upstream status line such as `HTTP/1.1 200 OK`.
pub fn parse_status(status_line: &str) -> Option<u16> {
    let mut parts = status_line.split_whitespace();
    let version = parts.next()?;
    if !version.starts_with("HTTP/") {
        return None;
    }
    parts.next()?.parse().ok()
}

/// How the upstream delimits its response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    None,
    Chunked,
    Length(u64),
    UntilClose,
}

pub fn response_framing(status: u16, request_method: &str, headers: &[(String, String)]) -> BodyFraming {
    if request_method == "HEAD" || (100..200).contains(&status) || status == 204 || status == 304 {
        return BodyFraming::None;
    }
    body_framing(headers).unwrap_or(BodyFraming::UntilClose)
}

/// Framing declared by a header list, if any. Keys are compared
/// case-insensitively.
pub fn body_framing(headers: &[(String, String)]) -> Option<BodyFraming> {
    let is_chunked = headers.iter().any(|(k, v)| {
        k.eq_ignore_ascii_case("transfer-encoding") && v.to_lowercase().contains("chunked")
    });
    if is_chunked {
        return Some(BodyFraming::Chunked);
    }
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<u64>().ok())
        .map(BodyFraming::Length)
}

/// Re-serializes an upstream response head, leaving everything as received
/// except the connection-management headers, which are replaced by
/// `Connection: close` because each client connection carries one exchange.
pub fn relay_response_head(raw: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len() + 32);
    let mut lines = raw.lines();
    out.extend_from_slice(lines.next().unwrap_or("").trim_end().as_bytes());
    out.extend_from_slice(b"\r\n");
    let mut relayed = 0;
    for line in lines {
        let Some((key, _)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.eq_ignore_ascii_case("connection")
            || key.eq_ignore_ascii_case("keep-alive")
            || key.eq_ignore_ascii_case("proxy-connection")
        {
            continue;
        }
        out.extend_from_slice(line.trim_end_matches('\r').as_bytes());
        out.extend_from_slice(b"\r\n");
        relayed += 1;
    }
    debug!("Relaying {} upstream headers", relayed);
    out.extend_from_slice(b"Connection: close\r\n\r\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream() -> Upstream {
        Upstream::parse("http://127.0.0.1:8000").unwrap()
    }

    fn pairs(list: &[(&str, &str)]) -> Vec<(String, String)> {
        list.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn host_is_rewritten_to_upstream() {
        let headers = pairs(&[
            ("Host", "game.example.com"),
            ("Accept", "application/json"),
            ("Connection", "keep-alive"),
        ]);
        let rewritten = rewrite_request_headers(&headers, &upstream(), Some("10.0.0.7"));
        assert_eq!(rewritten[0], ("Host".into(), "127.0.0.1:8000".into()));
        assert!(rewritten.contains(&("Accept".into(), "application/json".into())));
        assert!(rewritten.contains(&("X-Forwarded-For".into(), "10.0.0.7".into())));
        assert!(rewritten.contains(&("X-Forwarded-Host".into(), "game.example.com".into())));
        assert!(rewritten.contains(&("X-Forwarded-Proto".into(), "http".into())));
        let connections: Vec<_> = rewritten
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("connection"))
            .collect();
        assert_eq!(connections, vec![&("Connection".to_string(), "close".to_string())]);
    }

    #[test]
    fn forwarded_for_chain_is_extended() {
        let headers = pairs(&[("Host", "a"), ("X-Forwarded-For", "1.1.1.1")]);
        let rewritten = rewrite_request_headers(&headers, &upstream(), Some("2.2.2.2"));
        assert!(rewritten.contains(&("X-Forwarded-For".into(), "1.1.1.1, 2.2.2.2".into())));
    }

    #[test]
    fn parses_upstream_head() {
        let raw = "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 17\r\n\r\n";
        let (status_line, headers) = parse_response_headers(raw);
        assert_eq!(status_line, "HTTP/1.1 200 OK");
        assert_eq!(parse_status(status_line), Some(200));
        assert_eq!(
            response_framing(200, "GET", &headers),
            BodyFraming::Length(17)
        );
        assert_eq!(response_framing(200, "HEAD", &headers), BodyFraming::None);
    }

    #[test]
    fn framing_rules() {
        let chunked = pairs(&[("transfer-encoding", "gzip, chunked"), ("content-length", "5")]);
        assert_eq!(response_framing(200, "GET", &chunked), BodyFraming::Chunked);
        assert_eq!(response_framing(204, "GET", &chunked), BodyFraming::None);
        assert_eq!(response_framing(304, "GET", &[]), BodyFraming::None);
        assert_eq!(response_framing(200, "GET", &[]), BodyFraming::UntilClose);
        assert_eq!(body_framing(&[]), None);
    }

    #[test]
    fn relayed_head_keeps_headers_but_closes() {
        let raw = "HTTP/1.1 201 Created\r\nX-Balance: 42\r\nConnection: keep-alive\r\nKeep-Alive: timeout=5\r\n\r\n";
        let relayed = String::from_utf8(relay_response_head(raw)).unwrap();
        assert_eq!(
            relayed,
            "HTTP/1.1 201 Created\r\nX-Balance: 42\r\nConnection: close\r\n\r\n"
        );
    }

    #[test]
    fn status_parsing_rejects_garbage() {
        assert_eq!(parse_status("garbage"), None);
        assert_eq!(parse_status("HTTP/1.1 abc"), None);
    }
}
