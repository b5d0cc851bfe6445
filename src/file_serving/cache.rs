//! Validators for conditional GETs: `ETag`, `Last-Modified` and the
//! matching `If-None-Match` / `If-Modified-Since` checks.

use std::time::{SystemTime, UNIX_EPOCH};

/// Weak `ETag` built from size and modification time in milliseconds,
/// e.g. `W/"4d2-18b7e3f1a20"`.
pub fn weak_etag(len: u64, modified: Option<SystemTime>) -> String {
    let millis = modified
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_millis());
    format!("W/\"{:x}-{:x}\"", len, millis)
}

pub fn last_modified(modified: SystemTime) -> String {
    httpdate::fmt_http_date(modified)
}

/// Weak comparison against a client's `If-None-Match` list. `*` matches
/// anything.
pub fn etag_matches(if_none_match: &str, etag: &str) -> bool {
    let opaque = |tag: &str| tag.trim().trim_start_matches("W/").to_string();
    let ours = opaque(etag);
    if_none_match
        .split(',')
        .any(|candidate| candidate.trim() == "*" || opaque(candidate) == ours)
}

/// True when the file has not changed since the client's copy. HTTP dates
/// carry whole seconds, so the modification time is truncated first.
/// Unparseable dates never match.
pub fn not_modified_since(if_modified_since: &str, modified: SystemTime) -> bool {
    let since = match httpdate::parse_http_date(if_modified_since.trim()) {
        Ok(since) => since,
        Err(e) => {
            log::debug!("Ignoring If-Modified-Since {:?}: {}", if_modified_since, e);
            return false;
        }
    };
    let secs = |t: SystemTime| t.duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs());
    secs(modified) <= secs(since)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn etag_encodes_size_and_mtime() {
        assert_eq!(weak_etag(16, Some(at(1))), "W/\"10-3e8\"");
        assert_eq!(weak_etag(0, None), "W/\"0-0\"");
    }

    #[test]
    fn etag_lists_and_wildcard() {
        let etag = weak_etag(16, Some(at(1)));
        assert!(etag_matches("W/\"10-3e8\"", &etag));
        assert!(etag_matches("\"other\", \"10-3e8\"", &etag));
        assert!(etag_matches("*", &etag));
        assert!(!etag_matches("W/\"10-3e9\"", &etag));
    }

    #[test]
    fn modified_since_uses_whole_seconds() {
        let modified = at(1_700_000_000) + Duration::from_millis(750);
        let header = last_modified(modified);
        assert_eq!(header, "Tue, 14 Nov 2023 22:13:20 GMT");
        assert!(not_modified_since(&header, modified));
        assert!(not_modified_since("Thu, 01 Jan 2099 00:00:00 GMT", modified));
        assert!(!not_modified_since("Sun, 06 Nov 1994 08:49:37 GMT", modified));
        assert!(!not_modified_since("yesterday", modified));
    }
}
