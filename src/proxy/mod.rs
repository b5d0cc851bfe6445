pub mod handlers;
pub mod headers;
pub mod transfer;

use std::fmt;
use std::time::Duration;

/// Default bound on each upstream read or write.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(60);

/// Where `/api` traffic goes. Only plain `http://` origins are supported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    /// `host:port` to connect to.
    pub addr: String,
    /// Value sent as `Host`, as written in the URL.
    pub host_header: String,
    /// Path the upstream is mounted under, without a trailing slash.
    pub base_path: String,
    /// Read/write timeout on the upstream socket.
    pub timeout: Duration,
}

impl Upstream {
    pub fn parse(url: &str) -> Result<Self, String> {
        let rest = url
            .strip_prefix("http://")
            .ok_or_else(|| format!("upstream {} must start with http://", url))?;

        let (authority, path) = match rest.find('/') {
            Some(idx) => rest.split_at(idx),
            None => (rest, ""),
        };
        if authority.is_empty() || authority.contains('@') {
            return Err(format!("upstream {} has no usable host", url));
        }
        if path.contains('?') || path.contains('#') {
            return Err(format!("upstream {} must not carry a query or fragment", url));
        }

        let addr = match authority.rfind(':') {
            // A colon inside brackets belongs to an IPv6 literal, not a port
            Some(idx) if !authority[idx..].contains(']') => {
                authority[idx + 1..]
                    .parse::<u16>()
                    .map_err(|_| format!("upstream {} has an invalid port", url))?;
                authority.to_string()
            }
            _ => format!("{}:80", authority),
        };

        Ok(Self {
            addr,
            host_header: authority.to_string(),
            base_path: path.trim_end_matches('/').to_string(),
            timeout: DEFAULT_UPSTREAM_TIMEOUT,
        })
    }

    /// Request target to send upstream for a client target.
    pub fn target_for(&self, client_target: &str) -> String {
        format!("{}{}", self.base_path, client_target)
    }
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "http://{}{}", self.host_header, self.base_path)
    }
}
