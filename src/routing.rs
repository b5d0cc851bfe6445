use crate::compression::AssetFamily;
use crate::error::ServeError;
use crate::file_serving::decode_path;

/// Where a request goes. Produced by [`Router::route`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Forward to the upstream, any method.
    Proxy,
    /// Pre-compressed build artifact of a known family.
    Asset(AssetFamily),
    /// Literal file if present, otherwise the entry document.
    Static,
    /// Not a GET/HEAD outside the proxy prefix.
    MethodNotAllowed,
}

#[derive(Debug, Clone, Default)]
pub struct Router {
    proxy_prefix: Option<String>,
}

impl Router {
    /// `proxy_prefix` is only set in proxy mode. A trailing slash is ignored.
    pub fn new(proxy_prefix: Option<&str>) -> Self {
        Self {
            proxy_prefix: proxy_prefix.map(|p| p.trim_end_matches('/').to_string()),
        }
    }

    /// Evaluates the rules in priority order: proxy prefix, method check,
    /// asset families, then static/fallback.
    ///
    /// The proxy prefix is matched on the raw path, which is also what the
    /// upstream receives. Asset families are matched on the decoded path,
    /// the same one the file lookup uses.
    pub fn route(&self, method: &str, path: &str) -> Result<Route, ServeError> {
        if self.is_proxied(path) {
            return Ok(Route::Proxy);
        }
        if method != "GET" && method != "HEAD" {
            return Ok(Route::MethodNotAllowed);
        }
        Ok(match AssetFamily::classify(&decode_path(path)?) {
            Some(family) => Route::Asset(family),
            None => Route::Static,
        })
    }

    fn is_proxied(&self, path: &str) -> bool {
        match &self.proxy_prefix {
            // An empty prefix (configured as "/") forwards everything.
            Some(prefix) if prefix.is_empty() => true,
            Some(prefix) => path
                .strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/')),
            None => false,
        }
    }
}
