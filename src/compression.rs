/// Content encoding of a pre-compressed file on disk.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Encoding {
    Brotli,
}

impl Encoding {
    /// File suffix the build pipeline appends to compressed artifacts.
    pub fn suffix(self) -> &'static str {
        match self {
            Encoding::Brotli => ".br",
        }
    }

    /// Value for the `Content-Encoding` header.
    pub fn header_value(self) -> &'static str {
        match self {
            Encoding::Brotli => "br",
        }
    }
}

/// The three kinds of pre-compressed build output that get relabelled
/// instead of served as opaque `.br` files.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum AssetFamily {
    Script,
    WasmModule,
    Data,
}

impl AssetFamily {
    /// Evaluation order. The suffixes are disjoint so the order only
    /// matters for readability of the logs.
    pub const ALL: [AssetFamily; 3] = [
        AssetFamily::Script,
        AssetFamily::WasmModule,
        AssetFamily::Data,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            AssetFamily::Script => ".js",
            AssetFamily::WasmModule => ".wasm",
            AssetFamily::Data => ".data",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            AssetFamily::Script => "application/javascript",
            AssetFamily::WasmModule => "application/wasm",
            AssetFamily::Data => "application/octet-stream",
        }
    }

    pub fn encoding(self) -> Encoding {
        Encoding::Brotli
    }

    /// Matches `*.js.br`, `*.wasm.br` and `*.data.br`. Case-sensitive, and
    /// the query string must already be stripped.
    pub fn classify(path: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|family| {
            path.strip_suffix(family.encoding().suffix())
                .is_some_and(|stem| stem.ends_with(family.extension()))
        })
    }
}

/// Whether an `Accept-Encoding` header value lists `encoding`.
///
/// Only used for diagnostics: pre-compressed assets are served as-is
/// regardless, because the build has no uncompressed twin to fall back on.
pub fn accepts(accept_encoding: &str, encoding: Encoding) -> bool {
    let binding = accept_encoding.to_lowercase();
    binding
        .split(',')
        .map(|s| s.split(';').next().unwrap_or("").trim())
        .any(|e| e == encoding.header_value() || e == "*")
}
