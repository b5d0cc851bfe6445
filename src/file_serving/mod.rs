pub mod assets;
mod cache;
pub mod handlers;
mod path_utils;
pub mod spa;

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::compression::Encoding;
use crate::error::ServeError;
use crate::http::ResponseHead;
use crate::logging::LoggingExt;

pub use path_utils::{decode_path, has_hidden_segment, sanitize_path};
use spa::SpaConfig;

/// The directory everything is served from, canonicalized once at startup.
#[derive(Debug, Clone)]
pub struct DocumentRoot {
    base: PathBuf,
    pub spa: SpaConfig,
    pub max_age: u32,
}

impl DocumentRoot {
    pub fn open(dir: &Path, spa: SpaConfig, max_age: u32) -> io::Result<Self> {
        let base = dir
            .display()
            .log_operation("canonicalize", || fs::canonicalize(dir))?;
        if !base.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a directory", base.display()),
            ));
        }
        Ok(Self { base, spa, max_age })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn entry_document(&self) -> PathBuf {
        self.base.join(&self.spa.index_path)
    }

    fn cache_headers(&self, path: &Path) -> Vec<(String, String)> {
        let is_index = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.eq_ignore_ascii_case("index.html"))
            .unwrap_or(false)
            || path == self.entry_document();

        if is_index {
            vec![(
                "Cache-Control".to_string(),
                "no-cache, no-store, must-revalidate".to_string(),
            )]
        } else {
            vec![(
                "Cache-Control".to_string(),
                format!("public, max-age={}", self.max_age),
            )]
        }
    }
}

/// An open file plus everything needed to describe it on the wire. The
/// body is streamed from `file` when the response is written.
#[derive(Debug)]
pub struct FileResponse {
    pub file: File,
    pub path: PathBuf,
    pub len: u64,
    pub modified: Option<SystemTime>,
    pub mime_type: String,
    pub encoding: Option<Encoding>,
    pub headers: Vec<(String, String)>,
}

impl FileResponse {
    pub fn etag(&self) -> String {
        cache::weak_etag(self.len, self.modified)
    }

    /// Whether the client's cached copy is current. `If-None-Match` takes
    /// precedence over `If-Modified-Since` when both are sent.
    pub fn is_fresh(&self, if_none_match: Option<&str>, if_modified_since: Option<&str>) -> bool {
        if let Some(tags) = if_none_match {
            return cache::etag_matches(tags, &self.etag());
        }
        match (if_modified_since, self.modified) {
            (Some(since), Some(modified)) => cache::not_modified_since(since, modified),
            _ => false,
        }
    }

    fn validators(&self, mut head: ResponseHead) -> ResponseHead {
        for (key, value) in &self.headers {
            head = head.header(key, value.as_str());
        }
        head = head.header("ETag", self.etag());
        if let Some(modified) = self.modified {
            head = head.header("Last-Modified", cache::last_modified(modified));
        }
        head
    }

    pub fn head(&self) -> ResponseHead {
        let mut head = ResponseHead::new(200).header("Content-Type", self.mime_type.as_str());
        if let Some(encoding) = self.encoding {
            head = head
                .header("Content-Encoding", encoding.header_value())
                .header("Vary", "Accept-Encoding");
        }
        self.validators(head)
            .header("X-Content-Type-Options", "nosniff")
            .header("Content-Length", self.len.to_string())
    }

    /// Answers a conditional GET with 304 and no body.
    pub fn write_not_modified<W: Write>(self, client: &mut W) -> io::Result<()> {
        let mut head = ResponseHead::new(304);
        if self.encoding.is_some() {
            head = head.header("Vary", "Accept-Encoding");
        }
        self.validators(head).write_to(client)?;
        client.flush()
    }

    /// Writes head and body, copying the file in bounded chunks. Returns
    /// the number of body bytes sent.
    pub fn write_to<W: Write>(self, client: &mut W, head_only: bool) -> io::Result<u64> {
        self.head().write_to(client)?;
        if head_only {
            client.flush()?;
            return Ok(0);
        }
        let mut body = io::Read::take(self.file, self.len);
        let sent = io::copy(&mut body, client)?;
        client.flush()?;
        log::trace!("Streamed {} bytes from {}", sent, self.path.display());
        Ok(sent)
    }
}

/// Opens `path` if it is a regular file. Missing files come back as
/// `Ok(None)`; anything else that stops us from reading is an error.
fn open_regular_file(path: &Path) -> Result<Option<(File, fs::Metadata)>, ServeError> {
    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) => {
            log::debug!("No file at {}: {}", path.display(), e);
            return Ok(None);
        }
    };
    if !metadata.is_file() {
        log::debug!("Not a regular file: {}", path.display());
        return Ok(None);
    }
    let file = File::open(path).map_err(ServeError::Internal)?;
    Ok(Some((file, metadata)))
}

fn mime_for(path: &Path) -> String {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if mime.type_() == mime_guess::mime::TEXT || mime.subtype() == "javascript" {
        format!("{}; charset=utf-8", mime.essence_str())
    } else {
        mime.essence_str().to_string()
    }
}
