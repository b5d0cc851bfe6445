use percent_encoding::percent_decode_str;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Instant;

use crate::error::ServeError;

/// Strips the query string and percent-decodes a request path. Invalid
/// UTF-8 and NUL bytes are rejected (400).
pub fn decode_path(request_path: &str) -> Result<String, ServeError> {
    let path_without_query = request_path.split('?').next().unwrap_or(request_path);

    let decoded_path = percent_decode_str(path_without_query)
        .decode_utf8()
        .map_err(|e| ServeError::BadRequest(format!("undecodable path {}: {}", request_path, e)))?;

    if decoded_path.contains('\0') {
        return Err(ServeError::BadRequest(format!(
            "NUL byte in path {}",
            request_path
        )));
    }
    Ok(decoded_path.into_owned())
}

/// Whether any segment of a decoded path names a dotfile or dot-directory.
pub fn has_hidden_segment(decoded_path: &str) -> bool {
    decoded_path
        .split('/')
        .any(|segment| segment.starts_with('.') && segment != "." && segment != "..")
}

/// Maps a request path onto the filesystem under `canonical_base`.
///
/// The path is percent-decoded and must not contain `..` segments (400).
/// Paths that resolve outside the base through a symlink are treated as
/// missing (404). Paths that do not exist yet are returned as joined.
pub fn sanitize_path(canonical_base: &Path, request_path: &str) -> Result<PathBuf, ServeError> {
    let start_time = Instant::now();
    log::debug!(
        "Sanitizing path - base: {}, request: {}",
        canonical_base.display(),
        request_path
    );

    let decoded_path = decode_path(request_path)?;

    let mut cleaned_path = PathBuf::new();
    for component in Path::new(&decoded_path).components() {
        match component {
            Component::Normal(segment) => cleaned_path.push(segment),
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir | Component::Prefix(_) => {
                log::warn!("Rejecting path with traversal segment: {}", request_path);
                return Err(ServeError::BadRequest(format!(
                    "path escapes document root: {}",
                    request_path
                )));
            }
        }
    }
    log::debug!("Cleaned path: {}", cleaned_path.display());

    let requested_path = canonical_base.join(&cleaned_path);

    match fs::canonicalize(&requested_path) {
        Ok(path) => {
            log::debug!(
                "Path sanitization complete in {:?} - result: {}",
                start_time.elapsed(),
                path.display()
            );

            if path.starts_with(canonical_base) {
                Ok(path)
            } else {
                log::warn!("Path escapes base directory: {}", path.display());
                Err(ServeError::NotFound(request_path.to_string()))
            }
        }
        Err(e) => {
            log::debug!(
                "Using non-canonicalized path ({}): {}",
                e,
                requested_path.display()
            );
            Ok(requested_path)
        }
    }
}
