use regex::Regex;
use std::path::PathBuf;

use super::{mime_for, open_regular_file, DocumentRoot, FileResponse};
use crate::error::ServeError;

#[derive(Debug, Clone)]
pub struct SpaConfig {
    pub index_path: PathBuf,
    /// Request paths that must 404 rather than receive the entry document.
    pub exclude: Vec<Regex>,
}

impl Default for SpaConfig {
    fn default() -> Self {
        Self {
            index_path: PathBuf::from("index.html"),
            exclude: Vec::new(),
        }
    }
}

impl SpaConfig {
    pub fn new(index_path: PathBuf, exclude: Vec<Regex>) -> Self {
        Self {
            index_path,
            exclude,
        }
    }

    pub fn is_excluded(&self, request_path: &str) -> bool {
        self.exclude.iter().any(|re| re.is_match(request_path))
    }
}

/// Last stop of the routing chain: the entry document with status 200.
pub fn serve_fallback(root: &DocumentRoot, request_path: &str) -> Result<FileResponse, ServeError> {
    if root.spa.is_excluded(request_path) {
        log::debug!("Path '{}' is excluded from SPA fallback", request_path);
        return Err(ServeError::NotFound(request_path.to_string()));
    }

    let index = root.entry_document();
    log::debug!("Falling back to entry document for {}", request_path);

    match open_regular_file(&index)? {
        Some((file, metadata)) => Ok(FileResponse {
            file,
            len: metadata.len(),
            modified: metadata.modified().ok(),
            mime_type: mime_for(&index),
            encoding: None,
            headers: root.cache_headers(&index),
            path: index,
        }),
        None => {
            log::warn!("Entry document missing: {}", index.display());
            Err(ServeError::NotFound(request_path.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Read;

    fn root_with_index(exclude: Vec<Regex>) -> (tempfile::TempDir, DocumentRoot) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.html"), "<html>game</html>").unwrap();
        let root = DocumentRoot::open(
            dir.path(),
            SpaConfig::new(PathBuf::from("index.html"), exclude),
            0,
        )
        .unwrap();
        (dir, root)
    }

    #[test]
    fn serves_entry_document() {
        let (_dir, root) = root_with_index(Vec::new());
        let mut response = serve_fallback(&root, "/some/client-route").unwrap();
        let mut body = String::new();
        response.file.read_to_string(&mut body).unwrap();
        assert_eq!(body, "<html>game</html>");
        assert_eq!(response.mime_type, "text/html; charset=utf-8");
        assert!(response.encoding.is_none());
    }

    #[test]
    fn excluded_paths_are_not_found() {
        let (_dir, root) = root_with_index(vec![Regex::new(r"\.(png|css)$").unwrap()]);
        assert!(matches!(
            serve_fallback(&root, "/img/missing.png"),
            Err(ServeError::NotFound(_))
        ));
        assert!(serve_fallback(&root, "/leaderboard").is_ok());
    }

    #[test]
    fn missing_entry_document_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let root = DocumentRoot::open(dir.path(), SpaConfig::default(), 0).unwrap();
        assert!(matches!(
            serve_fallback(&root, "/anything"),
            Err(ServeError::NotFound(_))
        ));
    }
}
