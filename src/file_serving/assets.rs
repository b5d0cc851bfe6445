use super::{decode_path, has_hidden_segment, open_regular_file, sanitize_path, DocumentRoot, FileResponse};
use crate::compression::AssetFamily;
use crate::error::ServeError;

/// Resolves a pre-compressed build artifact. The file is served verbatim;
/// only the headers describe what is inside.
pub fn resolve_asset(
    root: &DocumentRoot,
    family: AssetFamily,
    request_path: &str,
) -> Result<FileResponse, ServeError> {
    if has_hidden_segment(&decode_path(request_path)?) {
        log::debug!("Refusing hidden asset path {}", request_path);
        return Err(ServeError::AssetNotFound(request_path.to_string()));
    }

    let path = match sanitize_path(root.base(), request_path) {
        Ok(p) => p,
        Err(ServeError::NotFound(_)) => {
            return Err(ServeError::AssetNotFound(request_path.to_string()))
        }
        Err(e) => return Err(e),
    };

    match open_regular_file(&path)? {
        Some((file, metadata)) => {
            log::debug!(
                "Serving {:?} asset {} ({} bytes)",
                family,
                path.display(),
                metadata.len()
            );
            Ok(FileResponse {
                file,
                len: metadata.len(),
                modified: metadata.modified().ok(),
                mime_type: family.content_type().to_string(),
                encoding: Some(family.encoding()),
                headers: root.cache_headers(&path),
                path,
            })
        }
        None => {
            log::debug!("Compressed asset missing: {}", path.display());
            Err(ServeError::AssetNotFound(request_path.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::Encoding;
    use crate::file_serving::spa::SpaConfig;
    use std::fs;
    use std::io::Read;

    fn root() -> (tempfile::TempDir, DocumentRoot) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("game")).unwrap();
        let root = DocumentRoot::open(dir.path(), SpaConfig::default(), 0).unwrap();
        (dir, root)
    }

    #[test]
    fn labels_wasm_module() {
        let (dir, root) = root();
        let payload: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        fs::write(dir.path().join("game/build.wasm.br"), &payload).unwrap();

        let mut response =
            resolve_asset(&root, AssetFamily::WasmModule, "/game/build.wasm.br").unwrap();
        assert_eq!(response.mime_type, "application/wasm");
        assert_eq!(response.encoding, Some(Encoding::Brotli));
        assert_eq!(response.len, 4096);

        let mut body = Vec::new();
        response.file.read_to_end(&mut body).unwrap();
        assert_eq!(body, payload);
    }

    #[test]
    fn missing_asset_is_asset_not_found() {
        let (_dir, root) = root();
        let err = resolve_asset(&root, AssetFamily::Data, "/game/missing.data.br").unwrap_err();
        assert!(matches!(err, ServeError::AssetNotFound(_)));
        assert_eq!(err.body(), "File not found");
    }

    #[test]
    fn hidden_directories_are_not_served() {
        let (dir, root) = root();
        fs::create_dir(dir.path().join("game/.staging")).unwrap();
        fs::write(dir.path().join("game/.staging/build.wasm.br"), b"x").unwrap();
        assert!(matches!(
            resolve_asset(&root, AssetFamily::WasmModule, "/game/.staging/build.wasm.br"),
            Err(ServeError::AssetNotFound(_))
        ));
    }

    #[test]
    fn directory_named_like_an_asset_is_not_served() {
        let (dir, root) = root();
        fs::create_dir(dir.path().join("game/odd.js.br")).unwrap();
        assert!(matches!(
            resolve_asset(&root, AssetFamily::Script, "/game/odd.js.br"),
            Err(ServeError::AssetNotFound(_))
        ));
    }
}
