use std::io::Write;
use std::path::Path;

use super::assets::resolve_asset;
use super::spa::serve_fallback;
use super::{
    decode_path, has_hidden_segment, mime_for, open_regular_file, sanitize_path, DocumentRoot,
    FileResponse,
};
use crate::compression::{accepts, AssetFamily};
use crate::error::ServeError;
use crate::http::{Request, Served};

/// Serves a literal file from the document root. Directories resolve to
/// their `index.html`; anything absent yields `Ok(None)` so the caller can
/// fall through. Dotfiles and dot-directories count as absent.
pub fn serve_static(
    root: &DocumentRoot,
    request_path: &str,
) -> Result<Option<FileResponse>, ServeError> {
    log::debug!("Received request for path: {}", request_path);

    let path = sanitize_path(root.base(), request_path)?;
    if has_hidden_segment(&decode_path(request_path)?) {
        log::debug!("Ignoring hidden path {}", request_path);
        return Ok(None);
    }

    let final_path = if path.is_dir() {
        log::debug!("Path is a directory, looking for index.html");
        path.join("index.html")
    } else {
        path
    };

    log::debug!("Final resolved path: {}", final_path.display());

    Ok(open_regular_file(&final_path)?.map(|(file, metadata)| FileResponse {
        file,
        len: metadata.len(),
        modified: metadata.modified().ok(),
        mime_type: mime_for(&final_path),
        encoding: None,
        headers: root.cache_headers(&final_path),
        path: final_path,
    }))
}

/// Runs a GET/HEAD request through the asset resolver, the static file
/// server and finally the SPA fallback, and writes the response.
pub fn handle_file_request<W: Write>(
    client: &mut W,
    root: &DocumentRoot,
    request: &Request,
    asset: Option<AssetFamily>,
) -> Result<Served, ServeError> {
    let request_path = request.path();

    let response = match asset {
        Some(family) => {
            if let Some(accept) = request.header("accept-encoding") {
                if !accepts(accept, family.encoding()) {
                    log::debug!(
                        "Client did not advertise {} for {}, serving it anyway",
                        family.encoding().header_value(),
                        request_path
                    );
                }
            }
            resolve_asset(root, family, request_path)?
        }
        None => match serve_static(root, request_path)? {
            Some(response) => response,
            None => serve_fallback(root, request_path)?,
        },
    };

    if response.is_fresh(
        request.header("if-none-match"),
        request.header("if-modified-since"),
    ) {
        log::debug!(
            "Not modified: {}",
            display_relative(root.base(), &response.path)
        );
        response.write_not_modified(client)?;
        return Ok(Served { status: 304, bytes: 0 });
    }

    log::debug!(
        "Serving {} as {}",
        display_relative(root.base(), &response.path),
        response.mime_type
    );
    let bytes = response.write_to(client, request.is_head())?;
    Ok(Served { status: 200, bytes })
}

fn display_relative(base: &Path, path: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .display()
        .to_string()
}
