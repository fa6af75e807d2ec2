//! Static-file serving from the doc root, for any request that isn't an
//! `/api/*` route or a websocket upgrade.

use std::path::{Path, PathBuf};

use axum::body::Body;
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};

/// Joins `doc_root` and a request path that has already been checked for
/// `..` segments, matching the original's `path_cat` helper.
fn path_cat(doc_root: &Path, request_path: &str) -> PathBuf {
    doc_root.join(request_path.trim_start_matches('/'))
}

/// Serves `request_path` (the decoded path portion of the request target)
/// from `doc_root`. Rejects non-absolute paths and any path containing
/// `..`; `/` maps to `index.html`; an extension-less path gets `.html`
/// appended; the MIME type is inferred from the final extension.
pub async fn serve(method: &Method, request_path: &str, doc_root: &Path) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    if !request_path.starts_with('/') || request_path.contains("..") {
        return (StatusCode::BAD_REQUEST, "Illegal request-target").into_response();
    }

    let mut target_path = request_path.to_owned();
    if target_path == "/" {
        target_path = "/index.html".to_owned();
    }

    let mut path = path_cat(doc_root, &target_path);
    if path.extension().is_none() {
        let mut with_ext = path.into_os_string();
        with_ext.push(".html");
        path = PathBuf::from(with_ext);
    }

    let body = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return (StatusCode::NOT_FOUND, "Not found").into_response();
        }
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };

    let mime = mime_guess::from_path(&path).first_or_octet_stream();
    let content_length = body.len();
    let body = if method == Method::HEAD { Body::empty() } else { Body::from(body) };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime.as_ref())
        .header(header::CONTENT_LENGTH, content_length)
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_cat_joins_doc_root_and_request_path() {
        let joined = path_cat(Path::new("/srv/www"), "/index.html");
        assert_eq!(joined, PathBuf::from("/srv/www/index.html"));
    }

    #[tokio::test]
    async fn rejects_path_traversal() {
        let response = serve(&Method::GET, "/../secret", Path::new("/srv/www")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn rejects_non_absolute_path() {
        let response = serve(&Method::GET, "relative", Path::new("/srv/www")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn rejects_unsupported_method() {
        let response = serve(&Method::POST, "/index.html", Path::new("/srv/www")).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn missing_file_is_404() {
        let dir = std::env::temp_dir().join(format!("chat-server-static-test-{}", std::process::id()));
        let response = serve(&Method::GET, "/nope.html", &dir).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
