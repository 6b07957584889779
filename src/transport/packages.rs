//! Package manifest, file download (with single-range support), and the
//! rescan trigger.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::warn;
use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::AppState;

pub async fn manifest(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let packages = state.catalog.list().await;
    Json(json!({ "packages": packages }))
}

pub async fn scan(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    match state.catalog.scan().await {
        Ok(added) => Json(json!({
            "status": "ok",
            "added": added,
            "packages": state.catalog.len().await,
        })),
        Err(e) => {
            warn!("package scan failed: {e}");
            Json(json!({ "status": "error", "message": e.to_string() }))
        }
    }
}

pub async fn download(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
    headers: HeaderMap,
) -> Response {
    let path = state.catalog.package_path(&filename);

    let metadata = match tokio::fs::metadata(&path).await {
        Ok(m) => m,
        Err(_) => return (StatusCode::NOT_FOUND, "package not found").into_response(),
    };
    let file_size = metadata.len();

    let mut file = match tokio::fs::File::open(&path).await {
        Ok(f) => f,
        Err(_) => return (StatusCode::NOT_FOUND, "package not found").into_response(),
    };

    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_range);

    if let Some((start, end)) = range {
        if start >= file_size {
            return (StatusCode::RANGE_NOT_SATISFIABLE, "range not satisfiable").into_response();
        }
        let end = end.min(file_size - 1);
        let length = (end - start + 1) as usize;

        if file.seek(std::io::SeekFrom::Start(start)).await.is_err() {
            return (StatusCode::INTERNAL_SERVER_ERROR, "seek failed").into_response();
        }
        let mut buf = vec![0u8; length];
        if file.read_exact(&mut buf).await.is_err() {
            return (StatusCode::INTERNAL_SERVER_ERROR, "read failed").into_response();
        }

        return Response::builder()
            .status(StatusCode::PARTIAL_CONTENT)
            .header(header::CONTENT_RANGE, format!("bytes {start}-{end}/{file_size}"))
            .header(header::CONTENT_LENGTH, length.to_string())
            .header(header::ACCEPT_RANGES, "bytes")
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(Body::from(buf))
            .expect("a fixed set of headers is always valid");
    }

    let mut buf = Vec::with_capacity(file_size as usize);
    if file.read_to_end(&mut buf).await.is_err() {
        return (StatusCode::INTERNAL_SERVER_ERROR, "read failed").into_response();
    }

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_LENGTH, buf.len().to_string())
        .body(Body::from(buf))
        .expect("a fixed set of headers is always valid")
}

/// Parse a single-range `Range: bytes=start-end` header. A missing `end`
/// means "to the end of the file", resolved by the caller once it knows
/// the file size.
fn parse_range(header: &str) -> Option<(u64, u64)> {
    let spec = header.strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    let start: u64 = if start.is_empty() { 0 } else { start.parse().ok()? };
    let end: u64 = if end.is_empty() { u64::MAX } else { end.parse().ok()? };
    Some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_bounded_range() {
        assert_eq!(parse_range("bytes=10-19"), Some((10, 19)));
    }

    #[test]
    fn parses_an_open_ended_range() {
        assert_eq!(parse_range("bytes=10-"), Some((10, u64::MAX)));
    }

    #[test]
    fn rejects_a_malformed_range() {
        assert_eq!(parse_range("nonsense"), None);
    }
}
