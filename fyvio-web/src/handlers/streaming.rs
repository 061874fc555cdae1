//! Media streaming handler.
//!
//! Headers are written from the resolved range before any backend read
//! happens; the body then pulls one chunk per poll, so a client that stops
//! reading stops the backend reads with it.

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{ConnectInfo, Path, Request, State};
use axum::http::header::{
    ACCEPT_RANGES, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE,
};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::Response;
use fyvio_core::StreamResponse;
use fyvio_core::media::DEFAULT_MIME_TYPE;
use futures::TryStreamExt;
use tracing::error;

use crate::error::ApiError;
use crate::server::AppState;

/// Streams the media behind an access token.
///
/// The trailing path segment is a display name for download managers and
/// players; it is not consulted.
///
/// # Errors
///
/// Returns an [`ApiError`] when the token, hash, file lookup or range is
/// rejected; see its status mapping.
pub async fn stream_media(
    State(state): State<AppState>,
    Path((token, _name)): Path<(String, String)>,
    request: Request,
) -> Result<Response, ApiError> {
    // Opaque bytes stay in so the resolver rejects them as malformed
    let range_header = request
        .headers()
        .get(RANGE)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned());
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let response = state
        .gateway
        .open(&token, range_header.as_deref(), client)
        .await?;
    Ok(build_response(response))
}

fn build_response(response: StreamResponse) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_str(&response.media.mime_type)
            .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_MIME_TYPE)),
    );
    headers.insert(
        CONTENT_LENGTH,
        HeaderValue::from(response.range.content_length()),
    );
    headers.insert(
        CONTENT_DISPOSITION,
        HeaderValue::from_bytes(response.media.content_disposition().as_bytes())
            .unwrap_or_else(|_| HeaderValue::from_static("inline")),
    );
    headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    if let Some(content_range) = response
        .content_range()
        .and_then(|value| HeaderValue::from_str(&value).ok())
    {
        headers.insert(CONTENT_RANGE, content_range);
    }

    let status = response.range.status();
    let body = response
        .body
        .inspect_err(|e| error!("Stream aborted mid-body: {}", e));

    let mut http_response = Response::new(Body::from_stream(body));
    *http_response.status_mut() = status;
    *http_response.headers_mut() = headers;
    http_response
}
