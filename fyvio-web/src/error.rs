//! Mapping of gateway failures onto HTTP responses.

use axum::Json;
use axum::http::header::{ACCEPT_RANGES, CONTENT_RANGE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use fyvio_core::{BackendError, GatewayError};
use serde_json::json;
use tracing::{debug, error};

/// A failed stream request, rendered as a status code plus JSON body.
///
/// Range failures are the exception: they carry an empty body and a
/// `Content-Range: bytes */<size>` header as HTTP requires.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] GatewayError);

impl ApiError {
    /// Underlying gateway error.
    pub fn gateway_error(&self) -> &GatewayError {
        &self.0
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            GatewayError::Decode(_) | GatewayError::InvalidHash { .. } => StatusCode::BAD_REQUEST,
            GatewayError::NoConnections => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Backend(BackendError::NotFound { .. }) => StatusCode::NOT_FOUND,
            GatewayError::Backend(BackendError::PermissionDenied { .. }) => StatusCode::FORBIDDEN,
            GatewayError::Backend(BackendError::Transport { .. }) => StatusCode::BAD_GATEWAY,
            GatewayError::RangeNotSatisfiable(_) => StatusCode::RANGE_NOT_SATISFIABLE,
        }
    }

    fn message(&self) -> String {
        match &self.0 {
            GatewayError::Decode(e) => e.to_string(),
            GatewayError::InvalidHash { .. } => "Invalid hash".to_string(),
            GatewayError::NoConnections => "No backend connections available".to_string(),
            GatewayError::Backend(BackendError::NotFound { .. }) => "File not found".to_string(),
            GatewayError::Backend(BackendError::PermissionDenied { .. }) => {
                "Access to this file is not permitted".to_string()
            }
            GatewayError::Backend(BackendError::Transport { .. }) => {
                "Backend unavailable".to_string()
            }
            GatewayError::RangeNotSatisfiable(_) => "Range not satisfiable".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if let GatewayError::RangeNotSatisfiable(e) = &self.0 {
            debug!("Rejecting range: {}", e);
            let mut response = status.into_response();
            let headers = response.headers_mut();
            if let Ok(value) = HeaderValue::from_str(&e.content_range()) {
                headers.insert(CONTENT_RANGE, value);
            }
            headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
            return response;
        }

        if self.0.is_client_error() {
            debug!("Stream request rejected ({}): {}", status, self.0);
        } else {
            error!("Stream request failed: {}", self.0);
        }

        (status, Json(json!({ "error": self.message() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use fyvio_core::{DecodeError, RangeNotSatisfiable};

    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                GatewayError::Decode(DecodeError::MissingField { field: "hash" }),
                StatusCode::BAD_REQUEST,
            ),
            (
                GatewayError::InvalidHash { message_id: 1 },
                StatusCode::BAD_REQUEST,
            ),
            (
                GatewayError::Backend(BackendError::NotFound {
                    chat_id: -1001,
                    message_id: 1,
                }),
                StatusCode::NOT_FOUND,
            ),
            (
                GatewayError::Backend(BackendError::PermissionDenied { chat_id: -1001 }),
                StatusCode::FORBIDDEN,
            ),
            (
                GatewayError::Backend(BackendError::Transport {
                    reason: "timeout".to_string(),
                }),
                StatusCode::BAD_GATEWAY,
            ),
            (GatewayError::NoConnections, StatusCode::SERVICE_UNAVAILABLE),
        ];

        for (error, expected) in cases {
            assert_eq!(error.is_client_error(), expected.is_client_error());
            assert_eq!(ApiError::from(error).status(), expected);
        }
    }

    #[test]
    fn test_range_error_has_content_range_and_no_json() {
        let response =
            ApiError::from(GatewayError::from(RangeNotSatisfiable { file_size: 500 }))
                .into_response();

        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers()[CONTENT_RANGE], "bytes */500");
        assert!(
            response
                .headers()
                .get(axum::http::header::CONTENT_TYPE)
                .is_none()
        );
    }

    #[test]
    fn test_missing_field_message() {
        let error = ApiError::from(GatewayError::Decode(DecodeError::MissingField {
            field: "msg_id",
        }));
        assert_eq!(error.message(), "Missing id or hash");
    }
}
