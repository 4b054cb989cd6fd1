//! Error-to-HTTP response conversion.
//!
//! Wraps [`streambox_core::Error`] so route handlers can return
//! `Result<T, AppError>` and get a JSON `{error, code}` body with the status
//! the taxonomy dictates.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

pub struct AppError(pub streambox_core::Error);

impl From<streambox_core::Error> for AppError {
    fn from(e: streambox_core::Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(status = %status, error = %self.0, "Server error in API handler");
        }

        let code = match &self.0 {
            streambox_core::Error::NotFound { .. } => "not_found",
            streambox_core::Error::Unauthorized(_) => "unauthorized",
            streambox_core::Error::Forbidden(_) => "forbidden",
            streambox_core::Error::Validation(_) => "invalid_input",
            streambox_core::Error::Conflict(_) => "conflict",
            streambox_core::Error::Upstream { .. } => "upstream",
            streambox_core::Error::EncodeFailed(_) => "encode_failed",
            streambox_core::Error::Transient(_) => "transient",
            streambox_core::Error::Database { .. } => "internal",
            streambox_core::Error::Io { .. } => "internal",
            streambox_core::Error::Internal(_) => "internal",
        };

        let body = json!({
            "error": self.0.to_string(),
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_produces_404() {
        let err = AppError(streambox_core::Error::not_found("media item", 3));
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn conflict_produces_409() {
        let err = AppError(streambox_core::Error::Conflict("scan busy".into()));
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn upstream_produces_502() {
        let err = AppError(streambox_core::Error::upstream("ftp", "down"));
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
    }
}
