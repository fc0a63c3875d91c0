//! API error type and its HTTP mapping.

use crate::engine::EngineError;
use crate::pipeline::StreamError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("No face detected in the image")]
    NoFaceDetected,
    #[error("Invalid image file")]
    InvalidImage,
    #[error("Image and label are required")]
    MissingField,
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    IllegalState(&'static str),
    #[error("upstream returned status {0}")]
    Upstream(u16),
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),
    #[error("buzzer not available on this host")]
    HardwareUnavailable,
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NoFaceDetected
            | Self::InvalidImage
            | Self::MissingField
            | Self::BadRequest(_)
            | Self::IllegalState(_)
            | Self::HardwareUnavailable => StatusCode::BAD_REQUEST,
            // Relay whatever the camera host answered.
            Self::Upstream(code) => {
                StatusCode::from_u16(*code).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }
        (status, Json(json!({ "message": self.to_string() }))).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NoFaceDetected => Self::NoFaceDetected,
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<StreamError> for ApiError {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::AlreadyRunning => Self::IllegalState("Stream already running"),
            StreamError::NotRunning => Self::IllegalState("Stream is not running"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_are_400() {
        for err in [
            ApiError::NoFaceDetected,
            ApiError::InvalidImage,
            ApiError::MissingField,
            ApiError::IllegalState("Stream already running"),
            ApiError::HardwareUnavailable,
        ] {
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn test_upstream_status_is_relayed() {
        assert_eq!(
            ApiError::Upstream(400).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::Upstream(503).status_code(), StatusCode::SERVICE_UNAVAILABLE);
        // Nonsense codes fall back to 502.
        assert_eq!(ApiError::Upstream(7).status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_unreachable_upstream_is_502() {
        let err = ApiError::UpstreamUnreachable("connection refused".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_engine_no_face_maps_to_no_face() {
        let err: ApiError = EngineError::NoFaceDetected.into();
        assert!(matches!(err, ApiError::NoFaceDetected));
        assert_eq!(err.to_string(), "No face detected in the image");
    }

    #[test]
    fn test_stream_errors_map_to_illegal_state() {
        let err: ApiError = StreamError::AlreadyRunning.into();
        assert_eq!(err.to_string(), "Stream already running");
        let err: ApiError = StreamError::NotRunning.into();
        assert_eq!(err.to_string(), "Stream is not running");
    }
}
