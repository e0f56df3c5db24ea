use axum::http::StatusCode;
use axum::response::IntoResponse;
use thiserror::Error;

use rtsp_recorder::RecorderError;

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("stream does not exist: {0}")]
    ArtifactNotFound(String),

    #[error("invalid artifact path: {0}")]
    InvalidPath(String),

    #[error("no source url available for camera: {0}")]
    SourceUnavailable(String),

    #[error("session refused to start: no source configured")]
    StartDeclined,

    #[error("unknown session: {0}")]
    UnknownSession(String),

    #[error("recorder error: {0}")]
    Recorder(#[from] RecorderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error response wrapper for DeliveryError
pub struct DeliveryErrorResponse(pub DeliveryError);

impl From<DeliveryError> for DeliveryErrorResponse {
    fn from(e: DeliveryError) -> Self {
        DeliveryErrorResponse(e)
    }
}

impl IntoResponse for DeliveryErrorResponse {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            DeliveryError::ArtifactNotFound(_) | DeliveryError::UnknownSession(_) => {
                StatusCode::NOT_FOUND
            }
            DeliveryError::InvalidPath(_) => StatusCode::BAD_REQUEST,
            DeliveryError::SourceUnavailable(_) => StatusCode::BAD_GATEWAY,
            DeliveryError::StartDeclined => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        match &self.0 {
            // Expected shortly after start, before the encoder has written
            // its first manifest
            DeliveryError::ArtifactNotFound(_) => tracing::debug!("{}", self.0),
            _ => tracing::warn!("Delivery error: {}", self.0),
        }

        let body = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "Internal error".to_string()
        } else {
            self.0.to_string()
        };

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let resp =
            DeliveryErrorResponse(DeliveryError::ArtifactNotFound("s/f".into())).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = DeliveryErrorResponse(DeliveryError::InvalidPath("..".into())).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp =
            DeliveryErrorResponse(DeliveryError::SourceUnavailable("cam".into())).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

        let resp = DeliveryErrorResponse(DeliveryError::StartDeclined).into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
