use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use dataset::DatasetError;
use lifecycle::LifecycleError;
use platform::PlatformError;
use serde::Serialize;

/// The client sent something we cannot buffer or forward.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("invalid JSON body: {0}")]
    InvalidJson(String),
    #[error("invalid multipart body: {0}")]
    Multipart(String),
    #[error("multipart body has no file part named {field:?}")]
    MissingFilePart { field: String },
    #[error("unsupported content type {0:?}; send JSON or multipart/form-data")]
    UnsupportedMediaType(String),
    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },
    #[error("failed to read request body: {0}")]
    BodyRead(String),
}

impl CaptureError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// The worker looked healthy but the forwarded call failed.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("ForwardFailed: worker did not answer within {0:?}")]
    Timeout(std::time::Duration),
    #[error("ForwardFailed: could not connect to worker: {0}")]
    Connect(String),
    #[error("ForwardFailed: {0}")]
    Request(String),
    #[error("ForwardFailed: could not read worker response: {0}")]
    Body(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Forward(#[from] ForwardError),
    #[error("worker state unavailable: {0}")]
    Platform(#[from] PlatformError),
    #[error("simulation data unavailable: {0}")]
    Dataset(#[from] DatasetError),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Capture(err) => err.status(),
            Self::Lifecycle(_) | Self::Platform(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Forward(_) => StatusCode::BAD_GATEWAY,
            Self::Dataset(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use manager_core::Endpoint;

    #[test]
    fn status_codes_by_kind() {
        let cases: Vec<(ProxyError, StatusCode)> = vec![
            (CaptureError::InvalidJson("eof".into()).into(), StatusCode::BAD_REQUEST),
            (
                CaptureError::MissingFilePart {
                    field: "file".into(),
                }
                .into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                CaptureError::UnsupportedMediaType("text/plain".into()).into(),
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ),
            (
                CaptureError::PayloadTooLarge { limit: 10 }.into(),
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                LifecycleError::StartupTimeout {
                    attempts: 30,
                    endpoint: Endpoint::new("http://127.0.0.1:8001"),
                }
                .into(),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                LifecycleError::provision("daemon down").into(),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ForwardError::Connect("refused".into()).into(),
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.status(), status, "{err}");
        }
    }

    #[test]
    fn detail_names_the_kind() {
        let err: ProxyError = LifecycleError::StartupTimeout {
            attempts: 30,
            endpoint: Endpoint::new("http://127.0.0.1:8001"),
        }
        .into();
        assert!(err.to_string().starts_with("StartupTimeout"));
    }
}
