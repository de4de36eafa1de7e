use axum::body::Body;
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, Method, StatusCode};
use bytes::Bytes;
use http_body_util::LengthLimitError;
use manager_core::ManagerConfig;

use crate::error::CaptureError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOptions {
    /// Multipart part that must carry the upload.
    pub upload_field: String,
    pub max_body_bytes: usize,
}

impl CaptureOptions {
    pub fn from_config(config: &ManagerConfig) -> Self {
        Self {
            upload_field: config.upload_field.clone(),
            max_body_bytes: config.max_body_bytes,
        }
    }
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self::from_config(&ManagerConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub field: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundBody {
    Empty,
    /// Decoded document plus the exact bytes the client sent.
    Json {
        value: serde_json::Value,
        raw: Bytes,
    },
    /// The named upload and any plain text fields that came with it.
    File {
        part: FilePart,
        fields: Vec<(String, String)>,
    },
}

impl InboundBody {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Json { .. } => "json",
            Self::File { .. } => "file",
        }
    }
}

/// A request held entirely in memory.
#[derive(Debug, Clone)]
pub struct BufferedRequest {
    pub method: Method,
    pub path: String,
    /// Raw query string, forwarded verbatim.
    pub query: Option<String>,
    pub body: InboundBody,
}

/// Read the whole request off the connection and classify its body.
pub async fn capture(
    request: Request,
    options: &CaptureOptions,
) -> Result<BufferedRequest, CaptureError> {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let query = request.uri().query().map(str::to_string);

    if let Some(length) = content_length(request.headers()) {
        if length > options.max_body_bytes {
            return Err(CaptureError::PayloadTooLarge {
                limit: options.max_body_bytes,
            });
        }
    }

    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_ascii_lowercase());

    let body = match content_type.as_deref() {
        Some(ct) if ct.starts_with("multipart/form-data") => {
            capture_multipart(request, options).await?
        }
        _ => {
            let raw = read_body(request.into_body(), options.max_body_bytes).await?;
            classify(raw, content_type.as_deref())?
        }
    };

    Ok(BufferedRequest {
        method,
        path,
        query,
        body,
    })
}

fn classify(raw: Bytes, content_type: Option<&str>) -> Result<InboundBody, CaptureError> {
    if raw.is_empty() {
        return Ok(InboundBody::Empty);
    }
    match content_type {
        // Bodies without a content type are taken as JSON.
        None => parse_json(raw),
        Some(ct) if is_json(ct) => parse_json(raw),
        Some(ct) => Err(CaptureError::UnsupportedMediaType(ct.to_string())),
    }
}

fn parse_json(raw: Bytes) -> Result<InboundBody, CaptureError> {
    let value =
        serde_json::from_slice(&raw).map_err(|err| CaptureError::InvalidJson(err.to_string()))?;
    Ok(InboundBody::Json { value, raw })
}

fn is_json(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or("").trim();
    essence == "application/json" || essence.ends_with("+json")
}

async fn capture_multipart(
    request: Request,
    options: &CaptureOptions,
) -> Result<InboundBody, CaptureError> {
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|rejection| CaptureError::Multipart(rejection.body_text()))?;

    let mut upload = None;
    let mut fields = Vec::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return Err(multipart_error(err, options)),
        };
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);

        if file_name.is_some() {
            let bytes = field.bytes().await.map_err(|err| multipart_error(err, options))?;
            if name == options.upload_field && upload.is_none() {
                upload = Some(FilePart {
                    field: name,
                    file_name,
                    content_type,
                    bytes,
                });
            } else {
                tracing::debug!(field = %name, "ignoring extra file part");
            }
        } else {
            let text = field.text().await.map_err(|err| multipart_error(err, options))?;
            fields.push((name, text));
        }
    }

    match upload {
        Some(part) => Ok(InboundBody::File { part, fields }),
        None => Err(CaptureError::MissingFilePart {
            field: options.upload_field.clone(),
        }),
    }
}

fn multipart_error(
    err: axum::extract::multipart::MultipartError,
    options: &CaptureOptions,
) -> CaptureError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        CaptureError::PayloadTooLarge {
            limit: options.max_body_bytes,
        }
    } else {
        CaptureError::Multipart(err.body_text())
    }
}

async fn read_body(body: Body, limit: usize) -> Result<Bytes, CaptureError> {
    axum::body::to_bytes(body, limit).await.map_err(|err| {
        if is_length_limit(&err) {
            CaptureError::PayloadTooLarge { limit }
        } else {
            CaptureError::BodyRead(err.to_string())
        }
    })
}

fn is_length_limit(err: &axum::Error) -> bool {
    let mut current: Option<&(dyn std::error::Error + 'static)> =
        Some(err as &(dyn std::error::Error + 'static));
    while let Some(err) = current {
        if err.is::<LengthLimitError>() {
            return true;
        }
        current = err.source();
    }
    false
}

fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}
