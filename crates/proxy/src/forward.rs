use std::time::Duration;

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use manager_core::Endpoint;
use reqwest::multipart::{Form, Part};

use crate::capture::{BufferedRequest, FilePart, InboundBody};
use crate::error::ForwardError;

/// What the worker answered, held in memory and relayed as-is.
#[derive(Debug, Clone)]
pub struct WorkerResponse {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub body: Bytes,
}

impl WorkerResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

impl IntoResponse for WorkerResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        if let Some(content_type) = self.content_type {
            response.headers_mut().insert(CONTENT_TYPE, content_type);
        }
        response
    }
}

/// Sends buffered requests to the worker with a bounded timeout.
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    timeout: Duration,
}

impl Forwarder {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, timeout })
    }

    pub async fn forward(
        &self,
        endpoint: &Endpoint,
        request: &BufferedRequest,
    ) -> Result<WorkerResponse, ForwardError> {
        let url = endpoint.url_for(&request.path, request.query.as_deref());
        let mut builder = self.client.request(request.method.clone(), &url);
        builder = match &request.body {
            InboundBody::Empty => builder,
            InboundBody::Json { raw, .. } => builder
                .header(CONTENT_TYPE, "application/json")
                .body(raw.clone()),
            InboundBody::File { part, fields } => builder.multipart(build_form(part, fields)?),
        };

        let response = builder.send().await.map_err(|err| self.map_error(err))?;
        let status = response.status();
        let content_type = response.headers().get(CONTENT_TYPE).cloned();
        let body = response.bytes().await.map_err(|err| {
            if err.is_timeout() {
                ForwardError::Timeout(self.timeout)
            } else {
                ForwardError::Body(err.to_string())
            }
        })?;

        Ok(WorkerResponse {
            status,
            content_type,
            body,
        })
    }

    fn map_error(&self, err: reqwest::Error) -> ForwardError {
        if err.is_timeout() {
            ForwardError::Timeout(self.timeout)
        } else if err.is_connect() {
            ForwardError::Connect(err.to_string())
        } else {
            ForwardError::Request(err.to_string())
        }
    }
}

fn build_form(part: &FilePart, fields: &[(String, String)]) -> Result<Form, ForwardError> {
    let mut form = Form::new();
    for (name, value) in fields {
        form = form.text(name.clone(), value.clone());
    }
    let mut file = Part::bytes(part.bytes.to_vec());
    if let Some(file_name) = &part.file_name {
        file = file.file_name(file_name.clone());
    }
    if let Some(content_type) = &part.content_type {
        file = file
            .mime_str(content_type)
            .map_err(|err| ForwardError::Request(format!("invalid part content type: {}", err)))?;
    }
    Ok(form.part(part.field.clone(), file))
}
