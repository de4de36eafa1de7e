use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, Request, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use dataset::{Sample, SampleStore};
use lifecycle::LifecycleController;
use manager_core::{ActivityClock, ManagerConfig};
use serde::Serialize;
use stdio::Style;
use tower_http::cors::CorsLayer;

use crate::capture::{CaptureOptions, capture};
use crate::error::ProxyError;
use crate::forward::{Forwarder, WorkerResponse};

pub const SAMPLE_PATH: &str = "/simulate/sample";
pub const STATUS_PATH: &str = "/_manager/status";

/// Everything a request handler needs. Built once and shared.
pub struct ProxyState {
    pub controller: Arc<LifecycleController>,
    pub activity: Arc<ActivityClock>,
    pub forwarder: Forwarder,
    pub samples: Arc<SampleStore>,
    pub capture: CaptureOptions,
    pub aliases: BTreeMap<String, String>,
    pub idle_timeout: Duration,
}

impl ProxyState {
    pub fn new(
        controller: Arc<LifecycleController>,
        forwarder: Forwarder,
        samples: Arc<SampleStore>,
        config: &ManagerConfig,
    ) -> Self {
        Self {
            activity: Arc::clone(controller.activity()),
            controller,
            forwarder,
            samples,
            capture: CaptureOptions::from_config(config),
            aliases: config.aliases.clone(),
            idle_timeout: config.idle_timeout,
        }
    }

    fn worker_path(&self, path: &str) -> String {
        self.aliases
            .get(path)
            .cloned()
            .unwrap_or_else(|| path.to_string())
    }
}

pub fn app_router(state: Arc<ProxyState>) -> Router {
    // Multipart honours this limit; plain bodies are limited in `capture`.
    let body_limit = state.capture.max_body_bytes;
    Router::new()
        .route(SAMPLE_PATH, get(simulate_sample))
        .route(STATUS_PATH, get(manager_status))
        .fallback(handle_request)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn handle_request(State(state): State<Arc<ProxyState>>, request: Request) -> Response {
    match proxy_request(&state, request).await {
        Ok(response) => response.into_response(),
        Err(err) => {
            tracing::debug!(status = %err.status(), error = %err, "request failed");
            err.into_response()
        }
    }
}

/// Buffer, touch the clock, ensure the worker, forward, relay.
async fn proxy_request(state: &ProxyState, request: Request) -> Result<WorkerResponse, ProxyError> {
    let mut buffered = capture(request, &state.capture).await?;
    state.activity.touch();

    let client_path = std::mem::take(&mut buffered.path);
    buffered.path = state.worker_path(&client_path);
    stdio::eventf!(
        "INFERENCE",
        Style::Info,
        "Received {} {} ({} body). Forwarding to worker...",
        buffered.method,
        client_path,
        buffered.body.kind()
    );

    let endpoint = state.controller.ensure_running_detached().await?;

    let response = state
        .forwarder
        .forward(&endpoint, &buffered)
        .await
        .inspect_err(|err| stdio::error("NETWORK ERROR", &err.to_string()))?;

    log_worker_response(&response);
    Ok(response)
}

fn log_worker_response(response: &WorkerResponse) {
    if response.is_success() {
        let rul = response
            .json()
            .and_then(|value| value.pointer("/prediction/rul").and_then(|rul| rul.as_f64()));
        if let Some(rul) = rul {
            stdio::eventf!("RESULT", Style::Success, "AI Predicted RUL: {} cycles", rul);
        }
    } else {
        let text = String::from_utf8_lossy(&response.body);
        let text: String = text.chars().take(512).collect();
        stdio::error(
            "WORKER ERROR",
            &format!("{} {}", response.status.as_u16(), text),
        );
    }
}

async fn simulate_sample(State(state): State<Arc<ProxyState>>) -> Result<Json<Sample>, ProxyError> {
    stdio::info("REQUEST", "Frontend requested simulation data");
    let sample = state.samples.sample().await?;
    Ok(Json(sample))
}

#[derive(Debug, Serialize)]
struct ManagerStatus {
    worker: &'static str,
    idle_seconds: f64,
    idle_timeout_seconds: u64,
}

async fn manager_status(
    State(state): State<Arc<ProxyState>>,
) -> Result<Json<ManagerStatus>, ProxyError> {
    let worker = state.controller.state().await?;
    Ok(Json(ManagerStatus {
        worker: worker.as_str(),
        idle_seconds: state.activity.idle_for().as_secs_f64(),
        idle_timeout_seconds: state.idle_timeout.as_secs(),
    }))
}
