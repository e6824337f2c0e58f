//! HTTP surface over an [`AiService`].

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderName, StatusCode, header},
    response::{
        IntoResponse, Response,
        sse::{Event, Sse},
    },
    routing::post,
};
use futures::StreamExt;
use serde_json::json;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};

use crate::llm_client::BoxError;
use crate::prompt::{ProcessRequest, Prompt};
use crate::service::{AiService, TitleRequest};
use crate::shutdown::shutdown_signal;
use crate::stream::CancelHandle;

const INTERNAL_ERROR: &str = "An internal server error occurred.";

#[derive(Clone)]
struct AppState {
    service: Arc<dyn AiService>,
    active: Arc<Mutex<Option<CancelHandle>>>,
}

impl AppState {
    fn replace_active(&self, handle: Option<CancelHandle>) -> Option<CancelHandle> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *active, handle)
    }
}

/// Build a router exposing every generation mode.
pub fn router(service: Arc<dyn AiService>) -> Router {
    let state = AppState {
        service,
        active: Arc::new(Mutex::new(None)),
    };
    Router::new()
        .route("/generate", post(generate))
        .route("/generate-title", post(generate_title))
        .route("/stream", post(stream))
        .route("/process", post(process))
        .route("/cancel", post(cancel))
        .with_state(state)
}

/// Serve `service` on `host:port` until a shutdown signal arrives.
pub async fn run(host: &str, port: u16, service: Arc<dyn AiService>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    info!(addr = %listener.local_addr()?, "serving canvas assistant");
    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn generate(State(state): State<AppState>, Json(prompt): Json<Prompt>) -> Response {
    match state.service.generate(&prompt).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => {
            error!(error = %e, "generate failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": INTERNAL_ERROR })),
            )
                .into_response()
        }
    }
}

async fn generate_title(
    State(state): State<AppState>,
    Json(request): Json<TitleRequest>,
) -> Response {
    let title = state.service.generate_title(request).resolve().await;
    Json(json!({ "title": title })).into_response()
}

async fn stream(State(state): State<AppState>, Json(prompt): Json<Prompt>) -> Response {
    let (changes, handle) = state.service.stream(prompt);
    if let Some(previous) = state.replace_active(Some(handle)) {
        if previous.cancel() {
            debug!("previous stream cancelled by a new request");
        }
    }
    let events = changes.map(|item| -> Result<Event, BoxError> {
        match item {
            Ok(change) => Ok(Event::default().json_data(&change)?),
            Err(e) => {
                warn!(error = %e, "stream failed; aborting response");
                Err(e.into())
            }
        }
    });
    (
        [
            (header::CACHE_CONTROL, "no-cache, no-transform"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
            (header::CONNECTION, "keep-alive"),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        ],
        Sse::new(events),
    )
        .into_response()
}

async fn process(State(state): State<AppState>, Json(request): Json<ProcessRequest>) -> Response {
    let prompt = Prompt::from(request);
    match state.service.process(&prompt).await {
        Ok(processed) => Json(processed).into_response(),
        Err(e) => {
            error!(error = %e, "process failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to process request", "details": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn cancel(State(state): State<AppState>) -> StatusCode {
    if let Some(handle) = state.replace_active(None) {
        handle.cancel();
    }
    StatusCode::NO_CONTENT
}
