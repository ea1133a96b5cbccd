//! Local HTTP bridge for the bar overlay.
//!
//! Runs in-process with the daemon and exposes:
//! - `GET /healthz`
//! - `GET /v1/bar` (current bar view as JSON)
//! - `POST /v1/intent` (JSON [`Intent`], forwarded to the orchestrator)

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use tokio::sync::{oneshot, watch};

use crate::config::ServiceConfig;
use crate::error::HoverbarError;
use crate::orchestrator::{Intent, OrchestratorHandle};
use crate::session::BarView;

#[derive(Clone)]
struct AppState {
    views: watch::Receiver<BarView>,
    orchestrator: OrchestratorHandle,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct AcceptedResponse {
    accepted: bool,
}

#[derive(Serialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Serialize)]
struct ApiErrorBody {
    message: String,
    #[serde(rename = "type")]
    error_type: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
    error_type: &'static str,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            error_type: "invalid_request_error",
        }
    }

    fn unavailable(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: message.into(),
            error_type: "server_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorResponse {
            error: ApiErrorBody {
                message: self.message,
                error_type: self.error_type.to_string(),
            },
        };
        (self.status, Json(body)).into_response()
    }
}

/// Running local service handle.
pub struct ServiceHandle {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<()>,
}

impl ServiceHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.task.await {
            tracing::warn!("Service task join error: {}", e);
        }
    }
}

/// Start the bar bridge.
pub async fn start(
    service_cfg: &ServiceConfig,
    views: watch::Receiver<BarView>,
    orchestrator: OrchestratorHandle,
) -> Result<ServiceHandle, HoverbarError> {
    let bind_addr = format!("{}:{}", service_cfg.host, service_cfg.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| {
            HoverbarError::Config(format!(
                "Failed to bind service listener on {}: {}",
                bind_addr, e
            ))
        })?;
    let local_addr = listener.local_addr().map_err(|e| {
        HoverbarError::Config(format!("Failed to read service local address: {}", e))
    })?;

    if !local_addr.ip().is_loopback() {
        tracing::warn!(
            "Bar service listens on {}; selected text is readable from the network",
            local_addr
        );
    }

    let app = build_router(AppState {
        views,
        orchestrator,
    });
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
        {
            tracing::error!("Service HTTP server failed: {}", e);
        }
    });

    tracing::info!("Bar service listening on http://{}", local_addr);
    Ok(ServiceHandle {
        addr: local_addr,
        shutdown_tx: Some(shutdown_tx),
        task,
    })
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/bar", get(bar_handler))
        .route("/v1/intent", post(intent_handler))
        .with_state(state)
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn bar_handler(State(state): State<AppState>) -> Json<BarView> {
    Json(state.views.borrow().clone())
}

async fn intent_handler(
    State(state): State<AppState>,
    payload: Result<Json<Intent>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(intent) =
        payload.map_err(|e| ApiError::bad_request(format!("Invalid intent: {}", e.body_text())))?;

    tracing::debug!("Intent from overlay: {:?}", intent);
    if !state.orchestrator.intent(intent).await {
        return Err(ApiError::unavailable("Orchestrator is not running"));
    }

    Ok((StatusCode::ACCEPTED, Json(AcceptedResponse { accepted: true })).into_response())
}
