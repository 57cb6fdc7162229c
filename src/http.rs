//! HTTP transport: JSON routes for requesters and the device.
//!
//! Requesters use `/api/status` and `/api/action`; the device polls
//! `/api/rpi/next-command` and reports back on `/api/rpi/complete`.
//! Field names follow the device firmware and web client, which still send
//! `button`, `userId`, `commandId` and `error`; both spellings are accepted.

use std::future::Future;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use crate::engine::QueueEngine;
use crate::error::{Error, Result};
use crate::model::{QueueStatus, WorkId, WorkItem};

/// Shared state for the HTTP server.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<QueueEngine>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    #[serde(alias = "userId")]
    pub requester_id: Option<String>,
}

/// Request body for POST /api/action.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    #[serde(alias = "button")]
    pub action: Option<i64>,
    #[serde(alias = "userId")]
    pub requester_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// What the device is told to do next.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub id: WorkId,
    pub action: u8,
    pub requester_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NextCommandResponse {
    pub command: Option<Command>,
}

/// Request body for POST /api/rpi/complete.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    #[serde(alias = "commandId")]
    pub id: String,
    #[serde(default)]
    pub success: bool,
    #[serde(alias = "error")]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CompleteResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub durability: String,
    pub active_waiters: usize,
}

fn status_code(error: &Error) -> StatusCode {
    match error {
        Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Device-side error body: `{"error": "..."}`.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status_code(&self.0), Json(body)).into_response()
    }
}

/// A body that does not deserialize is invalid input like any other.
fn json_body<T>(body: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    body.map(|Json(value)| value)
        .map_err(|rejection| Error::InvalidInput(rejection.body_text()))
}

/// Requester-side failure: `{"success": false, "message": "..."}`.
pub struct ActionError(Error);

impl IntoResponse for ActionError {
    fn into_response(self) -> Response {
        let message = match self.0 {
            Error::Timeout(_) => "Timeout".to_string(),
            Error::ActuationFailure {
                reason: Some(ref reason),
                ..
            } => format!("Failed: {reason}"),
            Error::ActuationFailure { reason: None, .. } => "Failed".to_string(),
            Error::InvalidInput(ref detail) => format!("Invalid input: {detail}"),
            ref other => other.to_string(),
        };
        let body = ActionResponse {
            success: false,
            message,
            timestamp: None,
        };
        (status_code(&self.0), Json(body)).into_response()
    }
}

async fn handle_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> std::result::Result<Json<QueueStatus>, ApiError> {
    let requester_id = query.requester_id.unwrap_or_default();
    Ok(Json(state.engine.query_status(&requester_id).await?))
}

async fn handle_action(
    State(state): State<AppState>,
    body: std::result::Result<Json<ActionRequest>, JsonRejection>,
) -> std::result::Result<Json<ActionResponse>, ActionError> {
    let body = json_body(body).map_err(ActionError)?;
    let Some(action) = body.action else {
        return Err(ActionError(Error::InvalidInput(
            "action is required".to_string(),
        )));
    };
    let requester_id = body.requester_id.unwrap_or_default();

    let item = state
        .engine
        .request(action, &requester_id)
        .await
        .map_err(ActionError)?;

    Ok(Json(opened(&item)))
}

fn opened(item: &WorkItem) -> ActionResponse {
    ActionResponse {
        success: true,
        message: format!("Lock {} opened", item.action),
        timestamp: item.completed_at.map(|at| at.to_rfc3339()),
    }
}

async fn handle_next_command(
    State(state): State<AppState>,
) -> std::result::Result<Json<NextCommandResponse>, ApiError> {
    let command = state.engine.claim_next().await?.map(|item| Command {
        id: item.id,
        action: item.action.get(),
        requester_id: item.requester_id,
    });
    Ok(Json(NextCommandResponse { command }))
}

async fn handle_complete(
    State(state): State<AppState>,
    body: std::result::Result<Json<CompleteRequest>, JsonRejection>,
) -> std::result::Result<Json<CompleteResponse>, ApiError> {
    let body = json_body(body)?;
    let id: WorkId = body.id.parse()?;
    state.engine.complete(id, body.success, body.reason).await?;
    Ok(Json(CompleteResponse { success: true }))
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        durability: state.engine.durability().to_string(),
        active_waiters: state.engine.active_waiters(),
    })
}

/// Build the router.
pub fn router(engine: Arc<QueueEngine>) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/api/status", get(handle_status))
        .route("/api/action", post(handle_action))
        .route("/api/rpi/next-command", get(handle_next_command))
        .route("/api/rpi/complete", post(handle_complete))
        .with_state(AppState { engine })
}

/// Serve on an already-bound listener until `shutdown` resolves.
/// In-flight requests complete before this returns.
pub async fn serve<F>(listener: TcpListener, engine: Arc<QueueEngine>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(engine))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Other(format!("http server failed: {e}")))
}

/// Bind `bind_addr` and serve until Ctrl+C or SIGTERM.
pub async fn run_http(engine: Arc<QueueEngine>, bind_addr: &str) -> Result<()> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| Error::Other(format!("failed to bind {bind_addr}: {e}")))?;
    tracing::info!(
        "server listening on {} ({} storage, Ctrl+C/SIGTERM to stop)",
        bind_addr,
        engine.durability()
    );
    serve(listener, engine, shutdown_signal()).await?;
    tracing::info!("server stopped");
    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("failed to listen for SIGTERM: {e}");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
