//! REST endpoints for session status and the outbox.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use uuid::Uuid;

use crate::controller::SessionController;
use crate::outbox::ArtifactKind;

/// Shared state for the status routes.
#[derive(Clone)]
pub struct StatusRouteState {
    pub controller: Arc<SessionController>,
}

fn not_found(message: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

fn server_error(message: String) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

/// GET /api/sessions/{key}
///
/// Stage, confirmed field count and selection for one conversation.
async fn get_session(
    State(state): State<StatusRouteState>,
    Path(key): Path<String>,
) -> Response {
    match state.controller.status(&key).await {
        Some(status) => Json(status).into_response(),
        None => not_found("No session for this conversation"),
    }
}

/// GET /api/outbox
async fn list_outbox(State(state): State<StatusRouteState>) -> Response {
    match state.controller.outbox().list().await {
        Ok(summaries) => Json(summaries).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to list outbox");
            server_error(e.to_string())
        }
    }
}

/// GET /api/outbox/{session_id}/{kind}
async fn get_artifact(
    State(state): State<StatusRouteState>,
    Path((session_id, kind)): Path<(Uuid, ArtifactKind)>,
) -> Response {
    match state.controller.outbox().get(session_id, kind).await {
        Ok(Some(artifact)) => Json(artifact).into_response(),
        Ok(None) => not_found("No such artifact"),
        Err(e) => {
            tracing::error!(%session_id, %kind, error = %e, "Failed to read artifact");
            server_error(e.to_string())
        }
    }
}

/// Build the status REST routes.
pub fn status_routes(state: StatusRouteState) -> Router {
    Router::new()
        .route("/api/sessions/{key}", get(get_session))
        .route("/api/outbox", get(list_outbox))
        .route("/api/outbox/{session_id}/{kind}", get(get_artifact))
        .with_state(state)
}
