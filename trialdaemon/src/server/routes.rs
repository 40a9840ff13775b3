//! HTTP handlers

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

use super::messages::{ErrorResponse, FetchResponse, SubmitResponse};
use crate::state::{StateError, StateManager, StateSubmission, StatusReport};

/// Errors surfaced to HTTP clients
#[derive(Debug)]
pub(crate) enum ApiError {
    BadRequest(String),
    Unavailable,
}

impl From<StateError> for ApiError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::Validation(e) => Self::BadRequest(e.to_string()),
            StateError::ChannelError => Self::Unavailable,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::Unavailable => (StatusCode::SERVICE_UNAVAILABLE, "State manager unavailable".to_string()),
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

pub(crate) async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub(crate) async fn submit_state(
    State(manager): State<StateManager>,
    payload: Result<Json<StateSubmission>, JsonRejection>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let Json(submission) = payload.map_err(|rejection| {
        warn!(error = %rejection.body_text(), "Malformed state submission");
        ApiError::BadRequest(rejection.body_text())
    })?;
    debug!(?submission, "submit_state: called");

    manager.submit_state(submission).await?;
    Ok(Json(SubmitResponse::received()))
}

pub(crate) async fn fetch_state(State(manager): State<StateManager>) -> Result<Json<FetchResponse>, ApiError> {
    let current_state = manager.fetch_state().await?;
    debug!(%current_state, "fetch_state: returning");
    Ok(Json(FetchResponse { current_state }))
}

pub(crate) async fn status(State(manager): State<StateManager>) -> Result<Json<StatusReport>, ApiError> {
    debug!("status: called");
    Ok(Json(manager.status().await?))
}
