//! HTTP request handlers.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::task::JoinError;

use crate::AppState;
use nfc_jsontag::session::SessionStatus;
use nfc_jsontag::transfer::{read_payload, write_payload, ReadError, WriteError};

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: u16,
}

impl ApiError {
    fn new(status: StatusCode, error: impl ToString) -> Self {
        Self {
            error: error.to_string(),
            code: status.as_u16(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

impl From<WriteError> for ApiError {
    fn from(err: WriteError) -> Self {
        let status = match err {
            WriteError::NoReaderAvailable => StatusCode::SERVICE_UNAVAILABLE,
            WriteError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            WriteError::NotAnObject => StatusCode::BAD_REQUEST,
            WriteError::WriteFailed { .. } => StatusCode::BAD_GATEWAY,
        };
        Self::new(status, err)
    }
}

impl From<ReadError> for ApiError {
    fn from(err: ReadError) -> Self {
        let status = match err {
            ReadError::NoReaderAvailable => StatusCode::SERVICE_UNAVAILABLE,
            ReadError::NoCardPresent => StatusCode::CONFLICT,
            ReadError::ReadFailed { .. } => StatusCode::BAD_GATEWAY,
            ReadError::MalformedFraming(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ReadError::ParseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err)
    }
}

impl From<JoinError> for ApiError {
    fn from(err: JoinError) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, err)
    }
}

fn event_loop_gone() -> ApiError {
    ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "reader event loop is not running")
}

/// GET /api/v1/health
pub async fn health() -> Response {
    let info = json!({
        "status": "ok",
        "name": "jsontag-gateway",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(info)).into_response()
}

/// GET /api/v1/status
pub async fn status(State(state): State<Arc<AppState>>) -> Json<SessionStatus> {
    Json(state.registry.status())
}

/// POST /api/v1/tag
pub async fn write_tag(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> Result<Response, ApiError> {
    let result = {
        let state = state.clone();
        tokio::task::spawn_blocking(move || {
            let result = write_payload(&state.registry, &payload);
            // WriteFailed may leave earlier blocks changed
            if matches!(result, Ok(_) | Err(WriteError::WriteFailed { .. })) {
                state.persist_tag();
            }
            result
        })
        .await?
    };
    let outcome = result?;

    let body = json!({
        "ok": true,
        "blocks": outcome.blocks_written,
        "bytes": outcome.bytes,
    });
    Ok((StatusCode::OK, Json(body)).into_response())
}

/// GET /api/v1/tag
pub async fn read_tag(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let outcome = tokio::task::spawn_blocking(move || read_payload(&state.registry, &state.decode)).await??;
    Ok(Json(outcome.payload))
}

/// POST /api/v1/reader/attach
pub async fn attach_reader(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    if !state.attach() {
        return Err(event_loop_gone());
    }
    Ok((StatusCode::ACCEPTED, Json(json!({ "device_id": state.reader.name() }))).into_response())
}

/// POST /api/v1/reader/detach
pub async fn detach_reader(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    if !state.detach() {
        return Err(event_loop_gone());
    }
    Ok(StatusCode::ACCEPTED)
}

/// POST /api/v1/card/present
pub async fn card_present(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let card = state.present_card().ok_or_else(event_loop_gone)?;
    Ok((StatusCode::ACCEPTED, Json(card)).into_response())
}

/// POST /api/v1/card/absent
pub async fn card_absent(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    if !state.remove_card() {
        return Err(event_loop_gone());
    }
    Ok(StatusCode::ACCEPTED)
}
