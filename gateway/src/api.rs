//! HTTP surface of the gateway.
//!
//! | Method | Path | |
//! |---|---|---|
//! | POST | `/pms/{identifier}` | run the pipeline on the request body |
//! | GET | `/mapping/{identifier}` | current mapping document |
//! | PUT | `/mapping/{identifier}` | replace the mapping document |
//! | GET | `/plugins` | registered plugin identifiers |
//!
//! Every route requires the shared secret in the `x-api-key` header.
use crate::errors::{ErrorKind, GatewayError};
use crate::metrics_defs::API_UNAUTHORIZED;
use crate::orchestrator::{Gateway, GatewayResponse, Stage};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::json;
use shared::counter;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tokio_util::sync::CancellationToken;
use translator::MappingDocument;
use translator::validation::Violation;

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Clone)]
struct AppState {
    gateway: Arc<Gateway>,
    api_key: Arc<str>,
}

pub fn router(gateway: Arc<Gateway>, api_key: &str) -> Router {
    let state = AppState {
        gateway,
        api_key: Arc::from(api_key),
    };

    Router::new()
        .route("/pms/{identifier}", post(receive_message))
        .route("/mapping/{identifier}", get(get_mapping).put(put_mapping))
        .route("/plugins", get(list_plugins))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .with_state(state)
}

async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .map(|value| value.as_bytes());

    if !provided.is_some_and(|key| key_matches(key, state.api_key.as_bytes())) {
        counter!(API_UNAUTHORIZED).increment(1);
        tracing::warn!(path = request.uri().path(), "Rejected request without a valid API key");
        let body = json!({"error": "unauthorized", "detail": "Invalid or missing API Key"});
        return (StatusCode::UNAUTHORIZED, Json(body)).into_response();
    }
    next.run(request).await
}

/// Constant-time for keys of equal length.
fn key_matches(provided: &[u8], expected: &[u8]) -> bool {
    provided.ct_eq(expected).into()
}

async fn receive_message(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
    body: Bytes,
) -> Result<Json<GatewayResponse>, GatewayError> {
    // Dropped with the handler future when the client disconnects, which
    // cancels any in-flight delivery attempt or backoff.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    tracing::info!(identifier, bytes = body.len(), "Received PMS message");
    state
        .gateway
        .process(&identifier, &body, &cancel)
        .await
        .map(Json)
}

async fn get_mapping(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> Result<Json<MappingDocument>, GatewayError> {
    let document = state
        .gateway
        .registry()
        .mappings()
        .load(&identifier)
        .await?;
    Ok(Json(MappingDocument::clone(&document)))
}

async fn put_mapping(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let document: MappingDocument = serde_json::from_slice(&body).map_err(|e| {
        GatewayError::new(
            ErrorKind::PayloadDecodeError,
            format!("invalid mapping document: {e}"),
        )
    })?;

    state
        .gateway
        .registry()
        .mappings()
        .save(&identifier, document)
        .await?;
    tracing::info!(identifier, "Mapping updated");
    Ok(Json(json!({"status": "success"})))
}

async fn list_plugins(State(state): State<AppState>) -> Json<serde_json::Value> {
    let plugins = state.gateway.registry().list_available();
    Json(json!({ "plugins": plugins }))
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorKind,
    stage: Option<Stage>,
    detail: &'a str,
    #[serde(skip_serializing_if = "<[Violation]>::is_empty")]
    errors: &'a [Violation],
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.kind.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = Json(ErrorBody {
            error: self.kind,
            stage: self.stage,
            detail: &self.detail,
            errors: &self.violations,
        });

        (status, body).into_response()
    }
}
