use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{FromRequestParts, Path, Query, State},
    http::{header, request::Parts},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use http_body_util::{BodyExt, Limited};
use serde::Deserialize;
use serde_json::{Value, json};
use vab_core::DateKind;
use vab_telemetry::{WebhookOutcome, record_webhook};
use vab_translator::BatchReport;

use crate::bridge::{ChatMessage, SessionBridge};
use crate::error::BridgeError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Largest webhook body read; anything bigger fails as a body read error.
pub const MAX_WEBHOOK_BODY_BYTES: usize = 2 * 1024 * 1024;

pub type AppState = Arc<SessionBridge>;

/// Authenticated chat user, taken from the `X-User-Id` header set by the chat platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerId(pub String);

impl<S> FromRequestParts<S> for CallerId
where
    S: Send + Sync,
{
    type Rejection = BridgeError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| CallerId(value.to_string()))
            .ok_or(BridgeError::MissingIdentity)
    }
}

/// Body posted by an interactive control; `context` echoes what the renderer attached.
#[derive(Debug, Deserialize)]
pub struct ActionPayload<C> {
    pub context: C,
    #[serde(default)]
    pub selected_option: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DisconnectContext {
    pub confirmed: bool,
}

#[derive(Debug, Deserialize)]
pub struct DateContext {
    #[serde(rename = "type")]
    pub kind: DateKind,
}

#[derive(Debug, Deserialize)]
pub struct CompleteQuery {
    pub code: String,
    pub state: String,
}

pub fn build_router(bridge: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/webhook", post(webhook))
        .route("/oauth2/connect", get(connect))
        .route("/oauth2/complete", get(complete))
        .route("/file/{token}", get(download))
        .route("/chat/message", post(chat_message))
        .route("/action/disconnect", post(disconnect_answer))
        .route("/action/select", post(select_option))
        .route("/action/date", post(submit_date))
        .with_state(bridge)
}

fn ok() -> Json<Value> {
    Json(json!({ "status": "OK" }))
}

async fn healthz() -> &'static str {
    "ok"
}

async fn webhook(
    State(bridge): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    body: Body,
) -> Result<Json<Value>, BridgeError> {
    let result = receive_webhook(&bridge, query.get("secret").map(String::as_str), body).await;
    let outcome = match &result {
        Ok(_) => WebhookOutcome::Accepted,
        Err(BridgeError::Forbidden(_)) => WebhookOutcome::Forbidden,
        Err(BridgeError::Decode(_) | BridgeError::BodyRead(_)) => WebhookOutcome::Malformed,
        Err(_) => WebhookOutcome::Failed,
    };
    record_webhook(outcome);
    result.map(|_| ok())
}

async fn receive_webhook(
    bridge: &SessionBridge,
    secret: Option<&str>,
    body: Body,
) -> Result<BatchReport, BridgeError> {
    bridge.verify_webhook(secret)?;
    let body = Limited::new(body, MAX_WEBHOOK_BODY_BYTES)
        .collect()
        .await
        .map_err(|err| BridgeError::BodyRead(err.to_string()))?
        .to_bytes();
    bridge.deliver_response(&body).await
}

async fn connect(
    State(bridge): State<AppState>,
    CallerId(user_id): CallerId,
) -> Result<Redirect, BridgeError> {
    let url = bridge.begin_connect(&user_id).await?;
    Ok(Redirect::to(&url))
}

async fn complete(
    State(bridge): State<AppState>,
    CallerId(user_id): CallerId,
    Query(query): Query<CompleteQuery>,
) -> Result<Json<Value>, BridgeError> {
    let record = bridge
        .complete_connect(&user_id, &query.code, &query.state)
        .await?;
    Ok(Json(json!({
        "status": "OK",
        "remote_user_id": record.remote_user_id,
    })))
}

async fn download(
    State(bridge): State<AppState>,
    Path(token): Path<String>,
) -> Result<Response, BridgeError> {
    let (bytes, content_type) = bridge.open_file(&token).await?;
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

async fn chat_message(
    State(bridge): State<AppState>,
    CallerId(user_id): CallerId,
    Json(message): Json<ChatMessage>,
) -> Result<Json<Value>, BridgeError> {
    let state = bridge.handle_chat_message(&user_id, &message).await?;
    Ok(Json(json!({ "status": "OK", "state": state.as_str() })))
}

async fn disconnect_answer(
    State(bridge): State<AppState>,
    CallerId(user_id): CallerId,
    Json(payload): Json<ActionPayload<DisconnectContext>>,
) -> Result<Json<Value>, BridgeError> {
    let text = bridge
        .answer_disconnect(&user_id, payload.context.confirmed)
        .await?;
    Ok(Json(json!({ "status": "OK", "message": text })))
}

async fn select_option(
    State(bridge): State<AppState>,
    CallerId(user_id): CallerId,
    Json(payload): Json<ActionPayload<Value>>,
) -> Result<Json<Value>, BridgeError> {
    let value = payload
        .selected_option
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| BridgeError::Validation("Please pick one of the options.".into()))?;
    bridge.select_option(&user_id, &value).await?;
    Ok(ok())
}

async fn submit_date(
    State(bridge): State<AppState>,
    CallerId(user_id): CallerId,
    Json(payload): Json<ActionPayload<DateContext>>,
) -> Result<Json<Value>, BridgeError> {
    let value = payload.value.unwrap_or_default();
    bridge
        .submit_date(
            &user_id,
            payload.context.kind,
            &value,
            payload.channel_id.as_deref(),
        )
        .await?;
    Ok(ok())
}
