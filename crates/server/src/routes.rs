//! HTTP API.
//!
//! Two audiences share the router: the customer widget (tenant API key) and
//! the operator console (operator token). The widget never receives push
//! events — everything it learns comes from these request/response reads,
//! which is what keeps reconnect churn harmless.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::info;

use switchboard_protocol::{
    ConversationMessageRequest, ConversationMessageResponse, ContactCaptureRequest,
    EscalateRequest, EscalateResponse, HandoffQueueResponse, HandoffResponse, HandoffStatus,
    HistoryResponse, PollMessagesResponse, SendMessageRequest, SendMessageResponse,
    StatusResponse, TurnRole,
};

use crate::assembler;
use crate::auth;
use crate::error::ApiError;
use crate::state::AppState;
use crate::websocket::ws_handler;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Widget (tenant credential)
        .route("/api/conversation/message", post(conversation_message))
        .route("/api/conversation/{id}/history", get(history))
        .route("/api/handoff/escalate", post(escalate))
        .route("/api/handoff/{id}/contact", post(contact_capture))
        .route("/api/handoff/{id}/message", post(customer_send))
        .route("/api/handoff/{id}/resolve", post(customer_resolve))
        .route("/api/handoff/{id}/messages", get(poll_messages))
        .route("/api/handoff/{id}/status", get(status))
        // Operator console (operator credential)
        .route("/api/handoffs", get(handoff_queue))
        .route("/api/handoff/{id}/claim", post(claim))
        .route("/api/handoff/{id}/operator-message", post(operator_send))
        .route("/api/handoff/{id}/operator-resolve", post(operator_resolve))
        // Event channel + liveness
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

// ---------------------------------------------------------------------------
// Widget: automated phase
// ---------------------------------------------------------------------------

/// Customer message during the automated phase: append the customer turn,
/// ask the opaque agent service for a reply, append and return it.
async fn conversation_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ConversationMessageRequest>,
) -> Result<Json<ConversationMessageResponse>, ApiError> {
    let tenant = auth::tenant_from_headers(&state.store, &headers).await?;
    if request.body.trim().is_empty() {
        return Err(ApiError::Invalid("message body is empty".into()));
    }

    // Conversations are created lazily on the first customer message
    let conversation_id = match request.conversation_id {
        Some(id) => {
            match state.store.conversation_tenant(id.clone()).await? {
                Some(owner) if owner == tenant.id => id,
                _ => return Err(ApiError::NotFound),
            }
        }
        None => state.store.create_conversation(tenant.id.clone()).await?,
    };

    let customer_turn = state
        .store
        .append_turn(conversation_id.clone(), TurnRole::Customer, request.body.clone())
        .await?;

    let reply_body = state
        .responder
        .reply(&conversation_id, &request.body)
        .await
        .map_err(ApiError::Internal)?;
    let reply = state
        .store
        .append_turn(conversation_id.clone(), TurnRole::AutomatedAgent, reply_body)
        .await?;

    Ok(Json(ConversationMessageResponse {
        conversation_id,
        customer_turn,
        reply,
    }))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    handoff_id: Option<String>,
}

/// Merged, time-ordered transcript — the widget's restore read and the
/// operator console's initial payload.
async fn history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(conversation_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let tenant = auth::tenant_from_headers(&state.store, &headers).await?;
    match state
        .store
        .conversation_tenant(conversation_id.clone())
        .await?
    {
        Some(owner) if owner == tenant.id => {}
        _ => return Err(ApiError::NotFound),
    }

    if let Some(handoff_id) = &query.handoff_id {
        let handoff = state
            .store
            .handoff_by_id(handoff_id.clone())
            .await?
            .ok_or(ApiError::NotFound)?;
        if handoff.tenant_id != tenant.id
            || handoff.conversation_id.as_deref() != Some(conversation_id.as_str())
        {
            return Err(ApiError::NotFound);
        }
    }

    let entries =
        assembler::assemble(&state.store, &conversation_id, query.handoff_id.as_deref()).await?;

    Ok(Json(HistoryResponse {
        conversation_id,
        handoff_id: query.handoff_id,
        entries,
    }))
}

// ---------------------------------------------------------------------------
// Widget: handoff lifecycle
// ---------------------------------------------------------------------------

async fn escalate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(mut request): Json<EscalateRequest>,
) -> Result<Json<EscalateResponse>, ApiError> {
    let tenant = auth::tenant_from_headers(&state.store, &headers).await?;

    // Keep only the newest turns of an oversized context window
    if request.recent_turns.len() > state.max_context_turns {
        let skip = request.recent_turns.len() - state.max_context_turns;
        request.recent_turns.drain(..skip);
    }

    let (handoff, outcome) = state.lifecycle.escalate(&tenant, request).await?;
    Ok(Json(EscalateResponse {
        handoff_id: handoff.id,
        outcome,
        status: handoff.status,
    }))
}

async fn contact_capture(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(handoff_id): Path<String>,
    Json(request): Json<ContactCaptureRequest>,
) -> Result<Json<HandoffResponse>, ApiError> {
    let tenant = auth::tenant_from_headers(&state.store, &headers).await?;
    if request.email.trim().is_empty() {
        return Err(ApiError::Invalid("contact email is empty".into()));
    }

    let handoff = state
        .lifecycle
        .capture_contact(&tenant, &handoff_id, request.email, request.message)
        .await?;
    Ok(Json(HandoffResponse { handoff }))
}

async fn customer_send(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(handoff_id): Path<String>,
    Json(request): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    let tenant = auth::tenant_from_headers(&state.store, &headers).await?;
    let message = state
        .lifecycle
        .send_customer(&tenant, &handoff_id, request.body)
        .await?;
    Ok(Json(SendMessageResponse { message }))
}

async fn customer_resolve(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(handoff_id): Path<String>,
) -> Result<Json<HandoffResponse>, ApiError> {
    let tenant = auth::tenant_from_headers(&state.store, &headers).await?;
    let handoff = state
        .lifecycle
        .resolve_by_customer(&tenant, &handoff_id)
        .await?;
    Ok(Json(HandoffResponse { handoff }))
}

#[derive(Debug, Deserialize)]
struct SinceQuery {
    since: Option<i64>,
}

/// Poll operator-origin messages after the watermark. Cheap and safe to
/// call on every widget tick.
async fn poll_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(handoff_id): Path<String>,
    Query(query): Query<SinceQuery>,
) -> Result<Json<PollMessagesResponse>, ApiError> {
    let tenant = auth::tenant_from_headers(&state.store, &headers).await?;
    let handoff = state
        .store
        .handoff_by_id(handoff_id.clone())
        .await?
        .ok_or(ApiError::NotFound)?;
    if handoff.tenant_id != tenant.id {
        return Err(ApiError::NotFound);
    }

    let messages = state
        .store
        .operator_messages_since(handoff_id, query.since)
        .await?;
    Ok(Json(PollMessagesResponse { messages }))
}

async fn status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(handoff_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let tenant = auth::tenant_from_headers(&state.store, &headers).await?;
    let handoff = state
        .store
        .handoff_by_id(handoff_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if handoff.tenant_id != tenant.id {
        return Err(ApiError::NotFound);
    }

    let operator_name = match &handoff.operator_id {
        Some(operator_id) => state
            .store
            .operator_by_id(operator_id.clone())
            .await?
            .map(|op| op.display_name),
        None => None,
    };

    Ok(Json(StatusResponse {
        status: handoff.status,
        operator_name,
    }))
}

// ---------------------------------------------------------------------------
// Operator console
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct QueueQuery {
    status: Option<HandoffStatus>,
}

async fn handoff_queue(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<QueueQuery>,
) -> Result<Json<HandoffQueueResponse>, ApiError> {
    let operator = auth::operator_from_headers(&state.store, &headers).await?;
    let handoffs = state
        .store
        .handoffs_for_tenant(operator.tenant_id, query.status)
        .await?;
    Ok(Json(HandoffQueueResponse { handoffs }))
}

async fn claim(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(handoff_id): Path<String>,
) -> Result<Json<HandoffResponse>, ApiError> {
    let operator = auth::operator_from_headers(&state.store, &headers).await?;
    let handoff = state.lifecycle.claim(&operator, &handoff_id).await?;
    info!(
        component = "api",
        event = "api.handoff_claimed",
        handoff_id = %handoff.id,
        operator_id = %operator.id,
    );
    Ok(Json(HandoffResponse { handoff }))
}

async fn operator_send(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(handoff_id): Path<String>,
    Json(request): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    let operator = auth::operator_from_headers(&state.store, &headers).await?;
    let message = state
        .lifecycle
        .send_operator(&operator, &handoff_id, request.body)
        .await?;
    Ok(Json(SendMessageResponse { message }))
}

async fn operator_resolve(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(handoff_id): Path<String>,
) -> Result<Json<HandoffResponse>, ApiError> {
    let operator = auth::operator_from_headers(&state.store, &headers).await?;
    let handoff = state
        .lifecycle
        .resolve_by_operator(&operator, &handoff_id)
        .await?;
    Ok(Json(HandoffResponse { handoff }))
}
