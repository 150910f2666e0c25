//! Request/response bodies for the HTTP API

use serde::{Deserialize, Serialize};

use crate::types::*;

/// One turn of the recent-conversation window attached to an escalation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentTurn {
    pub role: TurnRole,
    pub body: String,
}

/// Customer escalation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Bounded window of recent automated turns, newest last
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recent_turns: Vec<RecentTurn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_customer_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalateResponse {
    pub handoff_id: String,
    pub outcome: EscalationOutcome,
    pub status: HandoffStatus,
}

/// Offline contact capture, submitted after an `after_hours` outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactCaptureRequest {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Message send, customer or operator side
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub message: LedgerMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollMessagesResponse {
    pub messages: Vec<LedgerMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: HandoffStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub conversation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handoff_id: Option<String>,
    pub entries: Vec<TranscriptEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffResponse {
    pub handoff: Handoff,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffQueueResponse {
    pub handoffs: Vec<HandoffSummary>,
}

/// Customer message during the automated phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessageRequest {
    /// Absent on the first message; the conversation is created lazily
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessageResponse {
    pub conversation_id: String,
    /// The customer's turn as stored (server-assigned timestamp)
    pub customer_turn: AutomatedTurn,
    pub reply: AutomatedTurn,
}

/// JSON error body returned for every non-2xx API response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}
